//! Practice sessions — evaluation pipeline and progress arithmetic.

pub mod pipeline;
pub mod progress;

pub use pipeline::{SessionInput, SessionOutcome, SessionPipeline};
