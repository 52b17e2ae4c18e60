//! Onboarding — placement test, interests, and goal capture for new users.

pub mod extract;
pub mod manager;
pub mod questions;
pub mod scoring;
pub mod state;

pub use manager::OnboardingManager;
pub use state::{OnboardingState, OnboardingStep};
