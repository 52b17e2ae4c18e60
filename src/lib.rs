//! charla — conversational English-practice backend for Spanish speakers.
//!
//! Inbound messages flow through the [`dispatch::Dispatcher`], which picks
//! between the onboarding flow, the LLM-backed agent [`agents::Router`],
//! and the practice [`session::SessionPipeline`]. Persistence is libSQL
//! behind the [`store::Database`] trait; AI calls go through the
//! [`providers::AiProvider`] seam with retrying failover.

pub mod agents;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod model;
pub mod onboarding;
pub mod prompts;
pub mod providers;
pub mod session;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
