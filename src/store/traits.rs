//! Unified `Database` trait — single async interface for all durable
//! persistence the core needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{CefrLevel, ConversationTurn, LevelTest, Platform, PracticeSession, User};
use crate::prompts::PromptTemplate;

/// Backend-agnostic database trait covering users, conversation turns,
/// practice sessions, prompt templates, level tests, and the onboarding
/// durable backup.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_platform(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<User>, DatabaseError>;

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn update_user_level(&self, id: Uuid, level: CefrLevel) -> Result<(), DatabaseError>;

    async fn update_user_interests(
        &self,
        id: Uuid,
        interests: &[String],
    ) -> Result<(), DatabaseError>;

    async fn update_user_goal(&self, id: Uuid, goal: &str) -> Result<(), DatabaseError>;

    /// Flip the onboarding flag and record the current step name.
    async fn set_onboarding(
        &self,
        id: Uuid,
        is_onboarding: bool,
        step: &str,
    ) -> Result<(), DatabaseError>;

    // ── Conversation turns ──────────────────────────────────────────

    /// Append one immutable turn to the user's log.
    async fn append_turn(&self, turn: &ConversationTurn) -> Result<(), DatabaseError>;

    /// The most recent `limit` turns, oldest first. Older turns stay on
    /// disk for audit but are never loaded as context.
    async fn recent_turns(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError>;

    // ── Prompt templates ────────────────────────────────────────────

    async fn load_active_templates(&self) -> Result<Vec<PromptTemplate>, DatabaseError>;

    async fn insert_template(&self, template: &PromptTemplate) -> Result<(), DatabaseError>;

    async fn count_templates(&self) -> Result<usize, DatabaseError>;

    // ── Practice sessions ───────────────────────────────────────────

    /// Atomically insert the session row and update the owning user's
    /// xp/streak/last-activity. Both writes commit together or neither does.
    async fn record_practice_session(
        &self,
        session: &PracticeSession,
        new_streak: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Overall scores of the user's most recent sessions at the given
    /// level, newest first. Sessions from before a promotion are excluded.
    async fn recent_session_scores(
        &self,
        user_id: Uuid,
        level: CefrLevel,
        limit: usize,
    ) -> Result<Vec<u8>, DatabaseError>;

    // ── Level tests ─────────────────────────────────────────────────

    async fn insert_level_test(&self, test: &LevelTest) -> Result<(), DatabaseError>;

    // ── Onboarding durable backup ───────────────────────────────────

    /// Mirror the onboarding step into durable storage. Only the step name
    /// is kept — enough to resynthesize a minimal state on cache loss.
    async fn save_onboarding_backup(
        &self,
        user_id: Uuid,
        step: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn load_onboarding_backup(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(String, DateTime<Utc>)>, DatabaseError>;

    async fn delete_onboarding_backup(&self, user_id: Uuid) -> Result<(), DatabaseError>;
}
