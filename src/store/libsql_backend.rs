//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All datetimes are stored
//! as RFC 3339 text; JSON blobs (interests, evaluation, template
//! variables, test responses) are serialized with serde_json.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    CefrLevel, ConversationTurn, LevelTest, Platform, PracticeSession, TurnRole, User,
};
use crate::prompts::PromptTemplate;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_level(s: &str) -> CefrLevel {
    s.parse().unwrap_or(CefrLevel::A0)
}

const USER_COLUMNS: &str = "id, telegram_id, whatsapp_id, display_name, level, xp, streak, \
                            interests, goal, is_onboarding, onboarding_step, last_activity, created_at";

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let id: String = row.get(0)?;
    let telegram_id: Option<String> = row.get(1)?;
    let whatsapp_id: Option<String> = row.get(2)?;
    let display_name: String = row.get(3)?;
    let level: String = row.get(4)?;
    let xp: i64 = row.get(5)?;
    let streak: i64 = row.get(6)?;
    let interests: String = row.get(7)?;
    let goal: Option<String> = row.get(8)?;
    let is_onboarding: i64 = row.get(9)?;
    let onboarding_step: String = row.get(10)?;
    let last_activity: String = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(User {
        id: parse_uuid(&id),
        telegram_id,
        whatsapp_id,
        display_name,
        level: parse_level(&level),
        xp,
        streak,
        interests: serde_json::from_str(&interests).unwrap_or_default(),
        goal,
        is_onboarding: is_onboarding != 0,
        onboarding_step,
        last_activity: parse_datetime(&last_activity),
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_turn(row: &libsql::Row) -> Result<ConversationTurn, libsql::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let content: String = row.get(3)?;
    let agent: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(ConversationTurn {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        role: if role == "assistant" {
            TurnRole::Assistant
        } else {
            TurnRole::User
        },
        content,
        agent,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_template(row: &libsql::Row) -> Result<PromptTemplate, libsql::Error> {
    let id: String = row.get(0)?;
    let level: Option<String> = row.get(1)?;
    let prompt_type: String = row.get(2)?;
    let persona: String = row.get(3)?;
    let body: String = row.get(4)?;
    let variables: String = row.get(5)?;
    let active: i64 = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(PromptTemplate {
        id: parse_uuid(&id),
        level: level.and_then(|l| l.parse().ok()),
        prompt_type,
        persona,
        body,
        variables: serde_json::from_str(&variables).unwrap_or_default(),
        active: active != 0,
        created_at: parse_datetime(&created_at),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row).map_err(|e| {
                DatabaseError::Query(format!("get_user row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn get_user_by_platform(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let column = match platform {
            Platform::Telegram => "telegram_id",
            Platform::Whatsapp => "whatsapp_id",
        };
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_platform: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row).map_err(|e| {
                DatabaseError::Query(format!("get_user_by_platform row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_platform: {e}"))),
        }
    }

    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        let interests = serde_json::to_string(&user.interests)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO users (id, telegram_id, whatsapp_id, display_name, level, xp, streak,
                    interests, goal, is_onboarding, onboarding_step, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    user.id.to_string(),
                    user.telegram_id.clone(),
                    user.whatsapp_id.clone(),
                    user.display_name.clone(),
                    user.level.as_str(),
                    user.xp,
                    user.streak,
                    interests,
                    user.goal.clone(),
                    user.is_onboarding as i64,
                    user.onboarding_step.clone(),
                    user.last_activity.to_rfc3339(),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_user: {e}")))?;
        debug!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn update_user_level(&self, id: Uuid, level: CefrLevel) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET level = ?1 WHERE id = ?2",
                params![level.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_level: {e}")))?;
        Ok(())
    }

    async fn update_user_interests(
        &self,
        id: Uuid,
        interests: &[String],
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(interests)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "UPDATE users SET interests = ?1 WHERE id = ?2",
                params![json, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_interests: {e}")))?;
        Ok(())
    }

    async fn update_user_goal(&self, id: Uuid, goal: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET goal = ?1 WHERE id = ?2",
                params![goal, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_goal: {e}")))?;
        Ok(())
    }

    async fn set_onboarding(
        &self,
        id: Uuid,
        is_onboarding: bool,
        step: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET is_onboarding = ?1, onboarding_step = ?2 WHERE id = ?3",
                params![is_onboarding as i64, step, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_onboarding: {e}")))?;
        Ok(())
    }

    // ── Conversation turns ──────────────────────────────────────────

    async fn append_turn(&self, turn: &ConversationTurn) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO conversation_turns (id, user_id, role, content, agent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    turn.id.to_string(),
                    turn.user_id.to_string(),
                    turn.role.to_string(),
                    turn.content.clone(),
                    turn.agent.clone(),
                    turn.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_turn: {e}")))?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, role, content, agent, created_at
                 FROM conversation_turns WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_turns: {e}")))?;

        let mut turns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            turns.push(
                row_to_turn(&row)
                    .map_err(|e| DatabaseError::Query(format!("recent_turns row parse: {e}")))?,
            );
        }
        // Query returns newest-first; callers want chronological order.
        turns.reverse();
        Ok(turns)
    }

    // ── Prompt templates ────────────────────────────────────────────

    async fn load_active_templates(&self) -> Result<Vec<PromptTemplate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, level, prompt_type, persona, body, variables, active, created_at
                 FROM prompt_templates WHERE active = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_active_templates: {e}")))?;

        let mut templates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            templates.push(row_to_template(&row).map_err(|e| {
                DatabaseError::Query(format!("load_active_templates row parse: {e}"))
            })?);
        }
        Ok(templates)
    }

    async fn insert_template(&self, template: &PromptTemplate) -> Result<(), DatabaseError> {
        let variables = serde_json::to_string(&template.variables)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO prompt_templates (id, level, prompt_type, persona, body, variables, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    template.id.to_string(),
                    template.level.map(|l| l.as_str().to_string()),
                    template.prompt_type.clone(),
                    template.persona.clone(),
                    template.body.clone(),
                    variables,
                    template.active as i64,
                    template.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_template: {e}")))?;
        Ok(())
    }

    async fn count_templates(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM prompt_templates", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_templates: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_templates: {e}")))?;
                Ok(count as usize)
            }
            _ => Ok(0),
        }
    }

    // ── Practice sessions ───────────────────────────────────────────

    async fn record_practice_session(
        &self,
        session: &PracticeSession,
        new_streak: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let evaluation = serde_json::to_string(&session.evaluation)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        tx.execute(
            "INSERT INTO practice_sessions (id, user_id, level, input_ref, transcription, evaluation,
                overall, xp_earned, feedback_audio_url, feedback_text, word_count, session_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                session.id.to_string(),
                session.user_id.to_string(),
                session.level.as_str(),
                session.input_ref.clone(),
                session.transcription.clone(),
                evaluation,
                session.evaluation.overall as i64,
                session.xp_earned,
                session.feedback_audio_url.clone(),
                session.feedback_text.clone(),
                session.word_count,
                session.session_type.clone(),
                session.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Transaction(format!("insert session: {e}")))?;

        tx.execute(
            "UPDATE users SET xp = xp + ?1, streak = ?2, last_activity = ?3 WHERE id = ?4",
            params![
                session.xp_earned,
                new_streak,
                now.to_rfc3339(),
                session.user_id.to_string(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Transaction(format!("update progress: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        debug!(
            session_id = %session.id,
            user_id = %session.user_id,
            xp = session.xp_earned,
            "Practice session recorded"
        );
        Ok(())
    }

    async fn recent_session_scores(
        &self,
        user_id: Uuid,
        level: CefrLevel,
        limit: usize,
    ) -> Result<Vec<u8>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT overall FROM practice_sessions WHERE user_id = ?1 AND level = ?2
                 ORDER BY created_at DESC LIMIT ?3",
                params![user_id.to_string(), level.as_str(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_session_scores: {e}")))?;

        let mut scores = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let overall: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("recent_session_scores: {e}")))?;
            scores.push(overall.clamp(0, 100) as u8);
        }
        Ok(scores)
    }

    // ── Level tests ─────────────────────────────────────────────────

    async fn insert_level_test(&self, test: &LevelTest) -> Result<(), DatabaseError> {
        let responses = serde_json::to_string(&test.responses)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO level_tests (id, user_id, responses, average_score, assigned_level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    test.id.to_string(),
                    test.user_id.to_string(),
                    responses,
                    test.average_score,
                    test.assigned_level.as_str(),
                    test.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_level_test: {e}")))?;
        Ok(())
    }

    // ── Onboarding durable backup ───────────────────────────────────

    async fn save_onboarding_backup(
        &self,
        user_id: Uuid,
        step: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO onboarding_backup (user_id, step, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET step = ?2, updated_at = ?3",
                params![user_id.to_string(), step, updated_at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_onboarding_backup: {e}")))?;
        Ok(())
    }

    async fn load_onboarding_backup(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(String, DateTime<Utc>)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT step, updated_at FROM onboarding_backup WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_onboarding_backup: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let step: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_onboarding_backup: {e}")))?;
                let updated_at: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("load_onboarding_backup: {e}")))?;
                Ok(Some((step, parse_datetime(&updated_at))))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_onboarding_backup: {e}"))),
        }
    }

    async fn delete_onboarding_backup(&self, user_id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM onboarding_backup WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_onboarding_backup: {e}")))?;
        Ok(())
    }
}
