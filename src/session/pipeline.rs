//! Session pipeline — turns one practice utterance into an evaluation,
//! feedback, and a progress update.
//!
//! Stages: transcribe (audio only) → evaluate → generate feedback (two
//! parallel LLM calls) → commit session + progress atomically → run
//! after-commit hooks in the background. Everything after transcription
//! degrades instead of failing: a broken evaluation call still produces
//! a persisted session with the neutral fallback scores.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::runtime::prompt_vars;
use crate::config::CoreConfig;
use crate::error::Error;
use crate::gateway::{MessagingGateway, OutboundMessage};
use crate::model::{Evaluation, Platform, PracticeSession, User};
use crate::prompts::{prompt_types, PromptRegistry};
use crate::providers::{strip_code_fences, AiProvider, ChatMessage, CompletionRequest};
use crate::session::progress;
use crate::storage::BlobStorage;
use crate::store::Database;

const FEEDBACK_MAX_TOKENS: u32 = 256;
const EVALUATION_MAX_TOKENS: u32 = 512;

const TEACHER_FEEDBACK_FALLBACK: &str =
    "Good effort! Keep practicing and you'll keep improving.";
const SPANISH_SUMMARY_FALLBACK: &str =
    "¡Buen trabajo! Sigue practicando un poco cada día.";

/// One practice input, already fetched from the platform.
#[derive(Debug, Clone)]
pub enum SessionInput {
    Text(String),
    Audio {
        data: Vec<u8>,
        /// Platform reference to the original audio (e.g. file id).
        input_ref: Option<String>,
    },
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The formatted user-facing reply.
    pub reply: String,
    /// What the user said, after transcription for audio input. The caller
    /// persists this as the inbound turn so routing context keeps it.
    pub transcription: String,
}

pub struct SessionPipeline {
    db: Arc<dyn Database>,
    provider: Arc<dyn AiProvider>,
    registry: Arc<PromptRegistry>,
    storage: Arc<dyn BlobStorage>,
    gateway: Arc<dyn MessagingGateway>,
    config: CoreConfig,
}

impl SessionPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        provider: Arc<dyn AiProvider>,
        registry: Arc<PromptRegistry>,
        storage: Arc<dyn BlobStorage>,
        gateway: Arc<dyn MessagingGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            db,
            provider,
            registry,
            storage,
            gateway,
            config,
        }
    }

    /// Run the full pipeline for one utterance.
    pub async fn run(
        &self,
        user: &User,
        input: SessionInput,
        platform: Platform,
        chat_id: &str,
    ) -> Result<SessionOutcome, Error> {
        let (transcription, input_ref, is_audio) = match input {
            SessionInput::Text(text) => (text, None, false),
            SessionInput::Audio { data, input_ref } => {
                // Transcription is the only hard dependency: with no text
                // there is nothing to evaluate.
                let text = self.provider.transcribe(&data, "voice.ogg").await?;
                (text, input_ref, true)
            }
        };
        let word_count = transcription.split_whitespace().count();

        let evaluation = self.evaluate(user, &transcription).await;
        let (feedback_text, spanish_summary) = self.generate_feedback(user, &evaluation).await;

        // Progress arithmetic.
        let mut xp = progress::xp_earned(self.config.xp_base, evaluation.overall, user.level);
        if is_audio && word_count >= self.config.duration_bonus_words {
            xp += self.config.duration_bonus_xp;
        }
        let gap = progress::days_since(user.last_activity, Utc::now());
        let new_streak = progress::next_streak(user.streak, gap);

        let session = PracticeSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            level: user.level,
            input_ref,
            transcription: transcription.clone(),
            evaluation: evaluation.clone(),
            xp_earned: xp,
            feedback_audio_url: None,
            feedback_text: feedback_text.clone(),
            word_count: word_count as i64,
            session_type: if is_audio { "audio" } else { "text" }.to_string(),
            created_at: Utc::now(),
        };

        // Session and progress commit together; hooks only run after this.
        self.db
            .record_practice_session(&session, new_streak, Utc::now())
            .await?;
        info!(
            user_id = %user.id,
            session_id = %session.id,
            overall = evaluation.overall,
            xp,
            streak = new_streak,
            fallback = evaluation.is_fallback(),
            "Practice session recorded"
        );

        self.spawn_after_commit_hooks(user, &session, platform, chat_id);

        Ok(SessionOutcome {
            reply: format_reply(&evaluation, &feedback_text, &spanish_summary, xp, new_streak),
            transcription,
        })
    }

    /// Score the transcription. Any failure (call, timeout, parse) degrades
    /// to the neutral fallback evaluation — the session is never lost.
    async fn evaluate(&self, user: &User, transcription: &str) -> Evaluation {
        let template = match self.registry.resolve(
            user.level,
            prompt_types::SPEECH_EVALUATION,
            &self.config.persona,
        ) {
            Ok(t) => t,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Evaluation prompt missing; using fallback");
                return Evaluation::fallback();
            }
        };

        let system = template.render(&prompt_vars(user, &self.config.persona));
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(transcription),
        ])
        .with_max_tokens(EVALUATION_MAX_TOKENS)
        .with_temperature(0.2)
        .with_json_mode()
        .with_timeout(self.config.llm_timeout);

        match self.provider.complete(request).await {
            Ok(response) => match parse_evaluation(&response.content) {
                Some(evaluation) => evaluation,
                None => {
                    warn!(user_id = %user.id, "Unparseable evaluation reply; using fallback");
                    Evaluation::fallback()
                }
            },
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Evaluation call failed; using fallback");
                Evaluation::fallback()
            }
        }
    }

    /// Generate the English teacher feedback and the Spanish summary in
    /// parallel. Each degrades independently to a canned line.
    async fn generate_feedback(&self, user: &User, evaluation: &Evaluation) -> (String, String) {
        let evaluation_json =
            serde_json::to_string(evaluation).unwrap_or_else(|_| "{}".to_string());

        let teacher = self.feedback_call(
            user,
            prompt_types::TEACHER_FEEDBACK,
            &evaluation_json,
            TEACHER_FEEDBACK_FALLBACK,
        );
        let spanish = self.feedback_call(
            user,
            prompt_types::SPANISH_SUMMARY,
            &evaluation_json,
            SPANISH_SUMMARY_FALLBACK,
        );

        tokio::join!(teacher, spanish)
    }

    async fn feedback_call(
        &self,
        user: &User,
        prompt_type: &str,
        evaluation_json: &str,
        fallback: &str,
    ) -> String {
        let template = match self
            .registry
            .resolve(user.level, prompt_type, &self.config.persona)
        {
            Ok(t) => t,
            Err(e) => {
                warn!(user_id = %user.id, prompt_type, error = %e, "Feedback prompt missing");
                return fallback.to_string();
            }
        };

        let system = template.render(&prompt_vars(user, &self.config.persona));
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(evaluation_json),
        ])
        .with_max_tokens(FEEDBACK_MAX_TOKENS)
        .with_timeout(self.config.llm_timeout);

        match self.provider.complete(request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                warn!(user_id = %user.id, prompt_type, error = %e, "Feedback call failed");
                fallback.to_string()
            }
        }
    }

    /// Spawn the after-commit hooks. Each runs detached; a hook failure is
    /// logged and never affects the already-committed session.
    fn spawn_after_commit_hooks(
        &self,
        user: &User,
        session: &PracticeSession,
        platform: Platform,
        chat_id: &str,
    ) {
        type Hook = std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'static>,
        >;

        let mut hooks: Vec<(&'static str, Hook)> = Vec::new();

        // Hook: synthesize feedback audio, store it, deliver it.
        {
            let provider = self.provider.clone();
            let storage = self.storage.clone();
            let gateway = self.gateway.clone();
            let feedback_text = session.feedback_text.clone();
            let session_id = session.id;
            let chat_id = chat_id.to_string();
            hooks.push((
                "feedback_audio",
                Box::pin(async move {
                    let audio = provider.synthesize(&feedback_text).await?;
                    let key = format!("feedback/{session_id}.mp3");
                    let url = storage.put(&key, &audio).await?;
                    gateway
                        .send(
                            platform,
                            &chat_id,
                            OutboundMessage::text("🎧 Listen to your feedback:").with_audio(url),
                        )
                        .await?;
                    Ok(())
                }),
            ));
        }

        // Hook: check level-up eligibility and log it.
        {
            let db = self.db.clone();
            let user_id = user.id;
            let level = user.level;
            let min_sessions = self.config.level_up_min_sessions;
            let threshold = self.config.level_up_threshold;
            hooks.push((
                "level_up_check",
                Box::pin(async move {
                    // Only sessions at the current level count: scores from
                    // before a promotion must not re-trigger eligibility.
                    let scores = db
                        .recent_session_scores(user_id, level, min_sessions)
                        .await?;
                    if scores.len() < min_sessions {
                        return Ok(());
                    }
                    let average =
                        scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
                    if average >= threshold {
                        if let Some(next) = level.next() {
                            info!(
                                user_id = %user_id,
                                current_level = %level,
                                next_level = %next,
                                average,
                                "User is eligible for a level up"
                            );
                        }
                    }
                    Ok(())
                }),
            ));
        }

        for (name, hook) in hooks {
            tokio::spawn(async move {
                if let Err(e) = hook.await {
                    error!(hook = name, error = %e, "After-commit hook failed");
                }
            });
        }
    }
}

/// Parse the evaluator's JSON reply defensively. All five scores must be
/// present; feedback strings default to empty when missing.
pub fn parse_evaluation(raw: &str) -> Option<Evaluation> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw)).ok()?;

    let score = |key: &str| -> Option<u8> {
        value.get(key)?.as_f64().map(|n| n.clamp(0.0, 100.0) as u8)
    };
    let feedback = |key: &str| -> String {
        value
            .get("feedback")
            .and_then(|f| f.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Some(Evaluation {
        pronunciation: score("pronunciation")?,
        fluency: score("fluency")?,
        grammar: score("grammar")?,
        vocabulary: score("vocabulary")?,
        overall: score("overall")?,
        feedback: crate::model::CategoryFeedback {
            pronunciation: feedback("pronunciation"),
            fluency: feedback("fluency"),
            grammar: feedback("grammar"),
            vocabulary: feedback("vocabulary"),
        },
    })
}

/// Compose the user-facing reply from the evaluation and feedback pieces.
fn format_reply(
    evaluation: &Evaluation,
    feedback_text: &str,
    spanish_summary: &str,
    xp: i64,
    streak: i64,
) -> String {
    format!(
        "📊 *Your scores*\n\
         Pronunciation: {}  |  Fluency: {}\n\
         Grammar: {}  |  Vocabulary: {}\n\
         Overall: *{}*\n\n\
         {}\n\n\
         {}\n\n\
         ⭐ +{} XP  🔥 {}-day streak",
        evaluation.pronunciation,
        evaluation.fluency,
        evaluation.grammar,
        evaluation.vocabulary,
        evaluation.overall,
        feedback_text,
        spanish_summary,
        xp,
        streak,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_evaluation() {
        let raw = r#"{
            "pronunciation": 80, "fluency": 75, "grammar": 70, "vocabulary": 85, "overall": 78,
            "feedback": {
                "pronunciation": "clear", "fluency": "good pace",
                "grammar": "watch past tense", "vocabulary": "varied"
            }
        }"#;
        let evaluation = parse_evaluation(raw).unwrap();
        assert_eq!(evaluation.overall, 78);
        assert_eq!(evaluation.feedback.grammar, "watch past tense");
        assert!(!evaluation.is_fallback());
    }

    #[test]
    fn parses_fenced_evaluation_without_feedback() {
        let raw = "```json\n{\"pronunciation\": 60, \"fluency\": 60, \"grammar\": 60, \"vocabulary\": 60, \"overall\": 60}\n```";
        let evaluation = parse_evaluation(raw).unwrap();
        assert_eq!(evaluation.overall, 60);
        assert!(evaluation.feedback.pronunciation.is_empty());
    }

    #[test]
    fn rejects_partial_scores() {
        // A missing score rejects the whole reply; the caller substitutes
        // the complete fallback instead of mixing real and default values.
        let raw = r#"{"pronunciation": 80, "fluency": 75, "overall": 78}"#;
        assert!(parse_evaluation(raw).is_none());
        assert!(parse_evaluation("not json at all").is_none());
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let raw = r#"{"pronunciation": 250, "fluency": -5, "grammar": 70, "vocabulary": 70, "overall": 101}"#;
        let evaluation = parse_evaluation(raw).unwrap();
        assert_eq!(evaluation.pronunciation, 100);
        assert_eq!(evaluation.fluency, 0);
        assert_eq!(evaluation.overall, 100);
    }

    #[test]
    fn reply_includes_scores_and_progress() {
        let evaluation = Evaluation::fallback();
        let reply = format_reply(&evaluation, "Nice work!", "¡Muy bien!", 14, 3);
        assert!(reply.contains("Overall: *70*"));
        assert!(reply.contains("Nice work!"));
        assert!(reply.contains("¡Muy bien!"));
        assert!(reply.contains("+14 XP"));
        assert!(reply.contains("3-day streak"));
    }
}
