//! Dispatcher — the single entry point for every inbound message.
//!
//! Decides between the onboarding flow, the short-message shortcut, the
//! Router, and the practice pipeline, appends the conversation turns, and
//! delivers the reply. The catch-all apology lives here and nowhere else:
//! inner layers degrade or propagate, only the dispatcher talks to the
//! user about failures.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentName, AgentRuntime, Router};
use crate::config::CoreConfig;
use crate::error::{DatabaseError, Error};
use crate::gateway::{MessagingGateway, OutboundMessage};
use crate::model::{ConversationTurn, Platform, User};
use crate::onboarding::OnboardingManager;
use crate::providers::AiProvider;
use crate::session::{SessionInput, SessionPipeline};
use crate::store::Database;

const APOLOGY: &str =
    "Lo siento — something went wrong on my side. Please try again in a moment. 🙏";

/// One inbound message, already fetched from the platform.
#[derive(Debug, Clone)]
pub enum InboundContent {
    Text(String),
    Audio {
        data: Vec<u8>,
        /// Platform reference to the original audio (e.g. file id).
        input_ref: Option<String>,
    },
}

pub struct Dispatcher {
    db: Arc<dyn Database>,
    provider: Arc<dyn AiProvider>,
    router: Router,
    runtime: AgentRuntime,
    pipeline: SessionPipeline,
    onboarding: OnboardingManager,
    gateway: Arc<dyn MessagingGateway>,
    config: CoreConfig,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Database>,
        provider: Arc<dyn AiProvider>,
        router: Router,
        runtime: AgentRuntime,
        pipeline: SessionPipeline,
        onboarding: OnboardingManager,
        gateway: Arc<dyn MessagingGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            db,
            provider,
            router,
            runtime,
            pipeline,
            onboarding,
            gateway,
            config,
        }
    }

    /// Handle one inbound message end to end. Never returns an error to the
    /// caller: failures are logged and answered with the apology copy.
    pub async fn handle(
        &self,
        user_id: Uuid,
        platform: Platform,
        chat_id: &str,
        content: InboundContent,
    ) {
        match self.process(user_id, platform, chat_id, content).await {
            Ok(reply) => {
                if let Err(e) = self
                    .gateway
                    .send(platform, chat_id, OutboundMessage::text(reply))
                    .await
                {
                    error!(user_id = %user_id, error = %e, "Failed to deliver reply");
                }
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Turn failed; sending apology");
                if let Err(send_err) = self
                    .gateway
                    .send(platform, chat_id, OutboundMessage::text(APOLOGY))
                    .await
                {
                    error!(user_id = %user_id, error = %send_err, "Failed to deliver apology");
                }
            }
        }
    }

    /// The fallible inner flow: returns the reply text to deliver.
    async fn process(
        &self,
        user_id: Uuid,
        platform: Platform,
        chat_id: &str,
        content: InboundContent,
    ) -> Result<String, Error> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".to_string(),
                id: user_id.to_string(),
            })?;

        if user.is_onboarding {
            return self.handle_onboarding(&user, content).await;
        }

        match content {
            // Voice notes are always practice: no routing call needed. The
            // pipeline runs first so the transcription — not a placeholder —
            // lands in the conversation log as the user's turn.
            InboundContent::Audio { data, input_ref } => {
                let outcome = self
                    .pipeline
                    .run(
                        &user,
                        SessionInput::Audio { data, input_ref },
                        platform,
                        chat_id,
                    )
                    .await?;
                self.db
                    .append_turn(&ConversationTurn::user(user.id, &outcome.transcription))
                    .await?;
                self.db
                    .append_turn(&ConversationTurn::assistant(
                        user.id,
                        &outcome.reply,
                        AgentName::PracticeSession.as_str(),
                    ))
                    .await?;
                Ok(outcome.reply)
            }
            InboundContent::Text(text) => self.handle_text(&user, platform, chat_id, &text).await,
        }
    }

    async fn handle_text(
        &self,
        user: &User,
        platform: Platform,
        chat_id: &str,
        text: &str,
    ) -> Result<String, Error> {
        // Window excludes the latest message; it is passed separately.
        let window = self
            .db
            .recent_turns(user.id, self.config.history_window)
            .await?;
        self.db
            .append_turn(&ConversationTurn::user(user.id, text))
            .await?;

        let agent = if crate::agents::router::is_below_route_threshold(
            text,
            self.config.min_route_words,
        ) {
            info!(user_id = %user.id, "Short message; skipping the Router");
            AgentName::ShortResponse
        } else {
            self.router.decide(user, &window, text).await?
        };

        let reply = match agent {
            AgentName::PracticeSession => {
                self.pipeline
                    .run(
                        user,
                        SessionInput::Text(text.to_string()),
                        platform,
                        chat_id,
                    )
                    .await?
                    .reply
            }
            other => self.runtime.run(other, user, &window, text).await?,
        };

        self.db
            .append_turn(&ConversationTurn::assistant(
                user.id,
                &reply,
                agent.as_str(),
            ))
            .await?;
        Ok(reply)
    }

    /// Onboarding traffic goes to the manager verbatim, bypassing the
    /// Router. Voice answers are transcribed first.
    async fn handle_onboarding(
        &self,
        user: &User,
        content: InboundContent,
    ) -> Result<String, Error> {
        let text = match content {
            InboundContent::Text(text) => text,
            InboundContent::Audio { data, .. } => {
                match self.provider.transcribe(&data, "voice.ogg").await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(user_id = %user.id, error = %e, "Transcription failed during onboarding");
                        return Ok(
                            "I couldn't hear that one — could you type your answer instead?"
                                .to_string(),
                        );
                    }
                }
            }
        };
        self.onboarding.handle(user, &text).await
    }
}
