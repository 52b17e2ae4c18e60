//! Onboarding manager — drives a new user from first contact through the
//! placement test, interests, and goal, then hands them to the normal
//! conversation flow.
//!
//! All onboarding traffic bypasses the Router; the manager alone decides
//! what happens next based on the current step.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::Error;
use crate::model::{CefrLevel, LevelTest, User};
use crate::onboarding::extract;
use crate::onboarding::questions::placement_questions;
use crate::onboarding::scoring;
use crate::onboarding::state::{OnboardingState, OnboardingStep, QuestionResponse};
use crate::prompts::PromptRegistry;
use crate::providers::AiProvider;
use crate::store::{Database, StateStore};

pub struct OnboardingManager {
    db: Arc<dyn Database>,
    state_store: Arc<StateStore>,
    provider: Arc<dyn AiProvider>,
    registry: Arc<PromptRegistry>,
    config: CoreConfig,
}

impl OnboardingManager {
    pub fn new(
        db: Arc<dyn Database>,
        state_store: Arc<StateStore>,
        provider: Arc<dyn AiProvider>,
        registry: Arc<PromptRegistry>,
        config: CoreConfig,
    ) -> Self {
        Self {
            db,
            state_store,
            provider,
            registry,
            config,
        }
    }

    /// Handle one onboarding message and return the reply text.
    pub async fn handle(&self, user: &User, message: &str) -> Result<String, Error> {
        let mut state = match self.state_store.load(user.id).await? {
            Some(state) => state,
            None => {
                // First contact, or state abandoned past its TTL in both
                // stores. Either way the run starts over from the top.
                OnboardingState::new()
            }
        };

        let reply = match state.step {
            OnboardingStep::Welcome => self.handle_welcome(user, &mut state).await?,
            OnboardingStep::LevelTest => self.handle_level_test(user, &mut state, message).await?,
            OnboardingStep::Interests => self.handle_interests(user, &mut state, message).await?,
            OnboardingStep::Goal => self.handle_goal(user, &mut state, message).await?,
            OnboardingStep::Complete => {
                // Should not normally be reached; finalize defensively so a
                // finished user never loops back into onboarding.
                self.finalize(user.id).await?;
                "You're all set! Send me a message or a voice note to practice.".to_string()
            }
        };

        if state.step.is_terminal() {
            self.state_store.delete(user.id).await?;
        } else {
            state.touch();
            self.state_store.save(user.id, &state).await?;
            self.db
                .set_onboarding(user.id, true, state.step.as_str())
                .await?;
        }

        Ok(reply)
    }

    async fn handle_welcome(
        &self,
        user: &User,
        state: &mut OnboardingState,
    ) -> Result<String, Error> {
        state.questions = placement_questions();
        state.cursor = 0;
        state.advance(OnboardingStep::LevelTest);

        info!(user_id = %user.id, "Onboarding started");
        Ok(format!(
            "¡Hola {}! I'm your English practice buddy. 🎉\n\
             Before we start, let's do a quick placement test — {} short questions.\n\
             Answer in English as well as you can. Here's the first one:\n\n{}",
            user.display_name,
            state.questions.len(),
            state.questions[0].prompt
        ))
    }

    async fn handle_level_test(
        &self,
        user: &User,
        state: &mut OnboardingState,
        message: &str,
    ) -> Result<String, Error> {
        if state.questions.is_empty() {
            state.questions = placement_questions();
            state.cursor = 0;
        }

        // Ignore stray messages after all questions are answered.
        if state.cursor < state.questions.len() {
            let question = state.questions[state.cursor].clone();
            let overall = scoring::score_answer(
                &self.provider,
                &self.registry,
                &self.config,
                message,
                question.expected_words,
            )
            .await;

            state.responses.push(QuestionResponse {
                question: question.prompt,
                answer: message.to_string(),
                overall,
            });
            state.cursor += 1;
        }

        if state.cursor < state.questions.len() {
            let remaining = state.questions.len() - state.cursor;
            return Ok(format!(
                "Got it! {} more to go.\n\n{}",
                remaining,
                state.questions[state.cursor].prompt
            ));
        }

        // Test complete: persist the result and assign the level.
        let average = state.average_score();
        let level = CefrLevel::from_average_score(average);

        let responses = serde_json::to_value(&state.responses).unwrap_or_default();
        let test = LevelTest {
            id: Uuid::new_v4(),
            user_id: user.id,
            responses,
            average_score: average,
            assigned_level: level,
            created_at: chrono::Utc::now(),
        };
        self.db.insert_level_test(&test).await?;
        self.db.update_user_level(user.id, level).await?;

        state.advance(OnboardingStep::Interests);
        info!(user_id = %user.id, level = %level, average = average, "Placement test complete");

        Ok(format!(
            "Nice work — that's the test done! 🎓\n\
             Based on your answers, you're starting at level *{level}*.\n\n\
             Now tell me: what do you like? Music, sports, travel, movies... anything!"
        ))
    }

    async fn handle_interests(
        &self,
        user: &User,
        state: &mut OnboardingState,
        message: &str,
    ) -> Result<String, Error> {
        let interests = extract::extract_interests(message);
        self.db.update_user_interests(user.id, &interests).await?;
        state.interests = interests.clone();
        state.advance(OnboardingStep::Goal);

        Ok(format!(
            "Great — I'll bring up {} in our conversations. 👍\n\n\
             One last question: why are you learning English? \
             For work, travel, studies, or just to chat?",
            interests.join(" and ")
        ))
    }

    async fn handle_goal(
        &self,
        user: &User,
        state: &mut OnboardingState,
        message: &str,
    ) -> Result<String, Error> {
        let goal = extract::extract_goal(message);
        self.db.update_user_goal(user.id, &goal).await?;
        state.goal = Some(goal);
        state.advance(OnboardingStep::Complete);
        self.finalize(user.id).await?;

        info!(user_id = %user.id, "Onboarding complete");
        Ok(
            "Perfect, we're all set! 🚀\n\
             From now on, just talk to me in English — text or voice notes.\n\
             Voice notes get a full evaluation with scores and feedback. ¡Vamos!"
                .to_string(),
        )
    }

    /// Flip the user out of onboarding and drop the working state from
    /// both stores.
    async fn finalize(&self, user_id: Uuid) -> Result<(), Error> {
        self.db.set_onboarding(user_id, false, "complete").await?;
        if let Err(e) = self.state_store.delete(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to drop onboarding state after completion");
        }
        Ok(())
    }
}
