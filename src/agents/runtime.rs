//! Agent execution — runs a text agent against its resolved prompt and the
//! bounded conversation window.
//!
//! The practice-session agent is handled by the Session Pipeline, not here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::agents::AgentName;
use crate::config::CoreConfig;
use crate::error::Error;
use crate::model::{ConversationTurn, TurnRole, User};
use crate::prompts::PromptRegistry;
use crate::providers::{AiProvider, ChatMessage, CompletionRequest, Role};

const AGENT_MAX_TOKENS: u32 = 512;

/// Executes text agents: resolve prompt for the user's level, replay the
/// window, complete.
pub struct AgentRuntime {
    provider: Arc<dyn AiProvider>,
    registry: Arc<PromptRegistry>,
    config: CoreConfig,
}

impl AgentRuntime {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        registry: Arc<PromptRegistry>,
        config: CoreConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Run `agent` for the latest message and return its reply text.
    pub async fn run(
        &self,
        agent: AgentName,
        user: &User,
        window: &[ConversationTurn],
        latest: &str,
    ) -> Result<String, Error> {
        let template =
            self.registry
                .resolve(user.level, agent.prompt_type(), &self.config.persona)?;

        let vars = prompt_vars(user, &self.config.persona);
        let system = template.render(&vars);

        let mut messages = vec![ChatMessage::system(system)];
        for turn in window {
            let role = match turn.role {
                TurnRole::User => Role::User,
                TurnRole::Assistant => Role::Assistant,
            };
            messages.push(ChatMessage {
                role,
                content: turn.content.clone(),
            });
        }
        messages.push(ChatMessage::user(latest));

        let request = CompletionRequest::new(messages)
            .with_max_tokens(AGENT_MAX_TOKENS)
            .with_timeout(self.config.llm_timeout);

        let response = self.provider.complete(request).await?;
        debug!(user_id = %user.id, agent = %agent, "Agent replied");
        Ok(response.content.trim().to_string())
    }
}

/// Standard placeholder values available to every agent prompt.
pub fn prompt_vars<'a>(user: &User, persona: &str) -> HashMap<&'a str, String> {
    let mut vars = HashMap::new();
    vars.insert("persona", persona.to_string());
    vars.insert("name", user.display_name.clone());
    vars.insert("level", user.level.to_string());
    vars.insert("xp", user.xp.to_string());
    vars.insert("streak", user.streak.to_string());
    vars.insert("interests", user.interests.join(", "));
    vars.insert("goal", user.goal.clone().unwrap_or_default());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;

    #[test]
    fn prompt_vars_include_progress_fields() {
        let mut user = User::new(Platform::Telegram, "1", "Ana");
        user.xp = 120;
        user.streak = 4;
        user.interests = vec!["music".to_string(), "travel".to_string()];
        let vars = prompt_vars(&user, "profe");
        assert_eq!(vars["xp"], "120");
        assert_eq!(vars["streak"], "4");
        assert_eq!(vars["interests"], "music, travel");
        assert_eq!(vars["level"], "A0");
    }
}
