//! Router — asks an LLM to pick exactly one agent for the latest message.
//!
//! The pick is validated against the catalog; any unparseable or unknown
//! answer falls back to the configured default agent instead of failing
//! the turn. The reasoning string is logged, never shown to the user.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::agents::{agent_manifest, AgentName};
use crate::config::CoreConfig;
use crate::error::Error;
use crate::model::{ConversationTurn, TurnRole, User};
use crate::prompts::{prompt_types, PromptRegistry};
use crate::providers::{AiProvider, ChatMessage, CompletionRequest};

/// Max tokens for the routing call (kept tight — runs on every message).
const ROUTE_MAX_TOKENS: u32 = 256;

/// Temperature for routing (deterministic-ish).
const ROUTE_TEMPERATURE: f32 = 0.1;

/// Picks the agent for a turn.
pub struct Router {
    provider: Arc<dyn AiProvider>,
    registry: Arc<PromptRegistry>,
    config: CoreConfig,
    default_agent: AgentName,
}

impl Router {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        registry: Arc<PromptRegistry>,
        config: CoreConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            default_agent: AgentName::ShortResponse,
        }
    }

    /// Decide which agent handles the latest message.
    ///
    /// The Router prompt itself has no fallback — a missing template is
    /// fatal to the turn. An LLM failure or bad pick degrades to the
    /// default agent instead.
    pub async fn decide(
        &self,
        user: &User,
        window: &[ConversationTurn],
        latest: &str,
    ) -> Result<AgentName, Error> {
        let template =
            self.registry
                .resolve(user.level, prompt_types::ROUTER, &self.config.persona)?;

        let mut vars = HashMap::new();
        vars.insert("agent_manifest", agent_manifest());
        let system = template.render(&vars);
        let context = format_history(window, latest);

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(context),
        ])
        .with_max_tokens(ROUTE_MAX_TOKENS)
        .with_temperature(ROUTE_TEMPERATURE)
        .with_json_mode()
        .with_timeout(self.config.llm_timeout);

        let raw = match self.provider.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Routing call failed; using default agent");
                return Ok(self.default_agent);
            }
        };

        match parse_route_decision(&raw) {
            Some((agent, reasoning)) => {
                debug!(user_id = %user.id, agent = %agent, reasoning = %reasoning, "Routed");
                Ok(agent)
            }
            None => {
                warn!(
                    user_id = %user.id,
                    raw = %raw.chars().take(200).collect::<String>(),
                    "Unparseable or unknown routing pick; using default agent"
                );
                Ok(self.default_agent)
            }
        }
    }
}

/// Format the bounded conversation window as alternating role-tagged lines,
/// with the latest message appended.
pub fn format_history(window: &[ConversationTurn], latest: &str) -> String {
    let mut lines: Vec<String> = window
        .iter()
        .map(|turn| {
            let tag = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            format!("{tag}: {}", turn.content)
        })
        .collect();
    lines.push(format!("user: {latest}"));
    lines.join("\n")
}

/// Parse the Router's `{"agent_to_invoke", "reasoning"}` reply defensively.
///
/// Accepts an already-shaped JSON object, a JSON string containing one, or
/// fenced JSON. Returns `None` on any parse failure or unknown agent name.
pub fn parse_route_decision(raw: &str) -> Option<(AgentName, String)> {
    let cleaned = crate::providers::strip_code_fences(raw);
    let mut value: serde_json::Value = serde_json::from_str(cleaned).ok()?;

    // The model occasionally double-encodes: a JSON string holding the object.
    if let serde_json::Value::String(inner) = &value {
        value = serde_json::from_str(inner).ok()?;
    }

    let agent = value.get("agent_to_invoke")?.as_str()?.parse().ok()?;
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Some((agent, reasoning))
}

/// Whether a message is too short to be worth routing. Below the threshold
/// the dispatcher sends it straight to the short-response agent without
/// consulting the Router at all.
pub fn is_below_route_threshold(message: &str, min_words: usize) -> bool {
    message.split_whitespace().count() < min_words
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parses_well_formed_decision() {
        let raw = r#"{"agent_to_invoke": "practice-session", "reasoning": "long voice note"}"#;
        let (agent, reasoning) = parse_route_decision(raw).unwrap();
        assert_eq!(agent, AgentName::PracticeSession);
        assert_eq!(reasoning, "long voice note");
    }

    #[test]
    fn parses_fenced_decision() {
        let raw = "```json\n{\"agent_to_invoke\": \"meta-query\", \"reasoning\": \"asks about xp\"}\n```";
        let (agent, _) = parse_route_decision(raw).unwrap();
        assert_eq!(agent, AgentName::MetaQuery);
    }

    #[test]
    fn parses_double_encoded_decision() {
        let inner = r#"{"agent_to_invoke": "text-summary", "reasoning": "pasted article"}"#;
        let raw = serde_json::to_string(inner).unwrap();
        let (agent, _) = parse_route_decision(&raw).unwrap();
        assert_eq!(agent, AgentName::TextSummary);
    }

    #[test]
    fn rejects_unknown_agent() {
        let raw = r#"{"agent_to_invoke": "world-domination", "reasoning": "hmm"}"#;
        assert!(parse_route_decision(raw).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_route_decision("I think practice-session fits best!").is_none());
        assert!(parse_route_decision("").is_none());
        assert!(parse_route_decision("{\"reasoning\": \"no pick\"}").is_none());
    }

    #[test]
    fn missing_reasoning_is_tolerated() {
        let raw = r#"{"agent_to_invoke": "short-response"}"#;
        let (agent, reasoning) = parse_route_decision(raw).unwrap();
        assert_eq!(agent, AgentName::ShortResponse);
        assert!(reasoning.is_empty());
    }

    #[test]
    fn short_message_threshold() {
        assert!(is_below_route_threshold("hola", 4));
        assert!(is_below_route_threshold("ok thanks bye", 4));
        assert!(!is_below_route_threshold("I would like to practice today", 4));
    }

    #[test]
    fn history_formatting() {
        let user_id = Uuid::new_v4();
        let window = vec![
            ConversationTurn::user(user_id, "hello"),
            ConversationTurn::assistant(user_id, "hi there", "short-response"),
        ];
        let formatted = format_history(&window, "how is my streak?");
        assert_eq!(
            formatted,
            "user: hello\nassistant: hi there\nuser: how is my streak?"
        );
    }
}
