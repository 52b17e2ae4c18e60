//! Agent Catalog — the fixed set of specialist behaviors the Router can
//! dispatch to, each bound to a prompt type and an output contract.

pub mod router;
pub mod runtime;

pub use router::Router;
pub use runtime::AgentRuntime;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::CefrLevel;
use crate::prompts::{prompt_types, PromptRegistry};

/// Expected output shape of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContract {
    FreeText,
    Json,
}

/// The dispatchable specialist agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentName {
    PracticeSession,
    MetaQuery,
    CustomerService,
    Onboarding,
    ShortResponse,
    TextSummary,
}

impl AgentName {
    pub fn all() -> [AgentName; 6] {
        use AgentName::*;
        [
            PracticeSession,
            MetaQuery,
            CustomerService,
            Onboarding,
            ShortResponse,
            TextSummary,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PracticeSession => "practice-session",
            Self::MetaQuery => "meta-query",
            Self::CustomerService => "customer-service",
            Self::Onboarding => "onboarding",
            Self::ShortResponse => "short-response",
            Self::TextSummary => "text-summary",
        }
    }

    /// One-line natural-language description for the Router manifest.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PracticeSession => {
                "the user is practicing English: a voice note or a substantial message to evaluate"
            }
            Self::MetaQuery => {
                "the user asks about their own progress, level, XP, or streak"
            }
            Self::CustomerService => {
                "the user has an account, billing, or product question"
            }
            Self::Onboarding => {
                "the user is brand new or explicitly asks to restart their setup"
            }
            Self::ShortResponse => {
                "the message is a brief greeting, acknowledgement, or small talk"
            }
            Self::TextSummary => {
                "the user pasted a text and wants it summarized or explained"
            }
        }
    }

    /// Prompt type backing this agent in the registry.
    pub fn prompt_type(&self) -> &'static str {
        match self {
            Self::PracticeSession => prompt_types::PRACTICE_SESSION,
            Self::MetaQuery => prompt_types::META_QUERY,
            Self::CustomerService => prompt_types::CUSTOMER_SERVICE,
            Self::Onboarding => prompt_types::ONBOARDING,
            Self::ShortResponse => prompt_types::SHORT_RESPONSE,
            Self::TextSummary => prompt_types::TEXT_SUMMARY,
        }
    }

    pub fn output_contract(&self) -> OutputContract {
        // All dispatchable agents reply in free text; structured JSON lives
        // in the evaluation/routing prompts, not in user-facing agents.
        OutputContract::FreeText
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Tolerate underscore variants the LLM sometimes emits.
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "practice-session" => Ok(Self::PracticeSession),
            "meta-query" => Ok(Self::MetaQuery),
            "customer-service" => Ok(Self::CustomerService),
            "onboarding" => Ok(Self::Onboarding),
            "short-response" => Ok(Self::ShortResponse),
            "text-summary" => Ok(Self::TextSummary),
            other => Err(format!("Unknown agent: {other}")),
        }
    }
}

/// Build the manifest block listed in the Router prompt.
pub fn agent_manifest() -> String {
    AgentName::all()
        .iter()
        .map(|agent| format!("- {}: invoke when {}", agent.as_str(), agent.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verify at startup that every agent in the manifest has a resolvable
/// prompt (at any level, thanks to the wildcard fallback). Startup is
/// rejected if one is missing.
pub fn verify_catalog(registry: &PromptRegistry, persona: &str) -> Result<(), ConfigError> {
    for agent in AgentName::all() {
        registry.resolve(CefrLevel::A0, agent.prompt_type(), persona)?;
    }
    // The Router's own prompt has no fallback: its absence is fatal.
    registry.resolve(CefrLevel::A0, prompt_types::ROUTER, persona)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::default_templates;

    #[test]
    fn agent_names_roundtrip() {
        for agent in AgentName::all() {
            let parsed: AgentName = agent.as_str().parse().unwrap();
            assert_eq!(parsed, agent);
        }
    }

    #[test]
    fn parses_underscore_and_case_variants() {
        assert_eq!(
            "practice_session".parse::<AgentName>().unwrap(),
            AgentName::PracticeSession
        );
        assert_eq!(
            "Short-Response".parse::<AgentName>().unwrap(),
            AgentName::ShortResponse
        );
        assert!("general-chat".parse::<AgentName>().is_err());
    }

    #[test]
    fn manifest_lists_every_agent() {
        let manifest = agent_manifest();
        for agent in AgentName::all() {
            assert!(manifest.contains(agent.as_str()));
        }
    }

    #[test]
    fn default_templates_pass_catalog_check() {
        let registry = PromptRegistry::new(default_templates("profe"));
        assert!(verify_catalog(&registry, "profe").is_ok());
    }

    #[test]
    fn missing_router_prompt_fails_catalog_check() {
        let templates = default_templates("profe")
            .into_iter()
            .filter(|t| t.prompt_type != prompt_types::ROUTER)
            .collect();
        let registry = PromptRegistry::new(templates);
        assert!(verify_catalog(&registry, "profe").is_err());
    }
}
