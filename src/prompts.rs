//! Prompt Registry — versioned system-prompt templates keyed by
//! (level, type, persona), with exact-level then wildcard-level resolution.
//!
//! Templates are loaded from the database once at startup. Resolution is a
//! pure lookup, so resolving the same key twice against an unchanged set
//! always returns the identical template.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::model::CefrLevel;

/// Prompt type names used by the agent catalog and pipelines.
pub mod prompt_types {
    pub const ROUTER: &str = "router";
    pub const PRACTICE_SESSION: &str = "practice_session";
    pub const META_QUERY: &str = "meta_query";
    pub const CUSTOMER_SERVICE: &str = "customer_service";
    pub const ONBOARDING: &str = "onboarding";
    pub const SHORT_RESPONSE: &str = "short_response";
    pub const TEXT_SUMMARY: &str = "text_summary";
    pub const SPEECH_EVALUATION: &str = "speech_evaluation";
    pub const TEACHER_FEEDBACK: &str = "teacher_feedback";
    pub const SPANISH_SUMMARY: &str = "spanish_summary";
    pub const GRAMMAR_SCORING: &str = "grammar_scoring";
}

/// A reusable system-prompt definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: Uuid,
    /// Level scope; `None` is the wildcard ("all") scope.
    pub level: Option<CefrLevel>,
    pub prompt_type: String,
    pub persona: String,
    /// Template body with `{name}` placeholders.
    pub body: String,
    /// Declared placeholder names.
    pub variables: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromptTemplate {
    /// Substitute `{name}` placeholders from the given map. Unknown
    /// placeholders are left in place.
    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        let mut out = self.body.clone();
        for (key, value) in vars {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// Immutable registry of active prompt templates, built once at startup.
pub struct PromptRegistry {
    templates: Vec<PromptTemplate>,
}

impl PromptRegistry {
    /// Build from a set of templates; inactive ones are dropped here so
    /// resolution never has to re-check the flag.
    pub fn new(templates: Vec<PromptTemplate>) -> Self {
        Self {
            templates: templates.into_iter().filter(|t| t.active).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Resolve a template for (level, type, persona).
    ///
    /// Tries an exact level match first, then the wildcard level. A miss on
    /// both is a hard configuration error; callers that can degrade must
    /// supply their own inline fallback instead of propagating it.
    pub fn resolve(
        &self,
        level: CefrLevel,
        prompt_type: &str,
        persona: &str,
    ) -> Result<&PromptTemplate, ConfigError> {
        let exact = self.templates.iter().find(|t| {
            t.level == Some(level) && t.prompt_type == prompt_type && t.persona == persona
        });
        if let Some(template) = exact {
            return Ok(template);
        }
        self.templates
            .iter()
            .find(|t| t.level.is_none() && t.prompt_type == prompt_type && t.persona == persona)
            .ok_or_else(|| ConfigError::MissingPrompt {
                prompt_type: prompt_type.to_string(),
                persona: persona.to_string(),
                level: level.to_string(),
            })
    }
}

/// Built-in wildcard templates seeded into an empty database so a fresh
/// deployment can route and evaluate without content tooling.
pub fn default_templates(persona: &str) -> Vec<PromptTemplate> {
    let template = |prompt_type: &str, body: &str, variables: &[&str]| PromptTemplate {
        id: Uuid::new_v4(),
        level: None,
        prompt_type: prompt_type.to_string(),
        persona: persona.to_string(),
        body: body.to_string(),
        variables: variables.iter().map(|s| s.to_string()).collect(),
        active: true,
        created_at: Utc::now(),
    };

    vec![
        template(
            prompt_types::ROUTER,
            "You are the routing brain of an English-practice assistant for Spanish speakers.\n\
             Given the conversation so far and the latest user message, pick exactly one agent.\n\n\
             Available agents:\n{agent_manifest}\n\n\
             Respond with a single JSON object: {\"agent_to_invoke\": \"<agent name>\", \"reasoning\": \"<one sentence>\"}.\n\
             The agent name must be one of the listed names, verbatim.",
            &["agent_manifest"],
        ),
        template(
            prompt_types::PRACTICE_SESSION,
            "You are {persona}, a friendly English teacher for a {level} student named {name}.\n\
             Reply conversationally in simple English suited to their level, gently recasting mistakes.",
            &["persona", "level", "name"],
        ),
        template(
            prompt_types::META_QUERY,
            "You are {persona}, answering questions about the student's own progress.\n\
             The student is at level {level} with {xp} XP and a {streak}-day streak.\n\
             Answer briefly and encouragingly.",
            &["persona", "level", "xp", "streak"],
        ),
        template(
            prompt_types::CUSTOMER_SERVICE,
            "You are {persona}, handling account and product questions for a language-practice service.\n\
             Be helpful and concise. If you cannot resolve something, say a human will follow up.",
            &["persona"],
        ),
        template(
            prompt_types::ONBOARDING,
            "You are {persona}, welcoming a brand-new student named {name}.\n\
             Be warm and brief; explain that a short placement test comes first.",
            &["persona", "name"],
        ),
        template(
            prompt_types::SHORT_RESPONSE,
            "You are {persona}, replying to a very short message from a {level} student.\n\
             Answer in one or two short sentences of simple English and invite them to say more.",
            &["persona", "level"],
        ),
        template(
            prompt_types::TEXT_SUMMARY,
            "You are {persona}. Summarize the text the student sent in simple {level}-appropriate English,\n\
             in at most three sentences.",
            &["persona", "level"],
        ),
        template(
            prompt_types::SPEECH_EVALUATION,
            "You are an English speech evaluator for a {level} student.\n\
             Score the transcription below on pronunciation, fluency, grammar, and vocabulary (0-100 each),\n\
             plus an overall score (0-100). Respond with ONLY a JSON object:\n\
             {\"pronunciation\": n, \"fluency\": n, \"grammar\": n, \"vocabulary\": n, \"overall\": n,\n\
              \"feedback\": {\"pronunciation\": \"...\", \"fluency\": \"...\", \"grammar\": \"...\", \"vocabulary\": \"...\"}}",
            &["level"],
        ),
        template(
            prompt_types::TEACHER_FEEDBACK,
            "You are {persona}, recording a short spoken feedback message for a {level} student.\n\
             Based on the evaluation, write 2-3 encouraging sentences in simple English,\n\
             mentioning one thing they did well and one thing to practice.",
            &["persona", "level"],
        ),
        template(
            prompt_types::SPANISH_SUMMARY,
            "Escribe un resumen breve (2 frases) en español de la evaluación del estudiante,\n\
             con tono amable y una sugerencia concreta.",
            &[],
        ),
        template(
            prompt_types::GRAMMAR_SCORING,
            "Score the grammar of the following English answer from a placement test, 0-100.\n\
             Respond with ONLY a JSON object: {\"score\": n, \"notes\": \"...\"}",
            &[],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(levels: &[(Option<CefrLevel>, &str)]) -> PromptRegistry {
        let templates = levels
            .iter()
            .map(|(level, body)| PromptTemplate {
                id: Uuid::new_v4(),
                level: *level,
                prompt_type: "practice_session".to_string(),
                persona: "profe".to_string(),
                body: body.to_string(),
                variables: vec![],
                active: true,
                created_at: Utc::now(),
            })
            .collect();
        PromptRegistry::new(templates)
    }

    #[test]
    fn exact_level_wins_over_wildcard() {
        let registry = registry_with(&[(None, "wildcard"), (Some(CefrLevel::B1), "exact")]);
        let resolved = registry
            .resolve(CefrLevel::B1, "practice_session", "profe")
            .unwrap();
        assert_eq!(resolved.body, "exact");
    }

    #[test]
    fn falls_back_to_wildcard() {
        let registry = registry_with(&[(None, "wildcard"), (Some(CefrLevel::B1), "exact")]);
        let resolved = registry
            .resolve(CefrLevel::A2, "practice_session", "profe")
            .unwrap();
        assert_eq!(resolved.body, "wildcard");
    }

    #[test]
    fn missing_is_a_config_error() {
        let registry = registry_with(&[(Some(CefrLevel::B1), "exact")]);
        let err = registry
            .resolve(CefrLevel::A0, "practice_session", "profe")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPrompt { .. }));
    }

    #[test]
    fn resolution_is_idempotent() {
        let registry = registry_with(&[(None, "wildcard"), (Some(CefrLevel::B1), "exact")]);
        let first = registry
            .resolve(CefrLevel::B1, "practice_session", "profe")
            .unwrap()
            .id;
        let second = registry
            .resolve(CefrLevel::B1, "practice_session", "profe")
            .unwrap()
            .id;
        assert_eq!(first, second);
    }

    #[test]
    fn inactive_templates_are_invisible() {
        let template = PromptTemplate {
            id: Uuid::new_v4(),
            level: None,
            prompt_type: "practice_session".to_string(),
            persona: "profe".to_string(),
            body: "inactive".to_string(),
            variables: vec![],
            active: false,
            created_at: Utc::now(),
        };
        let registry = PromptRegistry::new(vec![template]);
        assert!(registry
            .resolve(CefrLevel::A0, "practice_session", "profe")
            .is_err());
    }

    #[test]
    fn render_substitutes_placeholders() {
        let template = PromptTemplate {
            id: Uuid::new_v4(),
            level: None,
            prompt_type: "short_response".to_string(),
            persona: "profe".to_string(),
            body: "Hello {name}, you are at {level}.".to_string(),
            variables: vec!["name".to_string(), "level".to_string()],
            active: true,
            created_at: Utc::now(),
        };
        let mut vars = HashMap::new();
        vars.insert("name", "Ana".to_string());
        vars.insert("level", "B1".to_string());
        assert_eq!(template.render(&vars), "Hello Ana, you are at B1.");
    }

    #[test]
    fn default_templates_cover_all_prompt_types() {
        let templates = default_templates("profe");
        let registry = PromptRegistry::new(templates);
        for prompt_type in [
            prompt_types::ROUTER,
            prompt_types::PRACTICE_SESSION,
            prompt_types::META_QUERY,
            prompt_types::CUSTOMER_SERVICE,
            prompt_types::ONBOARDING,
            prompt_types::SHORT_RESPONSE,
            prompt_types::TEXT_SUMMARY,
            prompt_types::SPEECH_EVALUATION,
            prompt_types::TEACHER_FEEDBACK,
            prompt_types::SPANISH_SUMMARY,
            prompt_types::GRAMMAR_SCORING,
        ] {
            assert!(
                registry.resolve(CefrLevel::A0, prompt_type, "profe").is_ok(),
                "missing default template for {prompt_type}"
            );
        }
    }
}
