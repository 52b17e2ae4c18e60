//! Placement-answer scoring.
//!
//! Each answer gets three component scores on a 0-100 scale:
//! grammar (LLM-judged, with bounded retries and a neutral fallback),
//! complexity (sentence length and connectives), and length (actual vs
//! expected word count). The overall is a fixed weighted blend.

use std::sync::Arc;

use tracing::warn;

use crate::config::CoreConfig;
use crate::model::CefrLevel;
use crate::prompts::{prompt_types, PromptRegistry};
use crate::providers::{strip_code_fences, AiProvider, ChatMessage, CompletionRequest};

const GRAMMAR_WEIGHT: f64 = 0.4;
const COMPLEXITY_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.3;

/// Neutral grammar score used when the judging call keeps failing.
const GRAMMAR_FALLBACK: f64 = 70.0;

const CONNECTIVES: &[&str] = &[
    "because", "although", "however", "therefore", "while", "which", "whereas", "unless",
    "despite", "moreover",
];

/// Blended overall score for one placement answer.
pub async fn score_answer(
    provider: &Arc<dyn AiProvider>,
    registry: &PromptRegistry,
    config: &CoreConfig,
    answer: &str,
    expected_words: usize,
) -> f64 {
    let grammar = grammar_score(provider, registry, config, answer).await;
    let complexity = complexity_score(answer);
    let length = length_score(answer, expected_words);

    grammar * GRAMMAR_WEIGHT + complexity * COMPLEXITY_WEIGHT + length * LENGTH_WEIGHT
}

/// Ask the LLM for a grammar score. Retries up to `config.grammar_retries`
/// extra times on failure; falls back to a neutral 70 if all attempts fail
/// so the placement test never gets stuck on one bad call.
pub async fn grammar_score(
    provider: &Arc<dyn AiProvider>,
    registry: &PromptRegistry,
    config: &CoreConfig,
    answer: &str,
) -> f64 {
    let template = match registry.resolve(
        CefrLevel::A0,
        prompt_types::GRAMMAR_SCORING,
        &config.persona,
    ) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Grammar-scoring prompt missing; using fallback score");
            return GRAMMAR_FALLBACK;
        }
    };
    let system = template.body.clone();

    for attempt in 0..=config.grammar_retries {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system.clone()),
            ChatMessage::user(answer),
        ])
        .with_max_tokens(128)
        .with_temperature(0.0)
        .with_json_mode()
        .with_timeout(config.llm_timeout);

        match provider.complete(request).await {
            Ok(response) => match parse_grammar_score(&response.content) {
                Some(score) => return score,
                None => {
                    warn!(attempt, "Unparseable grammar-scoring reply");
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "Grammar-scoring call failed");
            }
        }
    }

    warn!("Grammar scoring exhausted retries; using fallback score");
    GRAMMAR_FALLBACK
}

/// Parse the `{"score": n, ...}` judge reply, tolerating fences.
pub fn parse_grammar_score(raw: &str) -> Option<f64> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw)).ok()?;
    let score = value.get("score")?.as_f64()?;
    Some(score.clamp(0.0, 100.0))
}

/// Heuristic sentence-complexity score: longer sentences and subordinating
/// connectives indicate a more advanced speaker.
pub fn complexity_score(answer: &str) -> f64 {
    let words: Vec<&str> = answer.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let sentences = answer
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let words_per_sentence = words.len() as f64 / sentences as f64;
    // ~15 words per sentence maps to full marks on this component.
    let length_component = (words_per_sentence / 15.0).min(1.0) * 60.0;

    let lower = answer.to_lowercase();
    let connective_hits = CONNECTIVES
        .iter()
        .filter(|c| lower.contains(*c))
        .count()
        .min(4);
    let connective_component = connective_hits as f64 * 10.0;

    (length_component + connective_component).min(100.0)
}

/// How close the answer length comes to what a solid answer would have.
/// Overshooting is fine; undershooting scales down linearly.
pub fn length_score(answer: &str, expected_words: usize) -> f64 {
    if expected_words == 0 {
        return 100.0;
    }
    let actual = answer.split_whitespace().count() as f64;
    (actual / expected_words as f64).min(1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grammar_score_json() {
        assert_eq!(
            parse_grammar_score(r#"{"score": 85, "notes": "solid"}"#),
            Some(85.0)
        );
        assert_eq!(
            parse_grammar_score("```json\n{\"score\": 40.5}\n```"),
            Some(40.5)
        );
        assert_eq!(parse_grammar_score(r#"{"score": 150}"#), Some(100.0));
        assert_eq!(parse_grammar_score("eighty five"), None);
        assert_eq!(parse_grammar_score(r#"{"notes": "no score"}"#), None);
    }

    #[test]
    fn empty_answer_has_zero_complexity() {
        assert_eq!(complexity_score(""), 0.0);
        assert_eq!(complexity_score("   "), 0.0);
    }

    #[test]
    fn complexity_rewards_connectives() {
        let simple = "I like food. I eat rice.";
        let complex =
            "Although I usually eat rice because it is cheap, I sometimes cook pasta, which takes longer.";
        assert!(complexity_score(complex) > complexity_score(simple));
    }

    #[test]
    fn length_score_scales_and_caps() {
        assert_eq!(length_score("one two three four five", 10), 50.0);
        assert_eq!(length_score("one two three four five", 5), 100.0);
        // Overshooting is not penalized.
        assert_eq!(length_score("one two three four five six", 3), 100.0);
        assert_eq!(length_score("", 10), 0.0);
    }
}
