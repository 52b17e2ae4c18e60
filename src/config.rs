//! Configuration types.

use std::time::Duration;

/// Core runtime configuration.
///
/// Every external call timeout lives here so a single turn can never hang
/// indefinitely on one slow collaborator.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How many recent conversation turns are loaded as context.
    pub history_window: usize,
    /// Messages with fewer words than this skip the Router entirely and go
    /// straight to the short-response agent.
    pub min_route_words: usize,
    /// Base XP awarded per practice session before multipliers.
    pub xp_base: u32,
    /// Word count at or above which an audio session earns the duration bonus.
    pub duration_bonus_words: usize,
    /// Flat XP added for long audio sessions.
    pub duration_bonus_xp: i64,
    /// Timeout for chat-completion calls.
    pub llm_timeout: Duration,
    /// Timeout for transcription calls.
    pub stt_timeout: Duration,
    /// Timeout for speech-synthesis calls.
    pub tts_timeout: Duration,
    /// Timeout for messaging-platform API calls.
    pub gateway_timeout: Duration,
    /// Retry budget for the grammar-scoring call during onboarding.
    pub grammar_retries: u32,
    /// Retry budget per provider in the failover chain.
    pub provider_retries: u32,
    /// Base backoff between provider retries (doubles per attempt).
    pub retry_backoff: Duration,
    /// Onboarding state older than this is treated as abandoned.
    pub onboarding_ttl: Duration,
    /// Minimum sessions at the current level before a level-up check counts.
    pub level_up_min_sessions: usize,
    /// Average overall score needed to flag level-up eligibility.
    pub level_up_threshold: f64,
    /// Persona used when resolving prompt templates.
    pub persona: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            min_route_words: 4,
            xp_base: 10,
            duration_bonus_words: 30,
            duration_bonus_xp: 2,
            llm_timeout: Duration::from_secs(30),
            stt_timeout: Duration::from_secs(15),
            tts_timeout: Duration::from_secs(15),
            gateway_timeout: Duration::from_secs(10),
            grammar_retries: 2,
            provider_retries: 2,
            retry_backoff: Duration::from_millis(500),
            onboarding_ttl: Duration::from_secs(2 * 60 * 60),
            level_up_min_sessions: 5,
            level_up_threshold: 85.0,
            persona: "profe".to_string(),
        }
    }
}

impl CoreConfig {
    /// Build config from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_usize("CHARLA_HISTORY_WINDOW") {
            config.history_window = n;
        }
        if let Some(n) = env_usize("CHARLA_MIN_ROUTE_WORDS") {
            config.min_route_words = n;
        }
        if let Some(n) = env_u64("CHARLA_XP_BASE") {
            config.xp_base = n as u32;
        }
        if let Some(n) = env_u64("CHARLA_LLM_TIMEOUT_SECS") {
            config.llm_timeout = Duration::from_secs(n);
        }
        if let Some(n) = env_u64("CHARLA_STT_TIMEOUT_SECS") {
            config.stt_timeout = Duration::from_secs(n);
        }
        if let Some(n) = env_u64("CHARLA_TTS_TIMEOUT_SECS") {
            config.tts_timeout = Duration::from_secs(n);
        }
        if let Some(n) = env_u64("CHARLA_GATEWAY_TIMEOUT_SECS") {
            config.gateway_timeout = Duration::from_secs(n);
        }
        if let Some(n) = env_u64("CHARLA_ONBOARDING_TTL_SECS") {
            config.onboarding_ttl = Duration::from_secs(n);
        }
        if let Some(n) = env_u64("CHARLA_GRAMMAR_RETRIES") {
            config.grammar_retries = n as u32;
        }
        if let Some(n) = env_u64("CHARLA_PROVIDER_RETRIES") {
            config.provider_retries = n as u32;
        }
        if let Ok(persona) = std::env::var("CHARLA_PERSONA") {
            if !persona.trim().is_empty() {
                config.persona = persona.trim().to_string();
            }
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoreConfig::default();
        assert!(config.history_window > 0);
        assert!(config.min_route_words > 0);
        assert!(config.llm_timeout >= Duration::from_secs(10));
        assert_eq!(config.onboarding_ttl, Duration::from_secs(7200));
    }
}
