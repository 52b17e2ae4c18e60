//! Shared domain types: users, conversation turns, practice sessions,
//! evaluations, and the CEFR level scale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CEFR proficiency bands, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CefrLevel {
    A0,
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    /// XP multiplier per level — higher levels earn more per session.
    pub fn xp_multiplier(&self) -> f64 {
        match self {
            Self::A0 => 1.0,
            Self::A1 => 1.1,
            Self::A2 => 1.2,
            Self::B1 => 1.3,
            Self::B2 => 1.4,
            Self::C1 => 1.5,
            Self::C2 => 1.6,
        }
    }

    /// Inclusive [min, max] score range of this band for placement-test
    /// averaging. Ranges cover 0..=100 with no gaps.
    pub fn score_range(&self) -> (f64, f64) {
        match self {
            Self::A0 => (0.0, 20.0),
            Self::A1 => (20.0, 35.0),
            Self::A2 => (35.0, 50.0),
            Self::B1 => (50.0, 65.0),
            Self::B2 => (65.0, 78.0),
            Self::C1 => (78.0, 90.0),
            Self::C2 => (90.0, 100.0),
        }
    }

    /// Map an average placement-test score to the band containing it.
    pub fn from_average_score(average: f64) -> Self {
        let clamped = average.clamp(0.0, 100.0);
        for level in Self::all() {
            let (min, max) = level.score_range();
            if clamped >= min && clamped < max {
                return level;
            }
        }
        Self::C2
    }

    /// The next band up, if any.
    pub fn next(&self) -> Option<CefrLevel> {
        use CefrLevel::*;
        match self {
            A0 => Some(A1),
            A1 => Some(A2),
            A2 => Some(B1),
            B1 => Some(B2),
            B2 => Some(C1),
            C1 => Some(C2),
            C2 => None,
        }
    }

    /// All levels, lowest first.
    pub fn all() -> [CefrLevel; 7] {
        use CefrLevel::*;
        [A0, A1, A2, B1, B2, C1, C2]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A0 => "A0",
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A0" => Ok(Self::A0),
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            other => Err(format!("Unknown CEFR level: {other}")),
        }
    }
}

/// Messaging platform a user is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Telegram,
    Whatsapp,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Telegram => "telegram",
            Self::Whatsapp => "whatsapp",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// A learner. Created on first contact from an unrecognized platform id,
/// defaulted to the lowest level with onboarding pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Per-platform external ids. At least one binding is expected.
    pub telegram_id: Option<String>,
    pub whatsapp_id: Option<String>,
    pub display_name: String,
    pub level: CefrLevel,
    /// Monotonic non-negative experience counter.
    pub xp: i64,
    /// Consecutive practice days. Resets on gaps.
    pub streak: i64,
    pub interests: Vec<String>,
    pub goal: Option<String>,
    pub is_onboarding: bool,
    /// Current onboarding step name (see `onboarding::OnboardingStep`).
    pub onboarding_step: String,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// New user with defaults: lowest level, onboarding pending.
    pub fn new(platform: Platform, external_id: &str, display_name: &str) -> Self {
        let now = Utc::now();
        let (telegram_id, whatsapp_id) = match platform {
            Platform::Telegram => (Some(external_id.to_string()), None),
            Platform::Whatsapp => (None, Some(external_id.to_string())),
        };
        Self {
            id: Uuid::new_v4(),
            telegram_id,
            whatsapp_id,
            display_name: display_name.to_string(),
            level: CefrLevel::A0,
            xp: 0,
            streak: 0,
            interests: Vec::new(),
            goal: None,
            is_onboarding: true,
            onboarding_step: "welcome".to_string(),
            last_activity: now,
            created_at: now,
        }
    }

    /// The external id for a given platform, if bound.
    pub fn platform_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Telegram => self.telegram_id.as_deref(),
            Platform::Whatsapp => self.whatsapp_id.as_deref(),
        }
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        write!(f, "{s}")
    }
}

/// One immutable message in a user's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    /// Name of the agent that produced this turn (assistant turns only).
    pub agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(user_id: Uuid, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role: TurnRole::User,
            content: content.to_string(),
            agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(user_id: Uuid, content: &str, agent: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role: TurnRole::Assistant,
            content: content.to_string(),
            agent: Some(agent.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Per-category feedback strings from a speech evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeedback {
    pub pronunciation: String,
    pub fluency: String,
    pub grammar: String,
    pub vocabulary: String,
}

/// A structured speech evaluation. All five scores are present together
/// or the whole value is replaced by `Evaluation::fallback()` — never a
/// partial mix from a crashed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub pronunciation: u8,
    pub fluency: u8,
    pub grammar: u8,
    pub vocabulary: u8,
    pub overall: u8,
    pub feedback: CategoryFeedback,
}

impl Evaluation {
    /// The fixed neutral evaluation substituted when the scoring call fails.
    pub fn fallback() -> Self {
        let generic = "Keep practicing — we couldn't analyze this one in detail.";
        Self {
            pronunciation: 70,
            fluency: 70,
            grammar: 70,
            vocabulary: 70,
            overall: 70,
            feedback: CategoryFeedback {
                pronunciation: generic.to_string(),
                fluency: generic.to_string(),
                grammar: generic.to_string(),
                vocabulary: generic.to_string(),
            },
        }
    }

    /// Whether this is exactly the fixed fallback evaluation.
    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

/// One evaluated practice utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSession {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The user's level when the session was recorded. Level-up eligibility
    /// only considers sessions at the current level.
    pub level: CefrLevel,
    /// Reference to the raw input (e.g. platform file id), if audio.
    pub input_ref: Option<String>,
    pub transcription: String,
    pub evaluation: Evaluation,
    pub xp_earned: i64,
    pub feedback_audio_url: Option<String>,
    pub feedback_text: String,
    pub word_count: i64,
    pub session_type: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a completed placement test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelTest {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Per-question responses (question, transcription, scores) as JSON.
    pub responses: serde_json::Value,
    pub average_score: f64,
    pub assigned_level: CefrLevel,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(CefrLevel::A0 < CefrLevel::B1);
        assert!(CefrLevel::C1 < CefrLevel::C2);
    }

    #[test]
    fn multipliers_increase_monotonically() {
        let levels = CefrLevel::all();
        for pair in levels.windows(2) {
            assert!(pair[0].xp_multiplier() < pair[1].xp_multiplier());
        }
    }

    #[test]
    fn score_ranges_cover_zero_to_hundred() {
        let levels = CefrLevel::all();
        assert_eq!(levels[0].score_range().0, 0.0);
        assert_eq!(levels[6].score_range().1, 100.0);
        for pair in levels.windows(2) {
            // Each band starts where the previous one ends.
            assert_eq!(pair[0].score_range().1, pair[1].score_range().0);
        }
    }

    #[test]
    fn average_score_maps_to_band() {
        assert_eq!(CefrLevel::from_average_score(0.0), CefrLevel::A0);
        assert_eq!(CefrLevel::from_average_score(19.9), CefrLevel::A0);
        assert_eq!(CefrLevel::from_average_score(55.0), CefrLevel::B1);
        assert_eq!(CefrLevel::from_average_score(78.0), CefrLevel::C1);
        assert_eq!(CefrLevel::from_average_score(100.0), CefrLevel::C2);
        assert_eq!(CefrLevel::from_average_score(250.0), CefrLevel::C2);
        assert_eq!(CefrLevel::from_average_score(-5.0), CefrLevel::A0);
    }

    #[test]
    fn level_parse_roundtrip() {
        for level in CefrLevel::all() {
            let parsed: CefrLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!("D1".parse::<CefrLevel>().is_err());
    }

    #[test]
    fn new_user_defaults() {
        let user = User::new(Platform::Telegram, "12345", "Ana");
        assert_eq!(user.level, CefrLevel::A0);
        assert!(user.is_onboarding);
        assert_eq!(user.onboarding_step, "welcome");
        assert_eq!(user.xp, 0);
        assert_eq!(user.streak, 0);
        assert_eq!(user.platform_id(Platform::Telegram), Some("12345"));
        assert_eq!(user.platform_id(Platform::Whatsapp), None);
    }

    #[test]
    fn fallback_evaluation_is_all_seventies() {
        let eval = Evaluation::fallback();
        assert_eq!(eval.overall, 70);
        assert_eq!(eval.pronunciation, 70);
        assert_eq!(eval.fluency, 70);
        assert_eq!(eval.grammar, 70);
        assert_eq!(eval.vocabulary, 70);
        assert!(eval.is_fallback());
    }
}
