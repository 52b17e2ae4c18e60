//! Onboarding flow state: the step machine and the working state carried
//! between messages.
//!
//! Steps only move forward. A user can never re-enter an earlier step —
//! recovery after state loss resumes at the recorded step, never before it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::onboarding::questions::PlacementQuestion;

/// The onboarding steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Welcome,
    LevelTest,
    Interests,
    Goal,
    Complete,
}

impl OnboardingStep {
    fn order(&self) -> u8 {
        match self {
            Self::Welcome => 0,
            Self::LevelTest => 1,
            Self::Interests => 2,
            Self::Goal => 3,
            Self::Complete => 4,
        }
    }

    /// Valid transitions only move forward. Staying in place is allowed
    /// (multi-message steps like the level test).
    pub fn can_transition_to(&self, next: OnboardingStep) -> bool {
        next.order() >= self.order()
    }

    /// The step that follows this one.
    pub fn next(&self) -> OnboardingStep {
        match self {
            Self::Welcome => Self::LevelTest,
            Self::LevelTest => Self::Interests,
            Self::Interests => Self::Goal,
            Self::Goal => Self::Complete,
            Self::Complete => Self::Complete,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::LevelTest => "level_test",
            Self::Interests => "interests",
            Self::Goal => "goal",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OnboardingStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(Self::Welcome),
            "level_test" => Ok(Self::LevelTest),
            "interests" => Ok(Self::Interests),
            "goal" => Ok(Self::Goal),
            "complete" => Ok(Self::Complete),
            other => Err(format!("Unknown onboarding step: {other}")),
        }
    }
}

/// One scored placement-test answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub answer: String,
    pub overall: f64,
}

/// Working onboarding state, serialized into the ephemeral cache between
/// messages and mirrored (step only) into the durable backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingState {
    pub step: OnboardingStep,
    /// Placement questions for this run, fixed when the test starts.
    pub questions: Vec<PlacementQuestion>,
    /// Index of the next unanswered question.
    pub cursor: usize,
    pub responses: Vec<QuestionResponse>,
    pub interests: Vec<String>,
    pub goal: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            step: OnboardingStep::Welcome,
            questions: Vec::new(),
            cursor: 0,
            responses: Vec::new(),
            interests: Vec::new(),
            goal: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct a minimal state resuming at `step`. Used when the cache
    /// copy was lost and only the durable step mirror survived. Placement
    /// questions are regenerated; any partially answered test restarts.
    pub fn resume_at(step: OnboardingStep) -> Self {
        let mut state = Self::new();
        state.step = step;
        if step == OnboardingStep::LevelTest {
            state.questions = crate::onboarding::questions::placement_questions();
        }
        state
    }

    /// Advance to `next` if the transition is legal. Returns false (state
    /// unchanged) on a backwards transition.
    pub fn advance(&mut self, next: OnboardingStep) -> bool {
        if !self.step.can_transition_to(next) {
            return false;
        }
        self.step = next;
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, ttl: std::time::Duration) -> bool {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        Utc::now() - self.updated_at > ttl
    }

    /// Mean of per-question overall scores, or 0 for an empty test.
    pub fn average_score(&self) -> f64 {
        if self.responses.is_empty() {
            return 0.0;
        }
        self.responses.iter().map(|r| r.overall).sum::<f64>() / self.responses.len() as f64
    }
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self::new()
    }
}
