//! Placement-test questions for new users.
//!
//! Five open prompts of increasing difficulty. `expected_words` is the
//! answer length a solid response at the target level would have; the
//! scorer compares actual length against it.

use serde::{Deserialize, Serialize};

use crate::model::CefrLevel;

/// One open-ended placement question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementQuestion {
    pub prompt: String,
    pub expected_words: usize,
    pub target_level: CefrLevel,
}

/// The fixed placement-test question set, easiest first.
pub fn placement_questions() -> Vec<PlacementQuestion> {
    vec![
        PlacementQuestion {
            prompt: "Tell me about yourself. What is your name and where are you from?".to_string(),
            expected_words: 10,
            target_level: CefrLevel::A1,
        },
        PlacementQuestion {
            prompt: "What do you do on a normal day? Describe your routine.".to_string(),
            expected_words: 20,
            target_level: CefrLevel::A2,
        },
        PlacementQuestion {
            prompt: "Tell me about a trip or experience you enjoyed. What happened?".to_string(),
            expected_words: 30,
            target_level: CefrLevel::B1,
        },
        PlacementQuestion {
            prompt:
                "If you could change one thing about your city, what would it be and why?"
                    .to_string(),
            expected_words: 40,
            target_level: CefrLevel::B2,
        },
        PlacementQuestion {
            prompt:
                "Some people say technology is making us less social. Do you agree? Explain your point of view."
                    .to_string(),
            expected_words: 50,
            target_level: CefrLevel::C1,
        },
    ]
}
