//! Keyword extraction for the interests and goal onboarding steps.
//!
//! Free-text answers (English or Spanish) are matched against small
//! keyword vocabularies. No LLM call — these answers are short and the
//! vocabularies cover the common cases; anything else maps to "general".

use regex::Regex;

struct Vocabulary {
    canonical: &'static str,
    pattern: &'static str,
}

const INTEREST_VOCAB: &[Vocabulary] = &[
    Vocabulary {
        canonical: "music",
        pattern: r"(?i)\b(music|música|musica|songs?|canciones|cantar|singing|guitar)\b",
    },
    Vocabulary {
        canonical: "sports",
        pattern: r"(?i)\b(sports?|deportes?|fútbol|futbol|soccer|gym|running|correr|swim)\b",
    },
    Vocabulary {
        canonical: "travel",
        pattern: r"(?i)\b(travel|viajar|viajes?|trips?|countries|países|paises)\b",
    },
    Vocabulary {
        canonical: "movies",
        pattern: r"(?i)\b(movies?|películas?|peliculas?|series|cine|films?|tv)\b",
    },
    Vocabulary {
        canonical: "food",
        pattern: r"(?i)\b(food|comida|cooking|cocinar|cocina|restaurants?|recipes?)\b",
    },
    Vocabulary {
        canonical: "technology",
        pattern: r"(?i)\b(technology|tecnología|tecnologia|computers?|programming|videojuegos|gaming|games)\b",
    },
    Vocabulary {
        canonical: "reading",
        pattern: r"(?i)\b(reading|leer|books?|libros?|novels?|novelas?)\b",
    },
    Vocabulary {
        canonical: "work",
        pattern: r"(?i)\b(work|trabajo|career|carrera|job|negocios?)\b",
    },
];

const GOAL_VOCAB: &[Vocabulary] = &[
    Vocabulary {
        canonical: "business",
        pattern: r"(?i)\b(work|trabajo|job|business|negocios?|career|carrera|interviews?|entrevistas?|oficina)\b",
    },
    Vocabulary {
        canonical: "travel",
        pattern: r"(?i)\b(travel|viajar|viajes?|trips?|vacations?|vacaciones|turismo)\b",
    },
    Vocabulary {
        canonical: "academic",
        pattern: r"(?i)\b(study|estudiar|studies|university|universidad|exams?|exámenes|examenes|toefl|ielts|school|escuela)\b",
    },
    Vocabulary {
        canonical: "conversation",
        pattern: r"(?i)\b(friends?|amigos?|talk|hablar|conversations?|conversaciones|family|familia|people|gente)\b",
    },
];

/// Extract interest keywords from a free-text answer. Always returns at
/// least one entry; unmatched answers map to `["general"]`.
pub fn extract_interests(answer: &str) -> Vec<String> {
    let mut interests: Vec<String> = INTEREST_VOCAB
        .iter()
        .filter(|vocab| matches(vocab.pattern, answer))
        .map(|vocab| vocab.canonical.to_string())
        .collect();

    if interests.is_empty() {
        interests.push("general".to_string());
    }
    interests
}

/// Map a free-text goal answer to one canonical goal category.
pub fn extract_goal(answer: &str) -> String {
    GOAL_VOCAB
        .iter()
        .find(|vocab| matches(vocab.pattern, answer))
        .map(|vocab| vocab.canonical.to_string())
        .unwrap_or_else(|| "general".to_string())
}

fn matches(pattern: &str, text: &str) -> bool {
    // Patterns are static and known-valid; a bad one just never matches.
    Regex::new(pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multiple_interests() {
        let interests = extract_interests("Me gusta la música y viajar con amigos");
        assert!(interests.contains(&"music".to_string()));
        assert!(interests.contains(&"travel".to_string()));
    }

    #[test]
    fn english_answers_work_too() {
        let interests = extract_interests("I love cooking and reading books");
        assert!(interests.contains(&"food".to_string()));
        assert!(interests.contains(&"reading".to_string()));
    }

    #[test]
    fn unmatched_interests_default_to_general() {
        assert_eq!(extract_interests("astrophysics mostly"), vec!["general"]);
        assert_eq!(extract_interests(""), vec!["general"]);
    }

    #[test]
    fn goal_categories() {
        assert_eq!(extract_goal("para mi trabajo"), "business");
        assert_eq!(extract_goal("I want to travel next year"), "travel");
        assert_eq!(extract_goal("necesito aprobar el TOEFL"), "academic");
        assert_eq!(extract_goal("hablar con amigos"), "conversation");
        assert_eq!(extract_goal("no sé"), "general");
    }

    #[test]
    fn all_patterns_compile() {
        for vocab in INTEREST_VOCAB.iter().chain(GOAL_VOCAB.iter()) {
            assert!(Regex::new(vocab.pattern).is_ok(), "bad pattern: {}", vocab.pattern);
        }
    }
}
