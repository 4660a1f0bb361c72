//! Query shape classification using keyword heuristics.
//!
//! A synthesis query asks for a summary across several skills and gets more
//! matches and a costlier inference; everything else is a direct question.

use skill_vector::QueryShape;
use tracing::debug;

use crate::quota::InferenceKind;

/// Phrases that signal a multi-skill question
const SYNTHESIS_KEYWORDS: &[&str] = &[
    "summarize",
    "summary",
    "overview",
    "background",
    "all your",
    "all of your",
    "your skills",
    "skill set",
    "skillset",
    "tech stack",
    "technologies",
    "strongest",
    "strengths",
    "compare",
    "list",
    "across",
    "overall",
];

#[derive(Debug, Clone)]
pub struct ShapeClassifier {
    keywords: Vec<String>,
}

impl Default for ShapeClassifier {
    fn default() -> Self {
        Self {
            keywords: SYNTHESIS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ShapeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords(keywords: Vec<String>) -> Self {
        Self { keywords }
    }

    pub fn classify(&self, query: &str) -> QueryShape {
        let lower = query.to_lowercase();
        let matched = self
            .keywords
            .iter()
            .find(|k| contains_phrase(&lower, &k.to_lowercase()));

        match matched {
            Some(keyword) => {
                debug!(keyword = %keyword, "Classified as synthesis query");
                QueryShape::Synthesis
            }
            None => QueryShape::Direct,
        }
    }
}

/// Inference kind billed for a query shape
pub fn inference_kind(shape: QueryShape) -> InferenceKind {
    match shape {
        QueryShape::Direct => InferenceKind::Answer,
        QueryShape::Synthesis => InferenceKind::Synthesis,
    }
}

/// Phrase match on word boundaries.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_questions() {
        let classifier = ShapeClassifier::new();
        assert_eq!(
            classifier.classify("What is your experience with Python?"),
            QueryShape::Direct
        );
        assert_eq!(classifier.classify("How long have you used Go?"), QueryShape::Direct);
    }

    #[test]
    fn test_synthesis_questions() {
        let classifier = ShapeClassifier::new();
        assert_eq!(
            classifier.classify("Summarize your backend background"),
            QueryShape::Synthesis
        );
        assert_eq!(
            classifier.classify("What are your strongest languages?"),
            QueryShape::Synthesis
        );
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let classifier = ShapeClassifier::new();
        // "listen" contains "list"
        assert_eq!(classifier.classify("Do you listen to feedback?"), QueryShape::Direct);
    }

    #[test]
    fn test_inference_kind_mapping() {
        assert_eq!(inference_kind(QueryShape::Direct), InferenceKind::Answer);
        assert_eq!(inference_kind(QueryShape::Synthesis), InferenceKind::Synthesis);
    }
}
