//! Response types produced by the query pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use skill_types::{ResponseConfig, SkillRecord};
use skill_vector::Backend;

/// Confidence tier derived from the top boosted score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_score(score: f32, config: &ResponseConfig) -> Self {
        if score >= config.high_confidence {
            Confidence::High
        } else if score >= config.medium_confidence {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked skill with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMatch {
    #[serde(flatten)]
    pub record: SkillRecord,
    /// Boosted score in [0, 1]
    pub score: f32,
    /// Similarity reported by the backend
    pub raw_score: f32,
    pub boost: f32,
}

/// Result of `answer_query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Normalized query text
    pub query: String,
    pub matches: Vec<SkillMatch>,
    pub reply: String,
    /// Served from the response cache
    #[serde(default)]
    pub cached: bool,
    /// Daily inference budget was exhausted; `reply` is a fallback
    #[serde(default)]
    pub quota_exceeded: bool,
    /// Inference failed or timed out; `reply` is a fallback
    #[serde(default)]
    pub inference_failed: bool,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    /// Project the query was scoped to
    #[serde(default)]
    pub project: Option<String>,
    /// Backend that answered the search
    #[serde(default)]
    pub provenance: Option<Backend>,
}

impl QueryResponse {
    pub fn top_match(&self) -> Option<&SkillMatch> {
        self.matches.first()
    }

    /// Names of the matches, in rank order
    pub fn match_names(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.record.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_types::ProficiencyLevel;

    #[test]
    fn test_confidence_thresholds() {
        let config = ResponseConfig::default();
        assert_eq!(Confidence::from_score(0.80, &config), Confidence::High);
        assert_eq!(Confidence::from_score(0.75, &config), Confidence::High);
        assert_eq!(Confidence::from_score(0.60, &config), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.20, &config), Confidence::Low);
    }

    #[test]
    fn test_match_serializes_flat() {
        let skill = SkillMatch {
            record: SkillRecord::new("py", "Python", "Languages", 12.0, ProficiencyLevel::Advanced),
            score: 0.9,
            raw_score: 0.82,
            boost: 1.1,
        };
        let json = serde_json::to_value(&skill).unwrap();
        assert_eq!(json["name"], "Python");
        assert_eq!(json["proficiency_level"], "Advanced");

        let back: SkillMatch = serde_json::from_value(json).unwrap();
        assert_eq!(back, skill);
    }
}
