//! Project-context detection.
//!
//! Matches query text against an ordered registry of pattern → project name
//! rules. The first matching rule wins; the matched phrase is cut out of the
//! query so the remainder embeds as a plain skill question.

use std::sync::{PoisonError, RwLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use skill_types::ProjectEntry;
use tracing::debug;

/// Prepositions left dangling once a project phrase is removed
const DANGLING_PREPOSITIONS: &[&str] = &["at", "on", "for", "with", "in", "from", "during"];

/// Project scope derived from one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub is_project_specific: bool,
    pub project_name: Option<String>,
    /// Query with the project phrase removed (unchanged when not project-specific)
    pub clean_query: String,
}

impl ProjectContext {
    pub fn none(query: &str) -> Self {
        Self {
            is_project_specific: false,
            project_name: None,
            clean_query: query.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct ProjectPattern {
    regex: Regex,
    name: String,
}

/// Runtime-extensible pattern registry.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    patterns: RwLock<Vec<ProjectPattern>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured `[[projects]]` entries, in order.
    pub fn from_entries(entries: &[ProjectEntry]) -> Result<Self, regex::Error> {
        let registry = Self::new();
        for entry in entries {
            registry.register(&entry.pattern, &entry.name)?;
        }
        Ok(registry)
    }

    /// Append a case-insensitive rule.
    pub fn register(&self, pattern: &str, name: &str) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProjectPattern {
                regex,
                name: name.to_string(),
            });
        Ok(())
    }

    /// Remove every rule for `name`. Returns true if any was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        let before = patterns.len();
        patterns.retain(|p| p.name != name);
        patterns.len() != before
    }

    pub fn len(&self) -> usize {
        self.patterns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn detect(&self, query: &str) -> ProjectContext {
        let patterns = self.patterns.read().unwrap_or_else(PoisonError::into_inner);

        for pattern in patterns.iter() {
            let Some(found) = pattern.regex.find(query) else {
                continue;
            };
            if found.as_str().trim().is_empty() {
                continue;
            }

            let before = strip_trailing_preposition(&query[..found.start()]);
            let after = &query[found.end()..];
            let mut clean_query = collapse_whitespace(&format!("{before} {after}"));
            if clean_query.chars().all(|c| !c.is_alphanumeric()) {
                clean_query = query.to_string();
            }

            debug!(project = %pattern.name, "Detected project-specific query");
            return ProjectContext {
                is_project_specific: true,
                project_name: Some(pattern.name.clone()),
                clean_query,
            };
        }

        ProjectContext::none(query)
    }
}

fn strip_trailing_preposition(text: &str) -> &str {
    let trimmed = text.trim_end();
    let last_word_start = trimmed
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0);
    let last_word = &trimmed[last_word_start..];

    if DANGLING_PREPOSITIONS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(last_word))
    {
        &trimmed[..last_word_start]
    } else {
        trimmed
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_acme_databases() {
        let registry = ProjectRegistry::new();
        registry.register(r"\bacme\b", "Acme").unwrap();

        let context = registry.detect("experience at Acme with databases");
        assert_eq!(
            context,
            ProjectContext {
                is_project_specific: true,
                project_name: Some("Acme".to_string()),
                clean_query: "experience with databases".to_string(),
            }
        );
    }

    #[test]
    fn test_no_match_returns_query_unchanged() {
        let registry = ProjectRegistry::new();
        registry.register(r"\bacme\b", "Acme").unwrap();

        let context = registry.detect("What about Rust?");
        assert_eq!(context, ProjectContext::none("What about Rust?"));
    }

    #[test]
    fn test_first_registered_rule_wins() {
        let registry = ProjectRegistry::new();
        registry.register(r"\bportal\b", "Customer Portal").unwrap();
        registry.register(r"\bacme\b", "Acme").unwrap();

        let context = registry.detect("Acme portal work in React");
        assert_eq!(context.project_name.as_deref(), Some("Customer Portal"));
        assert_eq!(context.clean_query, "Acme work in React");
    }

    #[test]
    fn test_phrase_only_query_keeps_original_text() {
        let registry = ProjectRegistry::new();
        registry.register(r"\bacme\b", "Acme").unwrap();

        let context = registry.detect("At Acme?");
        assert!(context.is_project_specific);
        assert_eq!(context.clean_query, "At Acme?");
    }

    #[test]
    fn test_temporary_registration() {
        let registry = ProjectRegistry::from_entries(&[ProjectEntry {
            pattern: r"\bglobex\b".into(),
            name: "Globex".into(),
        }])
        .unwrap();
        registry.register(r"\binitech\b", "Initech").unwrap();
        assert_eq!(registry.len(), 2);

        assert!(registry.detect("work for Initech").is_project_specific);
        assert!(registry.unregister("Initech"));
        assert!(!registry.detect("work for Initech").is_project_specific);
        assert!(!registry.unregister("Initech"));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let registry = ProjectRegistry::new();
        registry.register(r"\bacme(\s+corp)?\b", "Acme").unwrap();
        let first = registry.detect("Python during Acme Corp days");
        let second = registry.detect("Python during Acme Corp days");
        assert_eq!(first, second);
        assert_eq!(first.clean_query, "Python days");
    }
}
