//! Skill records and the metadata snapshot stored alongside their embeddings.
//!
//! Skill records are reference data: created by bulk import, updated only by
//! administrative migration, never mutated on the query path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Self-assessed proficiency for a skill.
///
/// Parsing is case-insensitive; unknown labels fall back to `Beginner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum ProficiencyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

/// Boost tier a proficiency level belongs to.
///
/// Ordered so that `Top > Second > Base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTier {
    Base,
    Second,
    Top,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Beginner => "Beginner",
            ProficiencyLevel::Intermediate => "Intermediate",
            ProficiencyLevel::Advanced => "Advanced",
            ProficiencyLevel::Expert => "Expert",
        }
    }

    /// Tier used by the experience boost.
    pub fn tier(&self) -> LevelTier {
        match self {
            ProficiencyLevel::Expert | ProficiencyLevel::Advanced => LevelTier::Top,
            ProficiencyLevel::Intermediate => LevelTier::Second,
            ProficiencyLevel::Beginner => LevelTier::Base,
        }
    }
}

impl FromStr for ProficiencyLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "expert" => ProficiencyLevel::Expert,
            "advanced" => ProficiencyLevel::Advanced,
            "intermediate" => ProficiencyLevel::Intermediate,
            _ => ProficiencyLevel::Beginner,
        })
    }
}

impl From<String> for ProficiencyLevel {
    fn from(value: String) -> Self {
        // Infallible
        value.parse().unwrap_or_default()
    }
}

impl From<ProficiencyLevel> for String {
    fn from(value: ProficiencyLevel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of item that owns an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Skill,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Skill => "skill",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skill" | "skills" => Ok(ItemType::Skill),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A curated professional-skill record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    pub category: String,
    pub years_of_experience: f32,
    pub proficiency_level: ProficiencyLevel,
    #[serde(default)]
    pub narrative_summary: String,
    /// What was done
    #[serde(default)]
    pub action: String,
    /// What changed because of it
    #[serde(default)]
    pub effect: String,
    /// Measurable result
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub related_project: Option<String>,
    #[serde(default)]
    pub employer: Option<String>,
}

impl SkillRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        years_of_experience: f32,
        proficiency_level: ProficiencyLevel,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            years_of_experience,
            proficiency_level,
            narrative_summary: String::new(),
            action: String::new(),
            effect: String::new(),
            outcome: String::new(),
            related_project: None,
            employer: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.narrative_summary = summary.into();
        self
    }

    pub fn with_impact(
        mut self,
        action: impl Into<String>,
        effect: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        self.action = action.into();
        self.effect = effect.into();
        self.outcome = outcome.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.related_project = Some(project.into());
        self
    }

    pub fn with_employer(mut self, employer: impl Into<String>) -> Self {
        self.employer = Some(employer.into());
        self
    }

    /// Text fed to the embedding model when (re)indexing this record.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![format!("{} ({})", self.name, self.category)];

        for field in [
            &self.narrative_summary,
            &self.action,
            &self.effect,
            &self.outcome,
        ] {
            if !field.trim().is_empty() {
                parts.push(field.trim().to_string());
            }
        }
        if let Some(project) = &self.related_project {
            parts.push(format!("Project: {project}"));
        }
        if let Some(employer) = &self.employer {
            parts.push(format!("Employer: {employer}"));
        }

        parts.join(". ")
    }

    /// Denormalized metadata stored next to this record's embedding.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            name: self.name.clone(),
            category: self.category.clone(),
            years_of_experience: self.years_of_experience,
            proficiency_level: self.proficiency_level,
            related_project: self.related_project.clone(),
            employer: self.employer.clone(),
        }
    }
}

/// Metadata snapshot carried with every stored vector.
///
/// Avoids refetching the record for cheap filtering and boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ItemSnapshot {
    pub name: String,
    pub category: String,
    pub years_of_experience: f32,
    pub proficiency_level: ProficiencyLevel,
    #[serde(default)]
    pub related_project: Option<String>,
    #[serde(default)]
    pub employer: Option<String>,
}

impl ItemSnapshot {
    /// True if the project or employer matches `project` (case-insensitive).
    pub fn belongs_to(&self, project: &str) -> bool {
        let wanted = project.trim();
        [&self.related_project, &self.employer]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.trim().eq_ignore_ascii_case(wanted))
    }
}
