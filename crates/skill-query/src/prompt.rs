//! Prompt construction.
//!
//! A pure function of the query, its project context, the ranked matches and
//! the confidence tier. Nothing here touches the network or the clock.

use std::fmt::Write as _;

use skill_llm::CompletionRequest;
use skill_types::ResponseConfig;

use crate::project::ProjectContext;
use crate::types::{Confidence, SkillMatch};

/// Seniority label for a number of years, given three ascending breakpoints.
pub fn seniority(years: f32, breakpoints: &[f32; 3]) -> &'static str {
    if years < breakpoints[0] {
        "junior"
    } else if years < breakpoints[1] {
        "mid-level"
    } else if years < breakpoints[2] {
        "senior"
    } else {
        "principal"
    }
}

/// Organization the reply must close with
pub fn attribution(top: Option<&SkillMatch>) -> String {
    top.and_then(|m| {
        m.record
            .employer
            .clone()
            .or_else(|| m.record.related_project.clone())
    })
    .filter(|name| !name.trim().is_empty())
    .unwrap_or_else(|| "independent work".to_string())
}

pub(crate) fn format_years(years: f32) -> String {
    if years.fract() == 0.0 {
        format!("{years:.0}")
    } else {
        format!("{years:.1}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    config: ResponseConfig,
}

impl PromptBuilder {
    pub fn new(config: ResponseConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        query: &str,
        project: &ProjectContext,
        matches: &[SkillMatch],
        confidence: Confidence,
    ) -> CompletionRequest {
        CompletionRequest {
            system: self.system_prompt(matches.first(), confidence),
            user: self.user_prompt(query, project, matches),
            max_tokens: self.config.max_tokens,
            stop: self.config.stop_sequences.clone(),
        }
    }

    fn system_prompt(&self, top: Option<&SkillMatch>, confidence: Confidence) -> String {
        let [junior, mid, senior] = self.config.seniority_breakpoints;
        let tier_rule = match confidence {
            Confidence::High => "The records match the question well. State the answer directly.",
            Confidence::Medium => {
                "The records match the question partially. Answer, and say the evidence is partial."
            }
            Confidence::Low => {
                "The records only loosely match the question. Say so and keep the answer tentative."
            }
        };

        format!(
            "You answer questions about one professional's skills using only the records provided.\n\
             Rules:\n\
             - Use at most {sentences} sentences and {words} words.\n\
             - Close with attribution to {org}.\n\
             - Never combine, add or compare numbers taken from different records; each figure belongs to its own record.\n\
             - {tier_rule}\n\
             - Describe experience with these labels: under {junior} years junior, {junior} to {mid} years mid-level, \
             {mid} to {senior} years senior, {senior} or more years principal.\n\
             - No greetings, no filler, no lead-in phrases.",
            sentences = self.config.max_sentences,
            words = self.config.max_words,
            org = attribution(top),
            junior = format_years(junior),
            mid = format_years(mid),
            senior = format_years(senior),
        )
    }

    fn user_prompt(&self, query: &str, project: &ProjectContext, matches: &[SkillMatch]) -> String {
        let mut prompt = format!("Question: {query}\n");
        if let Some(name) = &project.project_name {
            let _ = writeln!(prompt, "Project: {name}");
        }
        prompt.push_str("Records:\n");

        for (i, m) in matches.iter().enumerate() {
            let record = &m.record;
            let _ = writeln!(
                prompt,
                "{}. {} ({}): {} years, {} ({})",
                i + 1,
                record.name,
                record.category,
                format_years(record.years_of_experience),
                record.proficiency_level,
                seniority(record.years_of_experience, &self.config.seniority_breakpoints),
            );
            for (label, value) in [
                ("Summary", &record.narrative_summary),
                ("Action", &record.action),
                ("Effect", &record.effect),
                ("Outcome", &record.outcome),
            ] {
                if !value.trim().is_empty() {
                    let _ = writeln!(prompt, "   {label}: {}", value.trim());
                }
            }
            if let Some(project) = &record.related_project {
                let _ = writeln!(prompt, "   Project: {project}");
            }
            if let Some(employer) = &record.employer {
                let _ = writeln!(prompt, "   Employer: {employer}");
            }
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_types::{ProficiencyLevel, SkillRecord};

    fn skill(name: &str, years: f32, employer: Option<&str>) -> SkillMatch {
        let mut record = SkillRecord::new(name.to_lowercase(), name, "Languages", years, ProficiencyLevel::Advanced)
            .with_impact("Built ingestion services", "Cut latency", "40% faster p99");
        record.employer = employer.map(String::from);
        SkillMatch {
            record,
            score: 0.8,
            raw_score: 0.75,
            boost: 1.0,
        }
    }

    #[test]
    fn test_seniority_breakpoints() {
        let bp = [3.0, 7.0, 15.0];
        assert_eq!(seniority(0.0, &bp), "junior");
        assert_eq!(seniority(2.9, &bp), "junior");
        assert_eq!(seniority(3.0, &bp), "mid-level");
        assert_eq!(seniority(7.0, &bp), "senior");
        assert_eq!(seniority(14.5, &bp), "senior");
        assert_eq!(seniority(15.0, &bp), "principal");
    }

    #[test]
    fn test_attribution_fallbacks() {
        assert_eq!(attribution(Some(&skill("Python", 12.0, Some("Acme")))), "Acme");

        let mut project_only = skill("Go", 4.0, None);
        project_only.record.related_project = Some("Billing".into());
        assert_eq!(attribution(Some(&project_only)), "Billing");

        assert_eq!(attribution(Some(&skill("Go", 4.0, None))), "independent work");
        assert_eq!(attribution(None), "independent work");
    }

    #[test]
    fn test_system_prompt_rules() {
        let builder = PromptBuilder::default();
        let request = builder.build(
            "Python?",
            &ProjectContext::none("Python?"),
            &[skill("Python", 12.0, Some("Acme"))],
            Confidence::Medium,
        );

        assert!(request.system.contains("at most 3 sentences and 80 words"));
        assert!(request.system.contains("attribution to Acme"));
        assert!(request.system.contains("different records"));
        assert!(request.system.contains("partial"));
        assert!(request.system.contains("under 3 years junior"));
        assert!(request.system.contains("15 or more years principal"));
        assert_eq!(request.max_tokens, 220);
        assert_eq!(request.stop, ResponseConfig::default().stop_sequences);
    }

    #[test]
    fn test_user_prompt_lists_records_in_rank_order() {
        let builder = PromptBuilder::default();
        let project = ProjectContext {
            is_project_specific: true,
            project_name: Some("Acme".into()),
            clean_query: "experience with databases".into(),
        };
        let request = builder.build(
            "experience with databases",
            &project,
            &[skill("PostgreSQL", 8.5, Some("Acme")), skill("Redis", 2.0, None)],
            Confidence::High,
        );

        let user = &request.user;
        assert!(user.starts_with("Question: experience with databases\nProject: Acme\n"));
        assert!(user.contains("1. PostgreSQL (Languages): 8.5 years, Advanced (senior)"));
        assert!(user.contains("2. Redis (Languages): 2 years, Advanced (junior)"));
        assert!(user.contains("   Outcome: 40% faster p99"));
        assert!(user.find("PostgreSQL").unwrap() < user.find("Redis").unwrap());
    }

    #[test]
    fn test_build_is_pure() {
        let builder = PromptBuilder::default();
        let matches = [skill("Rust", 5.0, Some("Globex"))];
        let context = ProjectContext::none("Rust?");
        assert_eq!(
            builder.build("Rust?", &context, &matches, Confidence::Low),
            builder.build("Rust?", &context, &matches, Confidence::Low)
        );
    }
}
