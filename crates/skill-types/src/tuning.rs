//! Tunable constants for every stage of the query pipeline.
//!
//! Boost shelves, inference costs, thresholds and rule tables were chosen
//! empirically. They are kept as named, overridable configuration; the
//! defaults here are the calibrated values.

use serde::{Deserialize, Serialize};

use crate::error::SkillError;
use crate::skill::{LevelTier, ProficiencyLevel};

/// One experience-boost shelf.
///
/// A record qualifies when it has at least `min_years` and its level tier is
/// at least `min_tier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostShelf {
    pub min_years: f32,
    pub min_tier: LevelTier,
    pub multiplier: f32,
}

impl BoostShelf {
    pub fn new(min_years: f32, min_tier: LevelTier, multiplier: f32) -> Self {
        Self {
            min_years,
            min_tier,
            multiplier,
        }
    }

    pub fn matches(&self, years: f32, level: ProficiencyLevel) -> bool {
        years >= self.min_years && level.tier() >= self.min_tier
    }
}

/// Experience boost table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(default = "default_shelves")]
    pub shelves: Vec<BoostShelf>,
}

fn default_shelves() -> Vec<BoostShelf> {
    vec![
        BoostShelf::new(15.0, LevelTier::Top, 1.15),
        BoostShelf::new(10.0, LevelTier::Top, 1.10),
        BoostShelf::new(8.0, LevelTier::Second, 1.05),
    ]
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            shelves: default_shelves(),
        }
    }
}

impl BoostConfig {
    /// Multiplier for a record. Takes the highest qualifying shelf, so the
    /// result never depends on shelf order and never drops below 1.0.
    pub fn multiplier(&self, years: f32, level: ProficiencyLevel) -> f32 {
        self.shelves
            .iter()
            .filter(|shelf| shelf.matches(years, level))
            .map(|shelf| shelf.multiplier)
            .fold(1.0_f32, f32::max)
    }
}

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub boost: BoostConfig,

    /// Matches returned for a direct question
    #[serde(default = "default_direct_top_k")]
    pub direct_top_k: usize,

    /// Matches returned for a multi-skill synthesis question
    #[serde(default = "default_synthesis_top_k")]
    pub synthesis_top_k: usize,
}

fn default_direct_top_k() -> usize {
    5
}

fn default_synthesis_top_k() -> usize {
    10
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            boost: BoostConfig::default(),
            direct_top_k: default_direct_top_k(),
            synthesis_top_k: default_synthesis_top_k(),
        }
    }
}

/// Fixed cost per inference kind, in budget units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceCosts {
    #[serde(default = "default_answer_cost")]
    pub answer: u64,
    #[serde(default = "default_synthesis_cost")]
    pub synthesis: u64,
}

fn default_answer_cost() -> u64 {
    10
}

fn default_synthesis_cost() -> u64 {
    25
}

impl Default for InferenceCosts {
    fn default() -> Self {
        Self {
            answer: default_answer_cost(),
            synthesis: default_synthesis_cost(),
        }
    }
}

/// Daily inference budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Cost units available per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    #[serde(default)]
    pub costs: InferenceCosts,

    #[serde(default = "default_quota_prefix")]
    pub key_prefix: String,
}

fn default_daily_limit() -> u64 {
    10_000
}

fn default_quota_prefix() -> String {
    "quota".to_string()
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            costs: InferenceCosts::default(),
            key_prefix: default_quota_prefix(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_prefix() -> String {
    "query-cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            key_prefix: default_cache_prefix(),
        }
    }
}

/// Availability window for answering queries.
///
/// Disabled by default: the service answers around the clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub enabled: bool,

    /// First open hour (UTC, inclusive)
    #[serde(default)]
    pub open_hour: u32,

    /// Closing hour (UTC, exclusive); 24 means end of day
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// Three-letter weekday names the window is open on; empty means every day
    #[serde(default)]
    pub weekdays: Vec<String>,

    /// Token that opens the window regardless of time
    #[serde(default)]
    pub bypass_token: Option<String>,

    #[serde(default = "default_deferral_message")]
    pub deferral_message: String,
}

fn default_close_hour() -> u32 {
    24
}

fn default_deferral_message() -> String {
    "The assistant is resting right now. Please ask again during opening hours.".to_string()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            open_hour: 0,
            close_hour: default_close_hour(),
            weekdays: Vec::new(),
            bypass_token: None,
            deferral_message: default_deferral_message(),
        }
    }
}

impl WindowConfig {
    /// Hours must fall within one UTC day with opening before closing.
    /// Overnight windows such as 22..6 are rejected.
    pub fn check_hours(&self) -> Result<(), SkillError> {
        if self.open_hour > 23 || self.close_hour > 24 {
            return Err(SkillError::Config(format!(
                "window hours out of range: {}..{}",
                self.open_hour, self.close_hour
            )));
        }
        if self.open_hour >= self.close_hour {
            return Err(SkillError::Config(format!(
                "window.open_hour must be before close_hour: {}..{}",
                self.open_hour, self.close_hour
            )));
        }
        Ok(())
    }
}

/// Prompt limits and post-processing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,

    #[serde(default = "default_max_words")]
    pub max_words: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    /// Lead-in phrases stripped from generated text
    #[serde(default = "default_filler_phrases")]
    pub filler_phrases: Vec<String>,

    /// Top score at or above which confidence is high
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f32,

    /// Top score at or above which confidence is medium
    #[serde(default = "default_medium_confidence")]
    pub medium_confidence: f32,

    /// Year breakpoints between junior / mid-level / senior / principal
    #[serde(default = "default_seniority_breakpoints")]
    pub seniority_breakpoints: [f32; 3],
}

fn default_max_sentences() -> usize {
    3
}

fn default_max_words() -> usize {
    80
}

fn default_max_tokens() -> u32 {
    220
}

fn default_stop_sequences() -> Vec<String> {
    vec!["\n\n\n".to_string(), "Question:".to_string()]
}

fn default_filler_phrases() -> Vec<String> {
    [
        "Great question!",
        "Great question.",
        "Certainly!",
        "Certainly,",
        "Sure!",
        "Sure,",
        "Absolutely!",
        "Of course!",
        "I'd be happy to help.",
        "I'd be happy to help!",
        "Based on the provided information,",
        "Based on the information provided,",
        "Based on the data,",
        "According to the records,",
        "In summary,",
        "To summarize,",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_high_confidence() -> f32 {
    0.75
}

fn default_medium_confidence() -> f32 {
    0.55
}

fn default_seniority_breakpoints() -> [f32; 3] {
    [3.0, 7.0, 15.0]
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_sentences: default_max_sentences(),
            max_words: default_max_words(),
            max_tokens: default_max_tokens(),
            stop_sequences: default_stop_sequences(),
            filler_phrases: default_filler_phrases(),
            high_confidence: default_high_confidence(),
            medium_confidence: default_medium_confidence(),
            seniority_breakpoints: default_seniority_breakpoints(),
        }
    }
}

/// Input validation rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Minimum share of letters among non-space characters
    #[serde(default = "default_min_letter_ratio")]
    pub min_letter_ratio: f32,

    /// Maximum share of symbols among non-space characters
    #[serde(default = "default_max_special_ratio")]
    pub max_special_ratio: f32,

    /// Longest allowed run of one repeated character
    #[serde(default = "default_max_repeated_chars")]
    pub max_repeated_chars: usize,

    /// Minimum share of recognizable words (gibberish heuristic)
    #[serde(default = "default_min_common_word_ratio")]
    pub min_common_word_ratio: f32,

    /// Queries with fewer words skip the recognizable-word check
    #[serde(default = "default_common_word_min_tokens")]
    pub common_word_min_tokens: usize,

    /// Terms that reject a query outright
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,

    /// Case-insensitive regexes matching prompt-injection attempts
    #[serde(default = "default_injection_patterns")]
    pub injection_patterns: Vec<String>,

    /// Extra domain words counted as recognizable
    #[serde(default)]
    pub vocabulary: Vec<String>,
}

fn default_min_length() -> usize {
    3
}

fn default_max_length() -> usize {
    500
}

fn default_min_letter_ratio() -> f32 {
    0.5
}

fn default_max_special_ratio() -> f32 {
    0.3
}

fn default_max_repeated_chars() -> usize {
    6
}

fn default_min_common_word_ratio() -> f32 {
    0.2
}

fn default_common_word_min_tokens() -> usize {
    3
}

fn default_blocklist() -> Vec<String> {
    ["password", "credit card", "social security", "porn", "kill yourself"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_injection_patterns() -> Vec<String> {
    [
        r"ignore\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions|prompts?|rules)",
        r"disregard\s+(all\s+|any\s+)?(previous|prior|above|your)\s+",
        r"(reveal|show|print|repeat)\s+(me\s+)?(your|the)\s+(system\s+)?(prompt|instructions)",
        r"system\s+prompt",
        r"you\s+are\s+now\s+",
        r"pretend\s+(to\s+be|you\s+are)",
        r"act\s+as\s+(an?\s+)?(unrestricted|jailbroken|different)",
        r"\bjailbreak\b",
        r"\bdan\s+mode\b",
        r"<\|.*?\|>",
        r"\[/?(inst|system)\]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            min_letter_ratio: default_min_letter_ratio(),
            max_special_ratio: default_max_special_ratio(),
            max_repeated_chars: default_max_repeated_chars(),
            min_common_word_ratio: default_min_common_word_ratio(),
            common_word_min_tokens: default_common_word_min_tokens(),
            blocklist: default_blocklist(),
            injection_patterns: default_injection_patterns(),
            vocabulary: Vec::new(),
        }
    }
}

/// Reindex job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
}

fn default_batch_size() -> usize {
    32
}

fn default_lock_ttl() -> u64 {
    1800
}

fn default_max_consecutive_failures() -> usize {
    3
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            lock_ttl_secs: default_lock_ttl(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shelves() {
        let boost = BoostConfig::default();
        assert_eq!(boost.multiplier(16.0, ProficiencyLevel::Expert), 1.15);
        assert_eq!(boost.multiplier(12.0, ProficiencyLevel::Advanced), 1.10);
        assert_eq!(boost.multiplier(9.0, ProficiencyLevel::Intermediate), 1.05);
        assert_eq!(boost.multiplier(9.0, ProficiencyLevel::Beginner), 1.0);
        assert_eq!(boost.multiplier(3.0, ProficiencyLevel::Advanced), 1.0);
    }

    #[test]
    fn test_top_tier_qualifies_for_second_tier_shelf() {
        let boost = BoostConfig::default();
        assert_eq!(boost.multiplier(9.0, ProficiencyLevel::Expert), 1.05);
    }

    #[test]
    fn test_shelf_order_does_not_matter() {
        let mut shelves = default_shelves();
        shelves.reverse();
        let reversed = BoostConfig { shelves };
        assert_eq!(reversed.multiplier(20.0, ProficiencyLevel::Expert), 1.15);
    }

    #[test]
    fn test_boost_config_from_json_overrides() {
        let json = r#"{"shelves":[{"min_years":5.0,"min_tier":"second","multiplier":1.2}]}"#;
        let boost: BoostConfig = serde_json::from_str(json).unwrap();
        assert_eq!(boost.multiplier(6.0, ProficiencyLevel::Intermediate), 1.2);
        assert_eq!(boost.multiplier(4.0, ProficiencyLevel::Expert), 1.0);
    }

    #[test]
    fn test_defaults_from_empty_sections() {
        let quota: QuotaConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(quota.daily_limit, 10_000);
        assert_eq!(quota.costs.answer, 10);
        assert_eq!(quota.costs.synthesis, 25);

        let response: ResponseConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(response.max_sentences, 3);
        assert_eq!(response.seniority_breakpoints, [3.0, 7.0, 15.0]);

        let window: WindowConfig = serde_json::from_str("{}").unwrap();
        assert!(!window.enabled);
        assert_eq!(window.close_hour, 24);
    }

    #[test]
    fn test_window_hours() {
        let window = |open_hour, close_hour| WindowConfig {
            open_hour,
            close_hour,
            ..Default::default()
        };
        assert!(WindowConfig::default().check_hours().is_ok());
        assert!(window(9, 17).check_hours().is_ok());
        assert!(window(23, 24).check_hours().is_ok());

        assert!(window(22, 6).check_hours().is_err());
        assert!(window(9, 9).check_hours().is_err());
        assert!(window(24, 24).check_hours().is_err());
        assert!(window(0, 25).check_hours().is_err());
    }
}
