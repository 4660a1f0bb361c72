//! Similarity ranking with experience boost.
//!
//! Raw cosine similarity is clamped to [0, 1], multiplied by the boost of
//! the highest qualifying shelf and clamped again. Ordering is by boosted
//! score, then years of experience, then id, so equal inputs always rank
//! the same way.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use skill_types::{ItemSnapshot, ItemType, RankingConfig};

use crate::store::VectorMatch;

/// Cosine similarity of two vectors, in [-1, 1].
///
/// `None` when the dimensions differ or either vector is empty; `Some(0.0)`
/// when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    let similarity = dot / (norm_a * norm_b);
    if !similarity.is_finite() {
        return Some(0.0);
    }
    // Rounding can push parallel vectors slightly past 1
    Some(similarity.clamp(-1.0, 1.0))
}

/// Clamp a raw similarity into [0, 1]. Non-finite input maps to 0.
pub fn clamp_similarity(raw: f32) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// How broad a question is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// Asks about one skill or fact
    Direct,
    /// Asks for a summary across several skills
    Synthesis,
}

/// A match after boosting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub item_type: ItemType,
    /// Backend similarity before clamping
    pub raw_score: f32,
    pub boost: f32,
    /// Boosted score in [0, 1]
    pub score: f32,
    pub metadata: ItemSnapshot,
}

/// Experience-weighted ranker.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Result count for a query shape
    pub fn top_k(&self, shape: QueryShape) -> usize {
        match shape {
            QueryShape::Direct => self.config.direct_top_k,
            QueryShape::Synthesis => self.config.synthesis_top_k,
        }
    }

    pub fn boost_for(&self, metadata: &ItemSnapshot) -> f32 {
        self.config
            .boost
            .multiplier(metadata.years_of_experience, metadata.proficiency_level)
    }

    /// Boosted score: min(clamp(raw) * boost, 1.0)
    pub fn score(&self, raw: f32, metadata: &ItemSnapshot) -> f32 {
        (clamp_similarity(raw) * self.boost_for(metadata)).min(1.0)
    }

    /// Boost, order and truncate to `top_k`.
    pub fn rank(&self, matches: Vec<VectorMatch>, top_k: usize) -> Vec<ScoredMatch> {
        let mut scored: Vec<ScoredMatch> = matches
            .into_iter()
            .map(|m| {
                let boost = self.boost_for(&m.metadata);
                ScoredMatch {
                    score: self.score(m.score, &m.metadata),
                    raw_score: m.score,
                    boost,
                    id: m.id,
                    item_type: m.item_type,
                    metadata: m.metadata,
                }
            })
            .collect();

        scored.sort_by(compare_ranked);
        scored.truncate(top_k);
        scored
    }
}

fn compare_ranked(a: &ScoredMatch, b: &ScoredMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            b.metadata
                .years_of_experience
                .total_cmp(&a.metadata.years_of_experience)
        })
        .then_with(|| a.id.cmp(&b.id))
}
