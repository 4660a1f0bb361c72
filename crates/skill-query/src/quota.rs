//! Daily inference-cost circuit breaker.
//!
//! Two counters per UTC day live in the key-value store:
//! `{prefix}:{YYYY-MM-DD}:cost` and `{prefix}:{YYYY-MM-DD}:count`. Both
//! expire at the next UTC midnight, which is the only reset mechanism the
//! breaker needs. Reads that fail are treated as an open breaker. A cost
//! counter holding a non-numeric value is overwritten with the daily limit,
//! closing the breaker until the next reset.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use skill_storage::{KeyValueStore, StorageError};
use skill_types::{InferenceCosts, QuotaConfig};
use tracing::{debug, info, warn};

/// Kind of inference, each with a fixed cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceKind {
    /// Short answer about one skill
    Answer,
    /// Summary across several skills
    Synthesis,
}

impl InferenceKind {
    pub fn cost(&self, costs: &InferenceCosts) -> u64 {
        match self {
            InferenceKind::Answer => costs.answer,
            InferenceKind::Synthesis => costs.synthesis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Budget available
    Open,
    /// Budget exhausted until the next UTC midnight
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub state: BreakerState,
    /// UTC day the counters belong to (YYYY-MM-DD)
    pub day: String,
    pub consumed: u64,
    pub limit: u64,
    pub inference_count: u64,
    pub resets_at: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }
}

pub struct QuotaBreaker {
    kv: Arc<dyn KeyValueStore>,
    config: QuotaConfig,
}

impl QuotaBreaker {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: QuotaConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Start of the next UTC day.
    pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
        (now.date_naive() + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    fn day_key(&self, now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d").to_string()
    }

    pub fn cost_key(&self, now: DateTime<Utc>) -> String {
        format!("{}:{}:cost", self.config.key_prefix, self.day_key(now))
    }

    pub fn count_key(&self, now: DateTime<Utc>) -> String {
        format!("{}:{}:count", self.config.key_prefix, self.day_key(now))
    }

    fn status(&self, now: DateTime<Utc>, consumed: u64, inference_count: u64) -> QuotaStatus {
        let state = if consumed >= self.config.daily_limit {
            BreakerState::Closed
        } else {
            BreakerState::Open
        };
        QuotaStatus {
            state,
            day: self.day_key(now),
            consumed,
            limit: self.config.daily_limit,
            inference_count,
            resets_at: Self::next_reset(now),
        }
    }

    fn read_counter(&self, key: &str) -> u64 {
        self.kv.get_counter(key).unwrap_or_else(|e| {
            warn!(error = %e, key, "Quota counter read failed, treating as zero");
            0
        })
    }

    /// Read today's cost, repairing a corrupt counter to the daily limit.
    fn read_cost(&self, now: DateTime<Utc>) -> u64 {
        let key = self.cost_key(now);
        match self.kv.get_counter(&key) {
            Ok(consumed) => consumed,
            Err(StorageError::NotACounter { .. }) => self.repair(&key, self.config.daily_limit, now),
            Err(e) => {
                warn!(error = %e, key, "Quota counter read failed, treating as zero");
                0
            }
        }
    }

    /// Overwrite a non-numeric counter with `value` until the next reset.
    fn repair(&self, key: &str, value: u64, now: DateTime<Utc>) -> u64 {
        warn!(key, value, "Quota counter is not a number, overwriting");
        if let Err(e) = self.kv.set_counter(key, value, Self::next_reset(now)) {
            warn!(error = %e, key, "Quota counter repair failed");
        }
        value
    }

    /// `increment`, falling back to `repair_value` when the stored value is corrupt.
    fn increment_or_repair(
        &self,
        key: &str,
        delta: u64,
        repair_value: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        match self.kv.increment(key, delta, Self::next_reset(now)) {
            Err(StorageError::NotACounter { .. }) => Ok(self.repair(key, repair_value, now)),
            other => other,
        }
    }

    /// Current state. Closed once consumed reaches the daily limit.
    pub fn check(&self) -> QuotaStatus {
        self.check_at(Utc::now())
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        let consumed = self.read_cost(now);
        let count = self.read_counter(&self.count_key(now));
        let status = self.status(now, consumed, count);
        debug!(
            consumed = status.consumed,
            limit = status.limit,
            state = ?status.state,
            "Quota checked"
        );
        status
    }

    /// Add the fixed cost of `kind` and count one inference.
    pub fn record(&self, kind: InferenceKind) -> Result<QuotaStatus, StorageError> {
        self.record_at(kind, Utc::now())
    }

    pub fn record_at(
        &self,
        kind: InferenceKind,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, StorageError> {
        let cost = kind.cost(&self.config.costs);
        let limit = self.config.daily_limit.max(cost);

        let consumed = self.increment_or_repair(&self.cost_key(now), cost, limit, now)?;
        let count = self.increment_or_repair(&self.count_key(now), 1, 1, now)?;

        let status = self.status(now, consumed, count);
        if status.state == BreakerState::Closed {
            info!(consumed, limit = status.limit, "Daily inference budget exhausted");
        }
        Ok(status)
    }

    /// Clear today's counters. Safe to call repeatedly.
    pub fn reset(&self) -> Result<QuotaStatus, StorageError> {
        let now = Utc::now();
        self.kv.delete(&self.cost_key(now))?;
        self.kv.delete(&self.count_key(now))?;
        info!("Quota counters reset");
        Ok(self.status(now, 0, 0))
    }

    /// Overwrite today's counters with absolute values. Safe to call repeatedly.
    pub fn resync(&self, consumed: u64, inference_count: u64) -> Result<QuotaStatus, StorageError> {
        let now = Utc::now();
        let expires_at = Self::next_reset(now);
        self.kv.set_counter(&self.cost_key(now), consumed, expires_at)?;
        self.kv
            .set_counter(&self.count_key(now), inference_count, expires_at)?;
        info!(consumed, inference_count, "Quota counters resynced");
        Ok(self.status(now, consumed, inference_count))
    }
}
