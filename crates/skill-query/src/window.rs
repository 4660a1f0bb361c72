//! Availability window: when the service answers queries.
//!
//! Evaluation is a pure function of the current time and an optional bypass
//! token, so callers pass `now` explicitly.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use skill_types::{SkillError, WindowConfig};

/// Outcome of a window check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowDecision {
    Open,
    Closed {
        /// Next opening, if the window ever opens
        reopens_at: Option<DateTime<Utc>>,
    },
}

impl WindowDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, WindowDecision::Open)
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityWindow {
    enabled: bool,
    open_hour: u32,
    close_hour: u32,
    weekdays: Vec<Weekday>,
    bypass_token: Option<String>,
    deferral_message: String,
}

impl AvailabilityWindow {
    pub fn new(config: &WindowConfig) -> Result<Self, SkillError> {
        config.check_hours()?;

        let weekdays = config
            .weekdays
            .iter()
            .map(|day| {
                day.trim()
                    .parse::<Weekday>()
                    .map_err(|_| SkillError::Config(format!("unknown weekday: {day}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: config.enabled,
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            weekdays,
            bypass_token: config
                .bypass_token
                .clone()
                .filter(|token| !token.is_empty()),
            deferral_message: config.deferral_message.clone(),
        })
    }

    pub fn deferral_message(&self) -> &str {
        &self.deferral_message
    }

    pub fn evaluate(&self, now: DateTime<Utc>, bypass_token: Option<&str>) -> WindowDecision {
        if !self.enabled {
            return WindowDecision::Open;
        }
        if let (Some(expected), Some(given)) = (&self.bypass_token, bypass_token) {
            if expected == given {
                return WindowDecision::Open;
            }
        }
        if self.day_allowed(now.weekday())
            && now.hour() >= self.open_hour
            && now.hour() < self.close_hour
        {
            return WindowDecision::Open;
        }

        WindowDecision::Closed {
            reopens_at: self.next_opening(now),
        }
    }

    fn day_allowed(&self, day: Weekday) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&day)
    }

    fn next_opening(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (0..=7).find_map(|offset| {
            let date = now.date_naive() + Duration::days(offset);
            if !self.day_allowed(date.weekday()) {
                return None;
            }
            let opening = Utc.from_utc_datetime(&date.and_hms_opt(self.open_hour, 0, 0)?);
            (opening > now).then_some(opening)
        })
    }
}
