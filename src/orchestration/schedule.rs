//! Crontab parsing and next-run computation.
//!
//! Supports the classic 5-field form `MIN HOUR DOM MON DOW` with `*`, `*/N`,
//! `N`, `A-B`, `A-B/N` and comma-separated lists. Day-of-week accepts 0-7
//! with both 0 and 7 meaning Sunday. When both day-of-month and day-of-week
//! are restricted, a day matching either one qualifies. A field starting with
//! `*` (including `*/N`) does not count as restricted.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{OrchestratorError, Result};

/// How far ahead to search before declaring an expression unsatisfiable
const MAX_SEARCH_DAYS: i64 = 366 * 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(OrchestratorError::ValidationError(format!(
                "Invalid crontab record '{expression}': need 5 fields (MIN HOUR DOM MON DOW)"
            )));
        }

        let field = |index: usize, min: u32, max: u32| {
            parse_field(parts[index], min, max).ok_or_else(|| {
                OrchestratorError::ValidationError(format!(
                    "Invalid crontab field '{}' in '{expression}'",
                    parts[index]
                ))
            })
        };

        let mut days_of_week = field(4, 0, 7)?;
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes: field(0, 0, 59)?,
            hours: field(1, 0, 23)?,
            days_of_month: field(2, 1, 31)?,
            months: field(3, 1, 12)?,
            days_of_week,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.months.contains(&date.month()) {
            return false;
        }

        let dom = self.days_of_month.contains(&date.day());
        let dow = self
            .days_of_week
            .contains(&date.weekday().num_days_from_sunday());

        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// First matching minute strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut date = start.date_naive();

        for day_offset in 0..MAX_SEARCH_DAYS {
            if self.day_matches(date) {
                // Only the first day is bounded below by the start time
                let (min_hour, min_minute) = if day_offset == 0 {
                    (start.hour(), start.minute())
                } else {
                    (0, 0)
                };

                for &hour in self.hours.range(min_hour..) {
                    let first_minute = if hour == min_hour { min_minute } else { 0 };
                    if let Some(&minute) = self.minutes.range(first_minute..).next() {
                        let naive = date.and_hms_opt(hour, minute, 0)?;
                        return Some(Utc.from_utc_datetime(&naive));
                    }
                }
            }
            date = date.succ_opt()?;
        }

        None
    }
}

impl FromStr for CronSchedule {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse one cron field into the set of matching values
fn parse_field(field: &str, min: u32, max: u32) -> Option<BTreeSet<u32>> {
    let mut values = BTreeSet::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().ok()?;
                if step == 0 {
                    return None;
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (low.parse().ok()?, high.parse().ok()?)
        } else {
            let value: u32 = range.parse().ok()?;
            // "N/step" runs from N to the end of the range
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if low < min || high > max || low > high {
            return None;
        }

        values.extend((low..=high).step_by(step as usize));
    }

    (!values.is_empty()).then_some(values)
}

/// Next run time for a crontab record, `None` when it cannot be parsed or
/// never fires
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Ok(schedule) => schedule.next_after(after),
        Err(e) => {
            tracing::warn!(expression = %expression, error = %e, "Invalid crontab record");
            None
        }
    }
}
