//! The clock. A [`Schedule`] turns the configured day layout into the sequence of steps a run
//! goes through. Every day is split into sub-periods, each with its own length and set of
//! active activities, and weekends may be split differently from weekdays.
//!
//! ```json
//! {
//!     "initial_date": "2020-03-01",
//!     "total_days": 10,
//!     "step_duration": {
//!         "weekday": { "0": 8, "1": 16 },
//!         "weekend": { "0": 24 }
//!     },
//!     "step_activities": {
//!         "weekday": { "0": ["primary_activity", "residence"], "1": ["residence"] },
//!         "weekend": { "0": ["leisure", "residence"] }
//!     }
//! }
//! ```
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::activity::Activity;
use crate::SimulatorError;

const HOURS_PER_DAY: f64 = 24.0;
const DURATION_TOLERANCE: f64 = 1e-9;
const MILLISECONDS_PER_HOUR: f64 = 3_600_000.0;

/// A value configured separately for weekdays and weekends.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DayTypeMap<T> {
    pub weekday: T,
    pub weekend: T,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TimeConfig {
    pub initial_date: NaiveDate,
    pub total_days: u32,
    /// Length of each sub-period in hours. Keys order the sub-periods of a day.
    pub step_duration: DayTypeMap<BTreeMap<usize, f64>>,
    /// Activity names active in each sub-period.
    pub step_activities: DayTypeMap<BTreeMap<usize, Vec<String>>>,
}

/// One sub-period of the simulated time.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub date: NaiveDateTime,
    /// Days since the initial date at the start of the step.
    pub now: f64,
    /// Length of the step as a fraction of a day.
    pub duration: f64,
    pub activities: Vec<Activity>,
    pub is_weekend: bool,
    /// Index of the sub-period within its day.
    pub shift: usize,
}

impl Step {
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.now + self.duration
    }
}

#[derive(Clone, Debug)]
struct SubPeriod {
    hours: f64,
    activities: Vec<Activity>,
}

fn day_layout(
    day_type: &str,
    durations: &BTreeMap<usize, f64>,
    activities: &BTreeMap<usize, Vec<String>>,
) -> Result<Vec<SubPeriod>, SimulatorError> {
    if !durations.keys().eq(activities.keys()) {
        return Err(SimulatorError::Config(format!(
            "{day_type} step durations and step activities have different sub-periods"
        )));
    }
    let total: f64 = durations.values().sum();
    if (total - HOURS_PER_DAY).abs() > DURATION_TOLERANCE {
        return Err(SimulatorError::Config(format!(
            "{day_type} step durations add up to {total} hours instead of {HOURS_PER_DAY}"
        )));
    }
    if let Some(hours) = durations.values().find(|hours| **hours <= 0.0) {
        return Err(SimulatorError::Config(format!(
            "{day_type} step of {hours} hours is not positive"
        )));
    }
    durations
        .iter()
        .zip(activities.values())
        .map(|((_, hours), names)| {
            let activities = names
                .iter()
                .map(|name| name.parse::<Activity>())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SubPeriod {
                hours: *hours,
                activities,
            })
        })
        .collect()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// A finite, forward-only sequence of [`Step`]s. It is consumed by iterating and cannot be
/// restarted.
#[derive(Clone, Debug)]
pub struct Schedule {
    initial_date: NaiveDateTime,
    total_days: u32,
    weekday: Vec<SubPeriod>,
    weekend: Vec<SubPeriod>,
    day: u32,
    shift: usize,
    hours_into_day: f64,
}

impl Schedule {
    /// # Errors
    ///
    /// Returns a `SimulatorError::Config` if `total_days` is zero, a day layout does not add up
    /// to 24 hours, has a non-positive sub-period, names an unknown activity, or its durations
    /// and activities list different sub-periods.
    pub fn new(config: &TimeConfig) -> Result<Schedule, SimulatorError> {
        if config.total_days == 0 {
            return Err("total_days must be at least one".into());
        }
        let weekday = day_layout(
            "weekday",
            &config.step_duration.weekday,
            &config.step_activities.weekday,
        )?;
        let weekend = day_layout(
            "weekend",
            &config.step_duration.weekend,
            &config.step_activities.weekend,
        )?;
        Ok(Schedule {
            initial_date: config.initial_date.and_time(NaiveTime::MIN),
            total_days: config.total_days,
            weekday,
            weekend,
            day: 0,
            shift: 0,
            hours_into_day: 0.0,
        })
    }

    #[must_use]
    pub fn initial_date(&self) -> NaiveDateTime {
        self.initial_date
    }

    /// The first instant after the last step.
    #[must_use]
    pub fn final_date(&self) -> NaiveDateTime {
        self.initial_date + TimeDelta::days(i64::from(self.total_days))
    }

    #[must_use]
    pub fn total_days(&self) -> u32 {
        self.total_days
    }
}

impl Iterator for Schedule {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        if self.day >= self.total_days {
            return None;
        }
        let day_start = self.initial_date + TimeDelta::days(i64::from(self.day));
        let weekend = is_weekend(day_start.date());
        let periods = if weekend { &self.weekend } else { &self.weekday };
        let period = &periods[self.shift];

        #[allow(clippy::cast_possible_truncation)]
        let offset = TimeDelta::milliseconds((self.hours_into_day * MILLISECONDS_PER_HOUR).round() as i64);
        let step = Step {
            date: day_start + offset,
            now: f64::from(self.day) + self.hours_into_day / HOURS_PER_DAY,
            duration: period.hours / HOURS_PER_DAY,
            activities: period.activities.clone(),
            is_weekend: weekend,
            shift: self.shift,
        };

        self.shift += 1;
        self.hours_into_day += period.hours;
        if self.shift == periods.len() {
            self.day += 1;
            self.shift = 0;
            self.hours_into_day = 0.0;
        }
        Some(step)
    }
}
