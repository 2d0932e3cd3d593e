//! Recurrence rules and their suspension windows.
//!
//! Only the syntax of each cron field is checked here. Evaluating a schedule
//! against the clock belongs to the scheduler, not to the catalog.

use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// One comma-separated item of a cron field: `*`, `n`, `a-b`, each optionally
/// followed by `/step`, or a bare `/step`.
static CRON_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\*|(?P<start>\d+)(?:-(?P<end>\d+))?)?(?:/(?P<step>\d+))?$")
        .expect("cron item pattern compiles")
});

/// A cron field and its accepted numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    /// 0-59
    Minute,
    /// 0-23
    Hour,
    /// 1-31
    Day,
    /// 1-12
    Month,
    /// 0-6, Sunday is 0
    Weekday,
}

impl CronField {
    /// Field name as used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Weekday => "weekday",
        }
    }

    const fn bounds(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::Day => (1, 31),
            Self::Month => (1, 12),
            Self::Weekday => (0, 6),
        }
    }

    /// Checks the syntax and range of a field value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] if any item is malformed.
    pub fn validate(self, value: &str) -> Result<(), ValidationError> {
        let reject = || ValidationError::InvalidSchedule {
            field: self.name(),
            value: value.to_string(),
        };
        let (min, max) = self.bounds();
        let in_range = |raw: &str| -> Result<u32, ValidationError> {
            let n: u32 = raw.parse().map_err(|_| reject())?;
            if (min..=max).contains(&n) {
                Ok(n)
            } else {
                Err(reject())
            }
        };

        for item in value.split(',') {
            if item.is_empty() {
                return Err(reject());
            }
            let caps = CRON_ITEM.captures(item).ok_or_else(reject)?;

            if let Some(start) = caps.name("start") {
                let start = in_range(start.as_str())?;
                if let Some(end) = caps.name("end") {
                    if in_range(end.as_str())? < start {
                        return Err(reject());
                    }
                }
            }
            if let Some(step) = caps.name("step") {
                let step: u32 = step.as_str().parse().map_err(|_| reject())?;
                if step == 0 || step > max {
                    return Err(reject());
                }
            }
        }
        Ok(())
    }
}

/// A window during which a schedule must not fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Free-form reason shown to operators.
    pub reason: Option<String>,
}

impl Suspension {
    /// Creates a suspension window.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSuspension`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidSuspension {
                reason: format!("start {start} is not before end {end}"),
            });
        }
        Ok(Self {
            start,
            end,
            reason: None,
        })
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A named recurrence rule owned by one context.
///
/// Unset fields are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique name across the catalog.
    pub name: String,
    minute: Option<String>,
    hour: Option<String>,
    day: Option<String>,
    month: Option<String>,
    weekday: Option<String>,
    suspensions: Vec<Suspension>,
}

impl Schedule {
    /// Creates a schedule that matches every minute.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minute: None,
            hour: None,
            day: None,
            month: None,
            weekday: None,
            suspensions: Vec::new(),
        }
    }

    /// Parses a five-field expression (`minute hour day month weekday`).
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not have five valid fields.
    pub fn from_expression(name: impl Into<String>, expression: &str) -> Result<Self, ValidationError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(ValidationError::InvalidSchedule {
                field: "expression",
                value: expression.to_string(),
            });
        };

        Self::new(name)
            .with_field(CronField::Minute, minute)?
            .with_field(CronField::Hour, hour)?
            .with_field(CronField::Day, day)?
            .with_field(CronField::Month, month)?
            .with_field(CronField::Weekday, weekday)
    }

    /// Sets one field after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] if the value is malformed.
    pub fn with_field(mut self, field: CronField, value: &str) -> Result<Self, ValidationError> {
        field.validate(value)?;
        let slot = match field {
            CronField::Minute => &mut self.minute,
            CronField::Hour => &mut self.hour,
            CronField::Day => &mut self.day,
            CronField::Month => &mut self.month,
            CronField::Weekday => &mut self.weekday,
        };
        *slot = (value != "*").then(|| value.to_string());
        Ok(self)
    }

    /// Returns the raw value of a field, `None` meaning wildcard.
    #[must_use]
    pub fn field(&self, field: CronField) -> Option<&str> {
        match field {
            CronField::Minute => self.minute.as_deref(),
            CronField::Hour => self.hour.as_deref(),
            CronField::Day => self.day.as_deref(),
            CronField::Month => self.month.as_deref(),
            CronField::Weekday => self.weekday.as_deref(),
        }
    }

    /// Renders the five-field expression handed to the scheduler.
    #[must_use]
    pub fn expression(&self) -> String {
        [
            CronField::Minute,
            CronField::Hour,
            CronField::Day,
            CronField::Month,
            CronField::Weekday,
        ]
        .iter()
        .map(|f| self.field(*f).unwrap_or("*"))
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Adds a suspension window.
    pub fn add_suspension(&mut self, suspension: Suspension) {
        self.suspensions.push(suspension);
    }

    /// Returns the suspension windows.
    #[must_use]
    pub fn suspensions(&self) -> &[Suspension] {
        &self.suspensions
    }

    /// Returns true if any suspension covers `at`.
    #[must_use]
    pub fn is_suspended_at(&self, at: DateTime<Utc>) -> bool {
        self.suspensions.iter().any(|s| s.contains(at))
    }
}
