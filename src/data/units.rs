//! Time units
//!
//! All kinetic computations run in minutes. Inputs carry a [`TimeUnit`] tag
//! and are converted once, when the [`TimeGrid`](super::TimeGrid) or a
//! [`TimeQuantity`] is turned into minutes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::KineticModelError;

/// Unit tag for time values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    #[default]
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Multiplicative factor converting a value in this unit to minutes
    pub fn to_minutes_factor(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0 / 60.0,
            TimeUnit::Minutes => 1.0,
            TimeUnit::Hours => 60.0,
        }
    }

    /// Convert `value` expressed in this unit to minutes
    #[inline]
    pub fn to_minutes(self, value: f64) -> f64 {
        value * self.to_minutes_factor()
    }
}

impl FromStr for TimeUnit {
    type Err = KineticModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "min" | "mins" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(TimeUnit::Hours),
            other => Err(KineticModelError::invalid(format!(
                "'{}' is not a valid time unit",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
        };
        write!(f, "{}", s)
    }
}

/// A scalar time value with its unit, e.g. a radionuclide half-life
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeQuantity {
    pub value: f64,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl TimeQuantity {
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn minutes(value: f64) -> Self {
        Self::new(value, TimeUnit::Minutes)
    }

    pub fn seconds(value: f64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    pub fn as_minutes(&self) -> f64 {
        self.unit.to_minutes(self.value)
    }
}

impl fmt::Display for TimeQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
