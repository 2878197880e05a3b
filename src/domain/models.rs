use crate::domain::error::DomainError;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STRETCH_LIMIT_MINUTES: i64 = 2;
const COFFEE_LIMIT_MINUTES: i64 = 5;
const PAUSE_LIMIT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PhaseType {
    Work,
    Break,
}

impl PhaseType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "Work",
            Self::Break => "Break",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Work => Self::Break,
            Self::Break => Self::Work,
        }
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Work" => Ok(Self::Work),
            "Break" => Ok(Self::Break),
            other => Err(DomainError::Validation(format!(
                "unknown phase type '{other}'"
            ))),
        }
    }
}

/// Presentation bucket for a phase, derived only from its type and duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCategory {
    Work,
    Stretch,
    Coffee,
    Pause,
    Meal,
}

impl PhaseCategory {
    /// Break buckets are half-open: `[0, 2)`, `[2, 5)`, `[5, 30)` and `[30, ∞)` minutes.
    pub fn classify(phase_type: PhaseType, duration: Duration) -> Self {
        match phase_type {
            PhaseType::Work => Self::Work,
            PhaseType::Break if duration < Duration::minutes(STRETCH_LIMIT_MINUTES) => {
                Self::Stretch
            }
            PhaseType::Break if duration < Duration::minutes(COFFEE_LIMIT_MINUTES) => Self::Coffee,
            PhaseType::Break if duration < Duration::minutes(PAUSE_LIMIT_MINUTES) => Self::Pause,
            PhaseType::Break => Self::Meal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Stretch => "stretch",
            Self::Coffee => "coffee",
            Self::Pause => "pause",
            Self::Meal => "meal",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Work => "💻",
            Self::Stretch => "🚶",
            Self::Coffee => "☕",
            Self::Pause => "🥪",
            Self::Meal => "🍽️",
        }
    }
}

/// One contiguous interval of work or break.
///
/// Timestamps are truncated to whole milliseconds on the way in, which is the
/// resolution of the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    phase_type: PhaseType,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Phase {
    pub fn open(phase_type: PhaseType, start: DateTime<Utc>) -> Self {
        Self {
            phase_type,
            start: start.trunc_subsecs(3),
            end: None,
            duration: None,
        }
    }

    pub fn closed(
        phase_type: PhaseType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if end.trunc_subsecs(3) < start.trunc_subsecs(3) {
            return Err(DomainError::Validation(format!(
                "phase end {} precedes start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        let mut phase = Self::open(phase_type, start);
        phase.complete(end)?;
        Ok(phase)
    }

    /// Closes the phase at `end` and returns the fixed duration.
    pub fn complete(&mut self, end: DateTime<Utc>) -> Result<Duration, DomainError> {
        if self.end.is_some() {
            return Err(DomainError::State(format!(
                "{} phase started at {} is already completed",
                self.phase_type,
                self.start.to_rfc3339()
            )));
        }

        let end = end.trunc_subsecs(3);
        if end < self.start {
            return Err(DomainError::State(format!(
                "cannot close {} phase at {}: it started at {}",
                self.phase_type,
                end.to_rfc3339(),
                self.start.to_rfc3339()
            )));
        }

        let duration = end - self.start;
        self.end = Some(end);
        self.duration = Some(duration);
        Ok(duration)
    }

    pub fn phase_type(&self) -> PhaseType {
        self.phase_type
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Fixed duration for a closed phase, `None` while the phase is running.
    pub fn stored_duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Stored duration once closed; otherwise elapsed time up to `now`, recomputed on every call.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        match self.duration {
            Some(duration) => duration,
            None => (now.trunc_subsecs(3) - self.start).max(Duration::zero()),
        }
    }

    pub fn category(&self, now: DateTime<Utc>) -> PhaseCategory {
        PhaseCategory::classify(self.phase_type, self.duration(now))
    }
}
