use crate::domain::error::DomainError;
use crate::domain::models::{Phase, PhaseType};
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_ROLLOVER_WINDOW_HOURS: i64 = 24;
pub const MAX_DAY_DURATION_HOURS: i64 = 24;
/// Bound on the magnitude of the carried balance.
pub const MAX_DEBT_DAYS: i64 = 36_500;

/// What happens to a tracker once its workday is considered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverPolicy {
    /// `true` starts the new day from a clean quota; `false` carries the
    /// previous balance forward and charges one quota per elapsed window.
    pub reset_on_rollover: bool,
    pub rollover_window: Duration,
}

impl Default for RolloverPolicy {
    fn default() -> Self {
        Self {
            reset_on_rollover: true,
            rollover_window: Duration::hours(DEFAULT_ROLLOVER_WINDOW_HOURS),
        }
    }
}

impl RolloverPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.rollover_window <= Duration::zero() {
            return Err(DomainError::Validation(
                "rollover window must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Idle,
    Running(PhaseType),
    /// History ends in a closed phase; only reachable through `add_phase` or a restored record.
    Stopped(PhaseType),
}

impl TrackerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running(PhaseType::Work) => "work",
            Self::Running(PhaseType::Break) => "break",
            Self::Stopped(_) => "stopped",
        }
    }
}

/// Phase history and quota accounting for one workday.
///
/// `debt` is the signed work balance against the quota. A fresh tracker
/// starts at `-day_duration`; every closed Work phase raises it by exactly
/// its duration, so zero means the quota is met. Time-dependent queries take
/// `now` explicitly and never read the clock themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTracker {
    storage_key: String,
    day_duration: Duration,
    start_time: Option<DateTime<Utc>>,
    debt: Duration,
    phases: Vec<Phase>,
}

impl TimeTracker {
    pub fn new(
        storage_key: impl Into<String>,
        day_duration: Duration,
    ) -> Result<Self, DomainError> {
        let storage_key = storage_key.into();
        validate_storage_key(&storage_key)?;
        validate_day_duration(day_duration)?;

        Ok(Self {
            storage_key,
            day_duration,
            start_time: None,
            debt: -day_duration,
            phases: Vec::new(),
        })
    }

    /// Rebuilds a tracker from stored parts. `debt` is taken as stored and is
    /// not re-derived from the phases. Records whose accounting cannot be
    /// represented are rejected here rather than at query time.
    pub fn restore(
        storage_key: impl Into<String>,
        day_duration: Duration,
        start_time: Option<DateTime<Utc>>,
        debt: Duration,
        phases: Vec<Phase>,
    ) -> Result<Self, DomainError> {
        let mut tracker = Self::new(storage_key, day_duration)?;
        for phase in phases {
            tracker.check_append(&phase)?;
            tracker.phases.push(phase);
        }

        let first_start = tracker.phases.first().map(Phase::start);
        if start_time != first_start {
            return Err(DomainError::Validation(match (start_time, first_start) {
                (None, Some(_)) => "start time is missing although phases exist".to_string(),
                (Some(_), None) => "start time is set although no phase exists".to_string(),
                _ => "start time does not match the first phase".to_string(),
            }));
        }

        tracker.start_time = start_time;
        tracker.debt = bounded_debt(Some(debt))?;
        tracker.cumulative_time(PhaseType::Work)?;
        if let Some(start) = start_time {
            tracker.estimated_time_to_leave(start)?;
        }
        Ok(tracker)
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn day_duration(&self) -> Duration {
        self.day_duration
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn debt(&self) -> Duration {
        self.debt
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn status(&self) -> TrackerStatus {
        match self.phases.last() {
            None => TrackerStatus::Idle,
            Some(phase) if phase.is_open() => TrackerStatus::Running(phase.phase_type()),
            Some(phase) => TrackerStatus::Stopped(phase.phase_type()),
        }
    }

    /// Appends a phase to the history.
    ///
    /// Rejected, leaving the history untouched, while the current tail is
    /// still open or when the phase starts before the previous one ended.
    pub fn add_phase(&mut self, phase: Phase) -> Result<(), DomainError> {
        self.check_append(&phase)?;

        let debt = match (phase.phase_type(), phase.stored_duration()) {
            (PhaseType::Work, Some(duration)) => bounded_debt(self.debt.checked_add(&duration))?,
            _ => self.debt,
        };
        if self.phases.is_empty() {
            self.start_time = Some(phase.start());
        }
        self.debt = debt;
        self.phases.push(phase);
        Ok(())
    }

    pub fn last_phase(&self) -> Option<&Phase> {
        self.phases.last()
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.last().filter(|phase| phase.is_open())
    }

    /// Closes the running phase (if any) at `now` and opens the opposite one.
    /// The first toggle of the day opens Work and marks the start of the workday.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> Result<&Phase, DomainError> {
        let next_type = match self.status() {
            TrackerStatus::Idle => PhaseType::Work,
            TrackerStatus::Running(current) => {
                self.close_current(now)?;
                current.opposite()
            }
            TrackerStatus::Stopped(last) => last.opposite(),
        };

        self.add_phase(Phase::open(next_type, now))?;
        self.phases
            .last()
            .ok_or_else(|| DomainError::State("history is empty after toggle".to_string()))
    }

    /// Sum over closed phases of `phase_type`; the running phase is excluded.
    pub fn cumulative_time(&self, phase_type: PhaseType) -> Result<Duration, DomainError> {
        self.phases
            .iter()
            .filter(|phase| phase.phase_type() == phase_type)
            .filter_map(Phase::stored_duration)
            .try_fold(Duration::zero(), |total, duration| {
                total
                    .checked_add(&duration)
                    .ok_or_else(|| overflow("cumulative time"))
            })
    }

    /// Closed aggregate plus the live duration of the running phase when it has the same type.
    pub fn cumulative_time_including_current(
        &self,
        phase_type: PhaseType,
        now: DateTime<Utc>,
    ) -> Result<Duration, DomainError> {
        self.cumulative_time(phase_type)?
            .checked_add(&self.running_duration(phase_type, now))
            .ok_or_else(|| overflow("cumulative time"))
    }

    pub fn worked_time(&self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        self.cumulative_time_including_current(PhaseType::Work, now)
    }

    pub fn break_time(&self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        self.cumulative_time_including_current(PhaseType::Break, now)
    }

    /// Breaks push the end of the day back; work time does not move it.
    pub fn estimated_time_to_leave(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DomainError> {
        let breaks = self.cumulative_time(PhaseType::Break)?;
        self.start_time
            .unwrap_or(now)
            .checked_add_signed(self.day_duration)
            .and_then(|end| end.checked_add_signed(breaks))
            .ok_or_else(|| overflow("time to leave"))
    }

    /// Negative once the quota is exceeded.
    pub fn remaining_work_time(&self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        self.day_duration
            .checked_sub(&self.worked_time(now)?)
            .ok_or_else(|| overflow("remaining work time"))
    }

    pub fn overtime(&self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        Ok((-self.remaining_work_time(now)?).max(Duration::zero()))
    }

    /// Balance as it would stand if the running Work phase were closed at `now`.
    pub fn outstanding_debt(&self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        self.debt
            .checked_add(&self.running_duration(PhaseType::Work, now))
            .ok_or_else(|| overflow("balance"))
    }

    pub fn is_rollover_due(&self, now: DateTime<Utc>, policy: &RolloverPolicy) -> bool {
        self.start_time
            .and_then(|start| start.checked_add_signed(policy.rollover_window))
            .is_some_and(|due_at| now >= due_at)
    }

    /// Builds the tracker that replaces this one for a new day.
    ///
    /// Phases are dropped in both modes, including a running tail, which is
    /// never credited. With `reset_on_rollover` the balance returns to minus
    /// the new quota; otherwise the previous balance is kept and one quota is
    /// charged per elapsed rollover window.
    pub fn roll_over(
        &self,
        now: DateTime<Utc>,
        policy: &RolloverPolicy,
        day_duration: Duration,
    ) -> Result<Self, DomainError> {
        policy.validate()?;
        let mut next = Self::new(self.storage_key.clone(), day_duration)?;
        if policy.reset_on_rollover {
            return Ok(next);
        }

        let missed = self.missed_windows(now, policy);
        let penalty = day_duration
            .num_milliseconds()
            .checked_mul(missed)
            .and_then(Duration::try_milliseconds)
            .ok_or_else(|| overflow("missed-day penalty"))?;
        next.debt = bounded_debt(self.debt.checked_sub(&penalty))?;
        Ok(next)
    }

    fn missed_windows(&self, now: DateTime<Utc>, policy: &RolloverPolicy) -> i64 {
        let window_ms = policy.rollover_window.num_milliseconds().max(1);
        self.start_time
            .map(|start| (now - start).num_milliseconds() / window_ms)
            .unwrap_or(0)
            .max(1)
    }

    fn running_duration(&self, phase_type: PhaseType, now: DateTime<Utc>) -> Duration {
        self.current_phase()
            .filter(|phase| phase.phase_type() == phase_type)
            .map(|phase| phase.duration(now))
            .unwrap_or_else(Duration::zero)
    }

    fn close_current(&mut self, now: DateTime<Utc>) -> Result<Duration, DomainError> {
        let mut closed = self
            .current_phase()
            .cloned()
            .ok_or_else(|| DomainError::State("no running phase to close".to_string()))?;
        let duration = closed.complete(now)?;
        let debt = match closed.phase_type() {
            PhaseType::Work => bounded_debt(self.debt.checked_add(&duration))?,
            PhaseType::Break => self.debt,
        };

        if let Some(last) = self.phases.last_mut() {
            *last = closed;
        }
        self.debt = debt;
        Ok(duration)
    }

    fn check_append(&self, phase: &Phase) -> Result<(), DomainError> {
        let Some(last) = self.phases.last() else {
            return Ok(());
        };
        let Some(last_end) = last.end() else {
            return Err(DomainError::Validation(format!(
                "cannot append a phase while the {} phase started at {} is still open",
                last.phase_type(),
                last.start().to_rfc3339()
            )));
        };
        if phase.start() < last_end {
            return Err(DomainError::Validation(format!(
                "phase starting at {} overlaps the previous phase ending at {}",
                phase.start().to_rfc3339(),
                last_end.to_rfc3339()
            )));
        }
        Ok(())
    }
}

fn overflow(quantity: &str) -> DomainError {
    DomainError::State(format!("{quantity} is out of range"))
}

fn bounded_debt(value: Option<Duration>) -> Result<Duration, DomainError> {
    value
        .filter(|debt| debt.abs() <= Duration::days(MAX_DEBT_DAYS))
        .ok_or_else(|| DomainError::State(format!("balance exceeds {MAX_DEBT_DAYS} days")))
}

fn validate_storage_key(value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(
            "storage key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_day_duration(value: Duration) -> Result<(), DomainError> {
    if value <= Duration::zero() || value > Duration::hours(MAX_DAY_DURATION_HOURS) {
        return Err(DomainError::Validation(format!(
            "day duration must be > 0 and at most {MAX_DAY_DURATION_HOURS}h"
        )));
    }
    Ok(())
}
