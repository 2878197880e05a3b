use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::models::{Phase, PhaseType};
use crate::domain::tracker::TimeTracker;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::tracker_store::{
    SqliteTrackerStore, TrackerStore, decode_slot, save_tracker,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const COMMAND_LOG_TARGET: &str = "worktimer::commands";

/// Application context: owns the configuration, the slot store and the one
/// live tracker. Every command persists the tracker after mutating it.
pub struct AppState {
    config: AppConfig,
    config_path: Option<PathBuf>,
    store: Box<dyn TrackerStore>,
    tracker: Mutex<TimeTracker>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, now: DateTime<Utc>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = SqliteTrackerStore::new(&bootstrap.database_path);
        let mut state = Self::with_store(bootstrap.config, Box::new(store), now)?;
        state.config_path = Some(bootstrap.config_path);
        Ok(state)
    }

    /// Loads the configured slot, falling back to a fresh tracker when it is
    /// empty or holds a malformed record, applies the rollover check and writes
    /// the result back. A failing store read aborts without writing.
    pub fn with_store(
        config: AppConfig,
        store: Box<dyn TrackerStore>,
        now: DateTime<Utc>,
    ) -> Result<Self, InfraError> {
        config.validate()?;
        let mut tracker = load_or_fresh(&config, store.as_ref())?;
        roll_over_if_due(&mut tracker, &config, now)?;
        save_tracker(store.as_ref(), &tracker)?;

        Ok(Self {
            config,
            config_path: None,
            store,
            tracker: Mutex::new(tracker),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        log::info!(target: COMMAND_LOG_TARGET, "command={command} {message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        log::error!(target: COMMAND_LOG_TARGET, "command={command} {message}");
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PhaseResponse {
    pub phase_type: String,
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub duration_ms: i64,
    pub open: bool,
    pub category: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrackerStateResponse {
    pub status: String,
    pub storage_key: String,
    pub now_ms: i64,
    pub day_duration_ms: i64,
    pub start_time_ms: Option<i64>,
    pub debt_ms: i64,
    pub outstanding_debt_ms: i64,
    pub worked_ms: i64,
    pub break_ms: i64,
    pub closed_work_ms: i64,
    pub closed_break_ms: i64,
    pub remaining_ms: i64,
    pub overtime_ms: i64,
    pub time_to_leave_ms: i64,
    pub phase_count: usize,
    pub current_phase: Option<PhaseResponse>,
}

pub fn toggle_phase_impl(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<TrackerStateResponse, InfraError> {
    let mut tracker = lock_tracker(state)?;
    if roll_over_if_due(&mut tracker, &state.config, now)? {
        state.log_info("toggle_phase", "started a new day before toggling");
    }

    let opened = tracker.toggle(now)?.clone();
    save_tracker(state.store.as_ref(), &tracker)?;

    state.log_info(
        "toggle_phase",
        &format!(
            "opened phase_type={} at={}",
            opened.phase_type(),
            opened.start().to_rfc3339()
        ),
    );
    to_tracker_state_response(&tracker, now)
}

/// Read-only snapshot; safe to call from a refresh tick.
pub fn get_tracker_state_impl(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<TrackerStateResponse, InfraError> {
    let tracker = lock_tracker(state)?;
    to_tracker_state_response(&tracker, now)
}

pub fn list_phases_impl(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<Vec<PhaseResponse>, InfraError> {
    let tracker = lock_tracker(state)?;
    Ok(tracker
        .phases()
        .iter()
        .map(|phase| to_phase_response(phase, now))
        .collect())
}

pub fn reset_day_impl(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<TrackerStateResponse, InfraError> {
    let mut tracker = lock_tracker(state)?;
    let discarded = tracker.phases().len();
    *tracker = fresh_tracker(&state.config)?;
    save_tracker(state.store.as_ref(), &tracker)?;

    state.log_info("reset_day", &format!("discarded phases={discarded}"));
    to_tracker_state_response(&tracker, now)
}

fn lock_tracker(state: &AppState) -> Result<MutexGuard<'_, TimeTracker>, InfraError> {
    state
        .tracker
        .lock()
        .map_err(|error| InfraError::LockPoisoned(format!("tracker: {error}")))
}

fn fresh_tracker(config: &AppConfig) -> Result<TimeTracker, InfraError> {
    Ok(TimeTracker::new(config.storage_key(), config.day_duration())?)
}

fn load_or_fresh(config: &AppConfig, store: &dyn TrackerStore) -> Result<TimeTracker, InfraError> {
    let Some(raw) = store.read(config.storage_key())? else {
        log::info!(
            target: COMMAND_LOG_TARGET,
            "no stored tracker under '{}', starting fresh",
            config.storage_key()
        );
        return fresh_tracker(config);
    };

    match decode_slot(&raw, config.storage_key()) {
        Ok(tracker) => Ok(tracker),
        Err(error) => {
            log::warn!(
                target: COMMAND_LOG_TARGET,
                "discarding unreadable tracker under '{}': {error}",
                config.storage_key()
            );
            fresh_tracker(config)
        }
    }
}

/// Replaces the tracker when its workday is over. The new day uses the
/// quota from the current configuration.
fn roll_over_if_due(
    tracker: &mut TimeTracker,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<bool, InfraError> {
    let policy = config.rollover_policy();
    if !tracker.is_rollover_due(now, &policy) {
        return Ok(false);
    }

    let next = match tracker.roll_over(now, &policy, config.day_duration()) {
        Ok(next) => next,
        Err(error) => {
            log::warn!(
                target: COMMAND_LOG_TARGET,
                "carried balance cannot be kept, starting from a clean quota: {error}"
            );
            fresh_tracker(config)?
        }
    };
    log::info!(
        target: COMMAND_LOG_TARGET,
        "day rollover: discarded phases={} reset={} debt_ms={}",
        tracker.phases().len(),
        policy.reset_on_rollover,
        next.debt().num_milliseconds()
    );
    *tracker = next;
    Ok(true)
}

fn to_phase_response(phase: &Phase, now: DateTime<Utc>) -> PhaseResponse {
    let category = phase.category(now);
    PhaseResponse {
        phase_type: phase.phase_type().as_str().to_string(),
        start_ms: phase.start().timestamp_millis(),
        end_ms: phase.end().map(|value| value.timestamp_millis()),
        duration_ms: phase.duration(now).num_milliseconds(),
        open: phase.is_open(),
        category: category.as_str().to_string(),
        emoji: category.emoji().to_string(),
    }
}

fn to_tracker_state_response(
    tracker: &TimeTracker,
    now: DateTime<Utc>,
) -> Result<TrackerStateResponse, InfraError> {
    Ok(TrackerStateResponse {
        status: tracker.status().as_str().to_string(),
        storage_key: tracker.storage_key().to_string(),
        now_ms: now.timestamp_millis(),
        day_duration_ms: tracker.day_duration().num_milliseconds(),
        start_time_ms: tracker.start_time().map(|value| value.timestamp_millis()),
        debt_ms: tracker.debt().num_milliseconds(),
        outstanding_debt_ms: tracker.outstanding_debt(now)?.num_milliseconds(),
        worked_ms: tracker.worked_time(now)?.num_milliseconds(),
        break_ms: tracker.break_time(now)?.num_milliseconds(),
        closed_work_ms: tracker.cumulative_time(PhaseType::Work)?.num_milliseconds(),
        closed_break_ms: tracker.cumulative_time(PhaseType::Break)?.num_milliseconds(),
        remaining_ms: tracker.remaining_work_time(now)?.num_milliseconds(),
        overtime_ms: tracker.overtime(now)?.num_milliseconds(),
        time_to_leave_ms: tracker.estimated_time_to_leave(now)?.timestamp_millis(),
        phase_count: tracker.phases().len(),
        current_phase: tracker
            .current_phase()
            .map(|phase| to_phase_response(phase, now)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::tracker_codec::serialize_tracker;
    use crate::infrastructure::tracker_store::InMemoryTrackerStore;
    use chrono::Duration;
    use std::fs;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "worktimer-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self, now: DateTime<Utc>) -> AppState {
            AppState::new(self.path.clone(), now).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    /// Lets a test keep a handle on the slots while `AppState` owns the store.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<InMemoryTrackerStore>);

    impl TrackerStore for SharedStore {
        fn read(&self, key: &str) -> Result<Option<String>, InfraError> {
            self.0.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<(), InfraError> {
            self.0.write(key, value)
        }
    }

    /// Holds real slots but fails every read, like a database that stays locked.
    struct LockedStore(SharedStore);

    impl TrackerStore for LockedStore {
        fn read(&self, _key: &str) -> Result<Option<String>, InfraError> {
            Err(InfraError::Io(std::io::Error::other("database is locked")))
        }

        fn write(&self, key: &str, value: &str) -> Result<(), InfraError> {
            self.0.write(key, value)
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn t0() -> DateTime<Utc> {
        fixed_time("2026-02-16T09:00:00Z")
    }

    fn eight_hour_config() -> AppConfig {
        AppConfig {
            day_duration_minutes: 8 * 60,
            ..AppConfig::default()
        }
    }

    #[test]
    fn fresh_workspace_starts_idle() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state(t0());

        let snapshot = get_tracker_state_impl(&state, t0()).expect("state");
        assert_eq!(snapshot.status, "idle");
        assert_eq!(snapshot.start_time_ms, None);
        assert_eq!(snapshot.day_duration_ms, 7 * 3_600_000);
        assert_eq!(snapshot.time_to_leave_ms, (t0() + Duration::hours(7)).timestamp_millis());
        assert!(state.config_path().is_some_and(Path::exists));
    }

    #[test]
    fn toggles_survive_reload_from_sqlite() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state(t0());
            toggle_phase_impl(&state, t0()).expect("start work");
            toggle_phase_impl(&state, t0() + Duration::hours(1)).expect("start break");
        }

        let reload_at = t0() + Duration::hours(1) + Duration::minutes(20);
        let state = workspace.app_state(reload_at);
        let snapshot = get_tracker_state_impl(&state, reload_at).expect("state");
        assert_eq!(snapshot.status, "break");
        assert_eq!(snapshot.closed_work_ms, 3_600_000);
        assert_eq!(snapshot.break_ms, 20 * 60_000);
        assert_eq!(snapshot.closed_break_ms, 0);
        let current = snapshot.current_phase.expect("running break");
        assert!(current.open);
        assert_eq!(current.duration_ms, 20 * 60_000);
        assert_eq!(current.category, "pause");
    }

    #[test]
    fn work_break_work_scenario_through_commands() {
        let store = SharedStore::default();
        let state = AppState::with_store(eight_hour_config(), Box::new(store.clone()), t0())
            .expect("state");

        toggle_phase_impl(&state, t0()).expect("work");
        toggle_phase_impl(&state, t0() + Duration::hours(1)).expect("break");
        let snapshot = toggle_phase_impl(&state, t0() + Duration::minutes(70)).expect("work");

        assert_eq!(snapshot.status, "work");
        assert_eq!(snapshot.closed_work_ms, 3_600_000);
        assert_eq!(snapshot.closed_break_ms, 10 * 60_000);
        assert_eq!(
            snapshot.time_to_leave_ms,
            (t0() + Duration::hours(8) + Duration::minutes(10)).timestamp_millis()
        );
        assert_eq!(snapshot.debt_ms, -7 * 3_600_000);

        let phases = list_phases_impl(&state, t0() + Duration::minutes(80)).expect("phases");
        let kinds = phases
            .iter()
            .map(|phase| phase.phase_type.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["Work", "Break", "Work"]);
        assert_eq!(phases[1].category, "pause");
        assert_eq!(phases[2].duration_ms, 10 * 60_000);

        let persisted = store.read("timeTracker").expect("read").expect("slot written");
        assert!(persisted.contains("\"type\":\"Break\""));
    }

    #[test]
    fn corrupt_slot_falls_back_to_fresh_tracker() {
        let store = SharedStore::default();
        store
            .write("timeTracker", r#"{"storageKey":"timeTracker","phases":[{"type":"Work"}]}"#)
            .expect("seed corrupt slot");

        let state = AppState::with_store(eight_hour_config(), Box::new(store.clone()), t0())
            .expect("state");
        let snapshot = get_tracker_state_impl(&state, t0()).expect("state");
        assert_eq!(snapshot.status, "idle");
        assert_eq!(snapshot.phase_count, 0);
        assert_eq!(snapshot.debt_ms, -8 * 3_600_000);

        let rewritten = store.read("timeTracker").expect("read").expect("slot");
        assert!(rewritten.contains("\"phases\":[]"));
    }

    #[test]
    fn failing_read_keeps_stored_history() {
        let store = SharedStore::default();
        let mut today = TimeTracker::new("timeTracker", Duration::hours(8)).expect("tracker");
        today.toggle(t0()).expect("work");
        today.toggle(t0() + Duration::hours(2)).expect("break");
        let stored = serialize_tracker(&today).expect("serialize");
        store.write("timeTracker", &stored).expect("seed");

        let result = AppState::with_store(
            eight_hour_config(),
            Box::new(LockedStore(store.clone())),
            t0() + Duration::hours(3),
        );
        assert!(matches!(result, Err(InfraError::Io(_))));
        assert_eq!(store.read("timeTracker").expect("read"), Some(stored));
    }

    #[test]
    fn unrepresentable_slot_falls_back_to_fresh_tracker() {
        let store = SharedStore::default();
        let start_ms = t0().timestamp_millis();
        let record = |day_duration: i64, debt: i64| {
            serde_json::json!({
                "storageKey": "timeTracker",
                "dayDuration": day_duration,
                "startTime": start_ms,
                "debt": debt,
                "phases": [{ "type": "Work", "start": start_ms, "end": null, "duration": null }]
            })
            .to_string()
        };

        store
            .write("timeTracker", &record(9_000_000_000_000_000_000, 0))
            .expect("seed huge quota");
        let state = AppState::with_store(eight_hour_config(), Box::new(store.clone()), t0())
            .expect("state");
        let snapshot = get_tracker_state_impl(&state, t0()).expect("state");
        assert_eq!(snapshot.status, "idle");
        assert_eq!(snapshot.day_duration_ms, 8 * 3_600_000);

        store
            .write("timeTracker", &record(8 * 3_600_000, -9_223_372_036_854_775_807))
            .expect("seed huge debt");
        let state = AppState::with_store(eight_hour_config(), Box::new(store.clone()), t0())
            .expect("state");
        let snapshot = toggle_phase_impl(&state, t0() + Duration::hours(1)).expect("toggle");
        assert_eq!(snapshot.status, "work");
        assert_eq!(snapshot.phase_count, 1);
        assert_eq!(snapshot.debt_ms, -8 * 3_600_000);
    }

    #[test]
    fn stale_slot_rolls_over_on_load() {
        let store = SharedStore::default();
        let mut yesterday =
            TimeTracker::new("timeTracker", Duration::hours(8)).expect("tracker");
        yesterday.toggle(t0()).expect("work");
        yesterday.toggle(t0() + Duration::hours(4)).expect("break");
        store
            .write("timeTracker", &serialize_tracker(&yesterday).expect("serialize"))
            .expect("seed");

        let now = t0() + Duration::hours(25);
        let state = AppState::with_store(eight_hour_config(), Box::new(store.clone()), now)
            .expect("state");
        let snapshot = get_tracker_state_impl(&state, now).expect("state");
        assert_eq!(snapshot.status, "idle");
        assert_eq!(snapshot.start_time_ms, None);
        assert_eq!(snapshot.debt_ms, -8 * 3_600_000);
    }

    #[test]
    fn penalty_policy_carries_debt_into_new_day() {
        let store = SharedStore::default();
        let mut config = eight_hour_config();
        config.rollover.reset_on_rollover = false;

        let state = AppState::with_store(config, Box::new(store.clone()), t0()).expect("state");
        toggle_phase_impl(&state, t0()).expect("work");
        toggle_phase_impl(&state, t0() + Duration::hours(5)).expect("break");

        let next_day = t0() + Duration::hours(24) + Duration::minutes(30);
        let snapshot = toggle_phase_impl(&state, next_day).expect("new day work");
        assert_eq!(snapshot.status, "work");
        assert_eq!(snapshot.phase_count, 1);
        assert_eq!(snapshot.start_time_ms, Some(next_day.timestamp_millis()));
        assert_eq!(snapshot.debt_ms, -11 * 3_600_000);
    }

    #[test]
    fn reset_discards_history() {
        let state = AppState::with_store(
            eight_hour_config(),
            Box::new(InMemoryTrackerStore::default()),
            t0(),
        )
        .expect("state");
        toggle_phase_impl(&state, t0()).expect("work");
        toggle_phase_impl(&state, t0() + Duration::hours(2)).expect("break");

        let snapshot = reset_day_impl(&state, t0() + Duration::hours(3)).expect("reset");
        assert_eq!(snapshot.status, "idle");
        assert_eq!(snapshot.phase_count, 0);
        assert_eq!(snapshot.debt_ms, -8 * 3_600_000);
    }

    #[test]
    fn toggle_error_leaves_state_untouched() {
        let state = AppState::with_store(
            eight_hour_config(),
            Box::new(InMemoryTrackerStore::default()),
            t0(),
        )
        .expect("state");
        toggle_phase_impl(&state, t0()).expect("work");

        let result = toggle_phase_impl(&state, t0() - Duration::minutes(5));
        assert!(matches!(result, Err(InfraError::Domain(_))));
        let message = state.command_error("toggle_phase", &result.expect_err("error"));
        assert!(message.contains("cannot close Work phase"));

        let snapshot = get_tracker_state_impl(&state, t0() + Duration::minutes(1)).expect("state");
        assert_eq!(snapshot.phase_count, 1);
        assert_eq!(snapshot.status, "work");
    }

    #[test]
    fn poisoned_tracker_lock_is_reported() {
        let state = AppState::with_store(
            eight_hour_config(),
            Box::new(InMemoryTrackerStore::default()),
            t0(),
        )
        .expect("state");
        let poisoned = std::panic::catch_unwind::<_, ()>(AssertUnwindSafe(|| {
            let _guard = state.tracker.lock().expect("lock");
            panic!("panic while holding the tracker");
        }));
        assert!(poisoned.is_err());

        assert!(matches!(
            get_tracker_state_impl(&state, t0()),
            Err(InfraError::LockPoisoned(_))
        ));
    }

    #[test]
    fn snapshot_reports_overtime_once_quota_is_met() {
        let config = AppConfig {
            day_duration_minutes: 60,
            ..AppConfig::default()
        };
        let state = AppState::with_store(config, Box::new(InMemoryTrackerStore::default()), t0())
            .expect("state");
        toggle_phase_impl(&state, t0()).expect("work");

        let snapshot =
            get_tracker_state_impl(&state, t0() + Duration::minutes(90)).expect("state");
        assert_eq!(snapshot.remaining_ms, -30 * 60_000);
        assert_eq!(snapshot.overtime_ms, 30 * 60_000);
        assert_eq!(snapshot.outstanding_debt_ms, 30 * 60_000);
        assert_eq!(snapshot.debt_ms, -3_600_000);
    }
}
