use crate::application::commands::{AppState, TrackerStateResponse, get_tracker_state_impl};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Calls `on_tick` with a fresh snapshot every `interval` until `max_ticks`
/// is reached (or forever). Ticks only read the tracker.
pub async fn run_refresh_loop<F>(
    state: &AppState,
    interval: Duration,
    max_ticks: Option<u64>,
    mut on_tick: F,
) -> Result<u64, InfraError>
where
    F: FnMut(&TrackerStateResponse) -> Result<(), InfraError>,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        ticker.tick().await;
        let snapshot = get_tracker_state_impl(state, Utc::now())?;
        on_tick(&snapshot)?;

        ticks = ticks.saturating_add(1);
        if max_ticks.is_some_and(|max| ticks >= max) {
            return Ok(ticks);
        }
    }
}
