use crate::application::commands::{PhaseResponse, TrackerStateResponse};
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt::{Display, Write as _};

/// `HH:MM:SS`, prefixed with `-` for negative values. Hours are not wrapped at 24.
pub fn format_duration(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total_seconds = ms.unsigned_abs() / 1_000;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
}

/// Wall-clock `HH:MM:SS` in `timezone`, or in the local zone when none is configured.
pub fn format_timestamp(ms: i64, timezone: Option<Tz>) -> String {
    let Some(instant) = DateTime::<Utc>::from_timestamp_millis(ms) else {
        return "--:--:--".to_string();
    };
    match timezone {
        Some(zone) => instant.with_timezone(&zone).format("%H:%M:%S").to_string(),
        None => instant.with_timezone(&Local).format("%H:%M:%S").to_string(),
    }
}

/// Like [`format_timestamp`], but prefixed with the date when `ms` falls on a
/// different calendar day than `now_ms`.
pub fn format_leave_time(ms: i64, now_ms: i64, timezone: Option<Tz>) -> String {
    let (Some(instant), Some(now)) = (
        DateTime::<Utc>::from_timestamp_millis(ms),
        DateTime::<Utc>::from_timestamp_millis(now_ms),
    ) else {
        return "--:--:--".to_string();
    };
    match timezone {
        Some(zone) => format_against(instant.with_timezone(&zone), now.with_timezone(&zone)),
        None => format_against(instant.with_timezone(&Local), now.with_timezone(&Local)),
    }
}

fn format_against<Z>(instant: DateTime<Z>, now: DateTime<Z>) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let pattern = if instant.date_naive() == now.date_naive() {
        "%H:%M:%S"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };
    instant.format(pattern).to_string()
}

pub fn render_status(state: &TrackerStateResponse, timezone: Option<Tz>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "status:   {}", status_label(state));
    let _ = writeln!(out, "worked:   {}", format_duration(state.worked_ms));
    let _ = writeln!(out, "breaks:   {}", format_duration(state.break_ms));
    if state.remaining_ms < 0 {
        let _ = writeln!(
            out,
            "quota reached, overtime {}",
            format_duration(state.overtime_ms)
        );
    } else {
        let _ = writeln!(out, "left:     {}", format_duration(state.remaining_ms));
    }
    let _ = write!(
        out,
        "leave at: {}",
        format_leave_time(state.time_to_leave_ms, state.now_ms, timezone)
    );
    out
}

pub fn render_phases(phases: &[PhaseResponse], timezone: Option<Tz>) -> String {
    if phases.is_empty() {
        return "no phases recorded today".to_string();
    }

    phases
        .iter()
        .map(|phase| {
            let end = match phase.end_ms {
                Some(end) => format_timestamp(end, timezone),
                None => "running ".to_string(),
            };
            format!(
                "{} {:<5} {} - {} {} ({})",
                phase.emoji,
                phase.phase_type,
                format_timestamp(phase.start_ms, timezone),
                end,
                format_duration(phase.duration_ms),
                phase.category
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-line form redrawn by `watch`.
pub fn render_watch_line(state: &TrackerStateResponse, timezone: Option<Tz>) -> String {
    let remaining = if state.remaining_ms < 0 {
        format!("+{}", format_duration(state.overtime_ms))
    } else {
        format_duration(state.remaining_ms)
    };
    format!(
        "{} | worked {} | left {} | leave {}",
        status_label(state),
        format_duration(state.worked_ms),
        remaining,
        format_leave_time(state.time_to_leave_ms, state.now_ms, timezone)
    )
}

fn status_label(state: &TrackerStateResponse) -> String {
    match &state.current_phase {
        Some(phase) => format!("{} {}", phase.emoji, state.status),
        None => state.status.clone(),
    }
}
