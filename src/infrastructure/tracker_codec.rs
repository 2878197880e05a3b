use crate::domain::models::{Phase, PhaseType};
use crate::domain::tracker::TimeTracker;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored shape of a tracker slot. Durations and timestamps are integer milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRecord {
    pub storage_key: String,
    pub day_duration: i64,
    pub start_time: Option<i64>,
    pub debt: i64,
    pub phases: Vec<PhaseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseRecord {
    #[serde(rename = "type")]
    pub phase_type: String,
    pub start: i64,
    pub end: Option<i64>,
    pub duration: Option<i64>,
}

pub fn encode_tracker(tracker: &TimeTracker) -> TrackerRecord {
    TrackerRecord {
        storage_key: tracker.storage_key().to_string(),
        day_duration: tracker.day_duration().num_milliseconds(),
        start_time: tracker.start_time().map(|value| value.timestamp_millis()),
        debt: tracker.debt().num_milliseconds(),
        phases: tracker.phases().iter().map(encode_phase).collect(),
    }
}

/// Rebuilds a tracker through the domain constructors. The first bad field, or accounting
/// that cannot be represented, rejects the whole record.
pub fn decode_tracker(record: TrackerRecord) -> Result<TimeTracker, InfraError> {
    let day_duration = parse_duration(record.day_duration, "dayDuration")?;
    let debt = parse_duration(record.debt, "debt")?;
    let start_time = record
        .start_time
        .map(|value| parse_millis(value, "startTime"))
        .transpose()?;

    let phases = record
        .phases
        .into_iter()
        .enumerate()
        .map(|(index, phase)| decode_phase(index, phase))
        .collect::<Result<Vec<_>, _>>()?;

    TimeTracker::restore(record.storage_key, day_duration, start_time, debt, phases)
        .map_err(|error| InfraError::CorruptState(error.to_string()))
}

pub fn serialize_tracker(tracker: &TimeTracker) -> Result<String, InfraError> {
    Ok(serde_json::to_string(&encode_tracker(tracker))?)
}

pub fn deserialize_tracker(raw: &str) -> Result<TimeTracker, InfraError> {
    let record: TrackerRecord = serde_json::from_str(raw)?;
    decode_tracker(record)
}

fn encode_phase(phase: &Phase) -> PhaseRecord {
    PhaseRecord {
        phase_type: phase.phase_type().as_str().to_string(),
        start: phase.start().timestamp_millis(),
        end: phase.end().map(|value| value.timestamp_millis()),
        duration: phase
            .stored_duration()
            .map(|duration| duration.num_milliseconds()),
    }
}

fn decode_phase(index: usize, record: PhaseRecord) -> Result<Phase, InfraError> {
    let phase_type = record.phase_type.parse::<PhaseType>()?;
    let start = parse_millis(record.start, &format!("phases[{index}].start"))?;

    // A running phase's stored duration is stale by definition.
    let Some(end_ms) = record.end else {
        return Ok(Phase::open(phase_type, start));
    };

    let end = parse_millis(end_ms, &format!("phases[{index}].end"))?;
    let phase = Phase::closed(phase_type, start, end)?;
    let derived = phase
        .stored_duration()
        .map(|duration| duration.num_milliseconds());
    if let Some(stored) = record.duration {
        if Some(stored) != derived {
            return Err(InfraError::CorruptState(format!(
                "phases[{index}].duration is {stored} but end - start is {}",
                derived.unwrap_or_default()
            )));
        }
    }
    Ok(phase)
}

fn parse_millis(value: i64, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        InfraError::CorruptState(format!("{field_name} is out of range: {value}"))
    })
}

fn parse_duration(value: i64, field_name: &str) -> Result<Duration, InfraError> {
    Duration::try_milliseconds(value).ok_or_else(|| {
        InfraError::CorruptState(format!("{field_name} is out of range: {value}"))
    })
}
