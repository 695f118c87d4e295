use std::time::Duration;

use serde::Serialize;

/// Lifecycle telemetry emitted while jobs run. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    ScanStarted {
        broker_id: String,
        profile_query_id: i64,
    },
    ScanFinished {
        broker_id: String,
        profile_query_id: i64,
        matches: usize,
        duration: Duration,
    },
    ScanFailed {
        broker_id: String,
        profile_query_id: i64,
        error: String,
        stage: String,
        duration: Duration,
    },
    OptOutStarted {
        broker_id: String,
        extracted_profile_id: i64,
    },
    OptOutRequested {
        broker_id: String,
        extracted_profile_id: i64,
        duration: Duration,
    },
    OptOutFailed {
        broker_id: String,
        extracted_profile_id: i64,
        error: String,
        stage: String,
        duration: Duration,
    },
    ActionRetried {
        broker_id: String,
        action_id: String,
        attempt: u32,
    },
    UnitFinished {
        broker_id: String,
        jobs_run: usize,
        cancelled: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn fire(&self, event: JobEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn fire(&self, event: JobEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "dbp_scheduler::events", "{json}"),
            Err(e) => tracing::warn!("Could not serialize {event:?}: {e}"),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<JobEvent>>,
}

#[cfg(test)]
impl RecordingEventSink {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl EventSink for RecordingEventSink {
    fn fire(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }
}
