//! Job data model for broker scans and opt-outs.
//!
//! A scan job exists for every (broker, profile query) pair; an opt-out job
//! exists for every profile a scan has extracted. Both carry an append-only
//! history log and an optional preferred run date.

pub mod cancellation;
pub mod dependencies;
pub mod events;
pub mod execution;
pub mod sorting;
pub mod sub_jobs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::{DataBroker, ExtractedProfile, ProfileQuery, SchedulingConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum HistoryEventType {
    ScanStarted,
    NoMatchFound,
    MatchesFound { count: usize },
    Error { kind: String, message: String },
    OptOutStarted,
    OptOutRequested,
    OptOutConfirmed,
    MatchRemovedByUser,
    ReAppearance,
}

impl HistoryEventType {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryEventType::ScanStarted => "scan started",
            HistoryEventType::NoMatchFound => "no match found",
            HistoryEventType::MatchesFound { .. } => "matches found",
            HistoryEventType::Error { .. } => "error",
            HistoryEventType::OptOutStarted => "opt-out started",
            HistoryEventType::OptOutRequested => "opt-out requested",
            HistoryEventType::OptOutConfirmed => "opt-out confirmed",
            HistoryEventType::MatchRemovedByUser => "removed by user",
            HistoryEventType::ReAppearance => "reappeared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub broker_id: String,
    pub profile_query_id: i64,
    /// Set for events that belong to an opt-out job.
    pub extracted_profile_id: Option<i64>,
    pub event_type: HistoryEventType,
    pub date: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn now(
        broker_id: impl Into<String>,
        profile_query_id: i64,
        extracted_profile_id: Option<i64>,
        event_type: HistoryEventType,
    ) -> Self {
        Self {
            broker_id: broker_id.into(),
            profile_query_id,
            extracted_profile_id,
            event_type,
            date: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanType {
    Initial,
    ConfirmOptOut,
    Retry,
    Maintenance,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanJobData {
    pub broker_id: String,
    pub profile_query_id: i64,
    pub preferred_run_date: Option<DateTime<Utc>>,
    pub history_events: Vec<HistoryEvent>,
    pub last_run_date: Option<DateTime<Utc>>,
}

impl ScanJobData {
    /// Classify the scan from its most recent history event.
    ///
    /// Always derived on read, never stored: the history keeps growing.
    pub fn scan_type(&self) -> ScanType {
        let Some(last) = self.history_events.last() else {
            return ScanType::Initial;
        };
        match last.event_type {
            HistoryEventType::NoMatchFound
            | HistoryEventType::MatchesFound { .. }
            | HistoryEventType::ReAppearance => ScanType::Maintenance,
            HistoryEventType::Error { .. } => ScanType::Retry,
            HistoryEventType::OptOutRequested | HistoryEventType::OptOutConfirmed => {
                ScanType::ConfirmOptOut
            }
            HistoryEventType::ScanStarted
            | HistoryEventType::OptOutStarted
            | HistoryEventType::MatchRemovedByUser => ScanType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptOutJobData {
    pub broker_id: String,
    pub profile_query_id: i64,
    pub preferred_run_date: Option<DateTime<Utc>>,
    pub history_events: Vec<HistoryEvent>,
    pub last_run_date: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub extracted_profile: ExtractedProfile,
    pub is_removed_by_user: bool,
}

impl OptOutJobData {
    pub fn extracted_profile_id(&self) -> Option<i64> {
        self.extracted_profile.id
    }

    /// Nothing left to request: the listing is gone, the user removed it, or
    /// the broker's attempt limit is reached.
    pub fn is_settled(&self, schedule: &SchedulingConfig) -> bool {
        self.is_removed_by_user
            || self.extracted_profile.removed_date.is_some()
            || schedule
                .max_attempts
                .is_some_and(|max| self.attempt_count >= max)
    }
}

/// A schedulable job: either a scan or an opt-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BrokerJobData {
    Scan(ScanJobData),
    OptOut(OptOutJobData),
}

impl BrokerJobData {
    pub fn broker_id(&self) -> &str {
        match self {
            BrokerJobData::Scan(job) => &job.broker_id,
            BrokerJobData::OptOut(job) => &job.broker_id,
        }
    }

    pub fn profile_query_id(&self) -> i64 {
        match self {
            BrokerJobData::Scan(job) => job.profile_query_id,
            BrokerJobData::OptOut(job) => job.profile_query_id,
        }
    }

    pub fn preferred_run_date(&self) -> Option<DateTime<Utc>> {
        match self {
            BrokerJobData::Scan(job) => job.preferred_run_date,
            BrokerJobData::OptOut(job) => job.preferred_run_date,
        }
    }

    pub fn history_events(&self) -> &[HistoryEvent] {
        match self {
            BrokerJobData::Scan(job) => &job.history_events,
            BrokerJobData::OptOut(job) => &job.history_events,
        }
    }

    /// Scans are never removed by the user.
    pub fn is_removed_by_user(&self) -> bool {
        match self {
            BrokerJobData::Scan(_) => false,
            BrokerJobData::OptOut(job) => job.is_removed_by_user,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BrokerJobData::Scan(job) => format!("scan ({:?})", job.scan_type()),
            BrokerJobData::OptOut(job) => format!(
                "opt-out of {} (attempt {})",
                job.extracted_profile.identifier,
                job.attempt_count + 1
            ),
        }
    }
}

/// Everything known about one profile query on one broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerProfileQueryData {
    pub data_broker: DataBroker,
    pub profile_query: ProfileQuery,
    pub scan_job_data: Option<ScanJobData>,
    pub opt_out_jobs_data: Vec<OptOutJobData>,
}

impl BrokerProfileQueryData {
    pub fn profile_query_id(&self) -> Option<i64> {
        self.profile_query.id
    }

    pub fn extracted_profiles(&self) -> impl Iterator<Item = &ExtractedProfile> {
        self.opt_out_jobs_data.iter().map(|j| &j.extracted_profile)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::broker::{Action, ActionType, SchedulingConfig, Step, StepType};

    pub fn broker(id: &str) -> DataBroker {
        DataBroker {
            id: id.into(),
            name: format!("Broker {id}"),
            url: format!("https://{id}.example.com"),
            version: "1.0.0".into(),
            steps: vec![
                Step {
                    step_type: StepType::Scan,
                    actions: vec![
                        Action {
                            id: "nav".into(),
                            action_type: ActionType::Navigate,
                            payload: serde_json::Value::Null,
                        },
                        Action {
                            id: "extract".into(),
                            action_type: ActionType::Extract,
                            payload: serde_json::Value::Null,
                        },
                    ],
                },
                Step {
                    step_type: StepType::OptOut,
                    actions: vec![Action {
                        id: "submit".into(),
                        action_type: ActionType::Click,
                        payload: serde_json::Value::Null,
                    }],
                },
            ],
            scheduling_config: SchedulingConfig::default(),
        }
    }

    pub fn query(id: i64) -> ProfileQuery {
        ProfileQuery {
            id: Some(id),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            city: Some("Austin".into()),
            state: Some("TX".into()),
            birth_year: Some(1980),
            deprecated: false,
        }
    }

    pub fn profile(id: i64, identifier: &str) -> ExtractedProfile {
        ExtractedProfile {
            id: Some(id),
            name: Some("Jane Smith".into()),
            age: Some(44),
            addresses: vec!["Austin, TX".into()],
            relatives: vec![],
            profile_url: None,
            identifier: identifier.into(),
            removed_date: None,
        }
    }

    pub fn event(event_type: HistoryEventType) -> HistoryEvent {
        HistoryEvent::now("b", 1, None, event_type)
    }

    pub fn scan(
        query_id: i64,
        date: Option<DateTime<Utc>>,
        events: Vec<HistoryEventType>,
    ) -> BrokerJobData {
        BrokerJobData::Scan(ScanJobData {
            broker_id: "b".into(),
            profile_query_id: query_id,
            preferred_run_date: date,
            history_events: events.into_iter().map(event).collect(),
            last_run_date: None,
        })
    }

    pub fn opt_out(
        query_id: i64,
        date: Option<DateTime<Utc>>,
        attempts: u32,
        removed: bool,
    ) -> BrokerJobData {
        BrokerJobData::OptOut(OptOutJobData {
            broker_id: "b".into(),
            profile_query_id: query_id,
            preferred_run_date: date,
            history_events: vec![],
            last_run_date: None,
            attempt_count: attempts,
            extracted_profile: profile(query_id * 100 + attempts as i64, "p"),
            is_removed_by_user: removed,
        })
    }
}
