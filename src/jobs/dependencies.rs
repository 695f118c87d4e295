//! Capabilities injected into every execution unit.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::events::EventSink;
use super::sorting::JobSortPredicate;
use super::{BrokerProfileQueryData, HistoryEvent};
use crate::broker::ExtractedProfile;
use crate::config::ExecutionConfig;
use crate::error::JobError;
use crate::runner::BrokerJobRunner;
use crate::runner::stage::StageTracker;

/// Storage for brokers, profile queries and their jobs.
///
/// Implementations must be safe to call from several units at once.
pub trait BrokerProfileRepository: Send + Sync {
    fn fetch_all_broker_profile_query_data(&self) -> anyhow::Result<Vec<BrokerProfileQueryData>>;

    fn fetch_broker_profile_query_data(
        &self,
        broker_id: &str,
        profile_query_id: i64,
    ) -> anyhow::Result<Option<BrokerProfileQueryData>>;

    fn fetch_broker_ids(&self) -> anyhow::Result<Vec<String>>;

    fn add_history_event(&self, event: &HistoryEvent) -> anyhow::Result<()>;

    fn update_scan_preferred_run_date(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    fn update_scan_last_run_date(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        date: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    fn update_opt_out_preferred_run_date(
        &self,
        extracted_profile_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    fn update_opt_out_last_run_date(
        &self,
        extracted_profile_id: i64,
        date: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    fn increment_opt_out_attempt_count(&self, extracted_profile_id: i64) -> anyhow::Result<()>;

    /// Persist a newly found profile together with its opt-out job.
    fn save_extracted_profile(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        profile: &ExtractedProfile,
    ) -> anyhow::Result<i64>;

    /// Set or clear the removal date of an extracted profile.
    fn update_removed_date(
        &self,
        extracted_profile_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;
}

/// Receives per-job failures. The unit never waits on it.
pub trait JobErrorDelegate: Send + Sync {
    fn data_broker_operation_did_error(
        &self,
        error: &JobError,
        broker_name: Option<&str>,
        broker_version: Option<&str>,
    );
}

#[derive(Debug, Default)]
pub struct LoggingErrorDelegate;

impl JobErrorDelegate for LoggingErrorDelegate {
    fn data_broker_operation_did_error(
        &self,
        error: &JobError,
        broker_name: Option<&str>,
        broker_version: Option<&str>,
    ) {
        tracing::error!(
            kind = error.kind(),
            broker = broker_name.unwrap_or("-"),
            version = broker_version.unwrap_or("-"),
            "Broker job failed: {error}"
        );
    }
}

pub trait SubJobRunnerFactory: Send + Sync {
    fn make_runner(
        &self,
        query_data: &BrokerProfileQueryData,
        stage: StageTracker,
    ) -> Box<dyn BrokerJobRunner>;
}

/// Built once per process and shared read-only by every execution unit.
#[derive(Clone)]
pub struct BrokerProfileJobDependencies {
    pub repository: Arc<dyn BrokerProfileRepository>,
    pub execution_config: ExecutionConfig,
    pub event_sink: Arc<dyn EventSink>,
    pub runner_factory: Arc<dyn SubJobRunnerFactory>,
    pub sort_predicate: JobSortPredicate,
}

impl BrokerProfileJobDependencies {
    pub fn make_runner(
        &self,
        query_data: &BrokerProfileQueryData,
        stage: StageTracker,
    ) -> Box<dyn BrokerJobRunner> {
        self.runner_factory.make_runner(query_data, stage)
    }
}
