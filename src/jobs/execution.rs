//! The execution unit: runs every eligible job of one broker, one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::cancellation::JobCancellation;
use super::dependencies::{BrokerProfileJobDependencies, JobErrorDelegate};
use super::events::JobEvent;
use super::sorting::{JobType, filter_and_sort_jobs};
use super::sub_jobs::{
    SubJobOutcome, record_opt_out_error, record_scan_error, run_opt_out_job, run_scan_job,
};
use super::{BrokerJobData, BrokerProfileQueryData};
use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Executing = 1,
    Finished = 2,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Executing,
            _ => JobState::Finished,
        }
    }
}

/// What a unit did during its pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub broker_id: String,
    pub jobs_run: usize,
    pub jobs_failed: usize,
    pub cancelled: bool,
}

/// Runs all eligible jobs for one broker in priority order.
///
/// Single use: `Pending -> Executing -> Finished`, or straight to `Finished`
/// when cancelled before it starts.
pub struct BrokerProfileJob {
    broker_id: String,
    job_type: JobType,
    priority_date: Option<DateTime<Utc>>,
    show_web_view: bool,
    error_delegate: Arc<dyn JobErrorDelegate>,
    deps: Arc<BrokerProfileJobDependencies>,
    cancellation: JobCancellation,
    state: AtomicU8,
    run_id: Uuid,
}

impl BrokerProfileJob {
    pub fn new(
        broker_id: impl Into<String>,
        job_type: JobType,
        priority_date: Option<DateTime<Utc>>,
        show_web_view: bool,
        error_delegate: Arc<dyn JobErrorDelegate>,
        deps: Arc<BrokerProfileJobDependencies>,
        ambient: CancellationToken,
    ) -> Self {
        Self {
            broker_id: broker_id.into(),
            job_type,
            priority_date,
            show_web_view,
            error_delegate,
            deps,
            cancellation: JobCancellation::new(ambient),
            state: AtomicU8::new(JobState::Pending as u8),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A handle that cancels this unit from elsewhere.
    pub fn cancellation(&self) -> JobCancellation {
        self.cancellation.clone()
    }

    /// Run the pass. Per-job failures go to the error delegate; this never fails.
    #[tracing::instrument(skip(self), fields(broker_id = %self.broker_id, run_id = %self.run_id))]
    pub async fn start(&self) -> UnitReport {
        let mut report = UnitReport {
            broker_id: self.broker_id.clone(),
            ..Default::default()
        };

        if self.is_cancelled() {
            report.cancelled = true;
            self.finish(&report);
            return report;
        }
        if self
            .state
            .compare_exchange(
                JobState::Pending as u8,
                JobState::Executing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!("Unit already started, ignoring");
            return report;
        }

        self.execute(&mut report).await;
        report.cancelled = self.is_cancelled();
        self.finish(&report);
        report
    }

    /// Mark the unit finished. Returns `false` if it already was.
    pub fn finish(&self, report: &UnitReport) -> bool {
        let previous = self.state.swap(JobState::Finished as u8, Ordering::SeqCst);
        if JobState::from_u8(previous) == JobState::Finished {
            return false;
        }
        tracing::info!(
            "Finished: {} job(s) run, {} failed{}",
            report.jobs_run,
            report.jobs_failed,
            if report.cancelled { ", cancelled" } else { "" }
        );
        self.deps.event_sink.fire(JobEvent::UnitFinished {
            broker_id: self.broker_id.clone(),
            jobs_run: report.jobs_run,
            cancelled: report.cancelled,
        });
        true
    }

    async fn execute(&self, report: &mut UnitReport) {
        let repo = self.deps.repository.as_ref();

        let all_data = match repo.fetch_all_broker_profile_query_data() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Could not load broker profile data: {e:#}");
                return;
            }
        };
        let broker_data: Vec<_> = all_data
            .into_iter()
            .filter(|d| d.data_broker.id == self.broker_id)
            .collect();

        let jobs = filter_and_sort_jobs(
            &broker_data,
            self.job_type,
            self.priority_date,
            self.deps.sort_predicate,
        );
        tracing::info!("{} eligible {:?} job(s)", jobs.len(), self.job_type);

        let interval = self.deps.execution_config.interval_between_same_broker_jobs;
        for (index, job) in jobs.iter().enumerate() {
            if self.is_cancelled() {
                tracing::info!("Cancelled with {} job(s) left", jobs.len() - index);
                break;
            }

            let query_data = match repo
                .fetch_broker_profile_query_data(&self.broker_id, job.profile_query_id())
            {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::debug!(
                        "Profile query {} vanished, skipping",
                        job.profile_query_id()
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not reload profile query {}: {e:#}",
                        job.profile_query_id()
                    );
                    continue;
                }
            };

            let Some(outcome) = self.run_job(job, &query_data).await else {
                continue;
            };
            match outcome {
                Ok(SubJobOutcome::Skipped) => continue,
                Ok(SubJobOutcome::Completed) => report.jobs_run += 1,
                Err(error) => {
                    report.jobs_run += 1;
                    report.jobs_failed += 1;
                    self.error_delegate.data_broker_operation_did_error(
                        &error,
                        Some(&query_data.data_broker.name),
                        Some(&query_data.data_broker.version),
                    );
                }
            }

            if index + 1 < jobs.len() {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.cancellation.cancelled() => {}
                }
            }
        }
    }

    /// `None` when the job no longer exists in the fresh data.
    async fn run_job(
        &self,
        job: &BrokerJobData,
        query_data: &BrokerProfileQueryData,
    ) -> Option<Result<SubJobOutcome, JobError>> {
        let config = &self.deps.execution_config;
        tracing::debug!("Running {}", job.describe());

        match job {
            BrokerJobData::Scan(_) => {
                let limit = config.scan_job_timeout;
                let run = run_scan_job(
                    query_data,
                    &self.deps,
                    self.show_web_view,
                    &self.cancellation,
                );
                Some(match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = JobError::Timeout(limit);
                        record_scan_error(&self.deps, query_data, &error);
                        Err(error)
                    }
                })
            }
            BrokerJobData::OptOut(listed) => {
                let current = query_data
                    .opt_out_jobs_data
                    .iter()
                    .find(|j| j.extracted_profile_id() == listed.extracted_profile_id())?;
                let limit = config.opt_out_job_timeout;
                let run = run_opt_out_job(
                    query_data,
                    current,
                    &self.deps,
                    self.show_web_view,
                    &self.cancellation,
                );
                Some(match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = JobError::Timeout(limit);
                        record_opt_out_error(&self.deps, query_data, current, &error);
                        Err(error)
                    }
                })
            }
        }
    }
}
