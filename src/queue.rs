//! Fans a scheduling pass out into one execution unit per broker.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::jobs::dependencies::{BrokerProfileJobDependencies, JobErrorDelegate};
use crate::jobs::execution::{BrokerProfileJob, UnitReport};
use crate::jobs::sorting::JobType;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueRunSummary {
    pub units: usize,
    pub finished: usize,
    pub cancelled: usize,
    pub jobs_run: usize,
    pub jobs_failed: usize,
    #[serde(skip)]
    pub reports: Vec<UnitReport>,
}

impl QueueRunSummary {
    fn record(&mut self, report: UnitReport) {
        if report.cancelled {
            self.cancelled += 1;
        } else {
            self.finished += 1;
        }
        self.jobs_run += report.jobs_run;
        self.jobs_failed += report.jobs_failed;
        self.reports.push(report);
    }
}

pub struct JobQueueManager {
    deps: Arc<BrokerProfileJobDependencies>,
    error_delegate: Arc<dyn JobErrorDelegate>,
    max_concurrency: usize,
}

impl JobQueueManager {
    pub fn new(
        deps: Arc<BrokerProfileJobDependencies>,
        error_delegate: Arc<dyn JobErrorDelegate>,
    ) -> Self {
        let max_concurrency = deps.execution_config.max_concurrent_brokers.max(1);
        Self {
            deps,
            error_delegate,
            max_concurrency,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run one pass over every broker, or only `broker_filter` when given.
    ///
    /// Units beyond the concurrency limit wait for a slot; once `shutdown`
    /// fires, waiting units finish without running anything.
    #[tracing::instrument(skip(self, shutdown), fields(max_concurrency = self.max_concurrency))]
    pub async fn run(
        &self,
        job_type: JobType,
        priority_date: Option<DateTime<Utc>>,
        show_web_view: bool,
        broker_filter: Option<&str>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<QueueRunSummary> {
        let broker_ids: BTreeSet<String> = self
            .deps
            .repository
            .fetch_broker_ids()?
            .into_iter()
            .filter(|id| broker_filter.is_none_or(|wanted| wanted == id))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut units = JoinSet::new();
        for broker_id in broker_ids {
            let unit = BrokerProfileJob::new(
                broker_id,
                job_type,
                priority_date,
                show_web_view,
                Arc::clone(&self.error_delegate),
                Arc::clone(&self.deps),
                shutdown.clone(),
            );
            let semaphore = Arc::clone(&semaphore);
            let shutdown = shutdown.clone();
            units.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    () = shutdown.cancelled() => None,
                };
                unit.start().await
            });
        }

        let mut summary = QueueRunSummary {
            units: units.len(),
            ..Default::default()
        };
        while let Some(result) = units.join_next().await {
            match result {
                Ok(report) => summary.record(report),
                Err(e) => tracing::error!("Execution unit aborted: {e}"),
            }
        }
        summary.reports.sort_by(|a, b| a.broker_id.cmp(&b.broker_id));

        tracing::info!(
            units = summary.units,
            cancelled = summary.cancelled,
            jobs_run = summary.jobs_run,
            jobs_failed = summary.jobs_failed,
            "Scheduling pass complete"
        );
        Ok(summary)
    }
}
