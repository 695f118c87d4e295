pub mod json;
pub mod terminal;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::jobs::sorting::is_eligible;
use crate::jobs::{BrokerJobData, BrokerProfileQueryData, HistoryEventType, ScanType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

/// One row per scan or opt-out job.
#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub broker_id: String,
    pub broker_name: String,
    pub profile_query_id: i64,
    pub profile_name: String,
    pub kind: &'static str,
    /// Extracted profile identifier, for opt-outs.
    pub target: Option<String>,
    pub scan_type: Option<ScanType>,
    pub preferred_run_date: Option<DateTime<Utc>>,
    pub last_run_date: Option<DateTime<Utc>>,
    pub attempt_count: Option<u32>,
    pub last_event: Option<String>,
    pub due: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusSummary {
    pub brokers: usize,
    pub profile_queries: usize,
    pub scan_jobs: usize,
    pub opt_out_jobs: usize,
    pub opt_outs_requested: usize,
    pub opt_outs_confirmed: usize,
    pub removed_by_user: usize,
    pub due_now: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub generated_at: String,
    pub jobs: Vec<JobStatus>,
    pub summary: StatusSummary,
}

impl StatusReport {
    pub fn build(data: &[BrokerProfileQueryData], now: DateTime<Utc>) -> Self {
        let mut jobs = Vec::new();
        let mut summary = StatusSummary::default();

        let mut brokers: Vec<&str> = data.iter().map(|d| d.data_broker.id.as_str()).collect();
        brokers.sort_unstable();
        brokers.dedup();
        summary.brokers = brokers.len();
        let mut queries: Vec<i64> = data.iter().filter_map(|d| d.profile_query_id()).collect();
        queries.sort_unstable();
        queries.dedup();
        summary.profile_queries = queries.len();

        for item in data {
            let schedule = &item.data_broker.scheduling_config;
            let row = |job: BrokerJobData| JobStatus {
                broker_id: item.data_broker.id.clone(),
                broker_name: item.data_broker.name.clone(),
                profile_query_id: job.profile_query_id(),
                profile_name: item.profile_query.full_name(),
                kind: match &job {
                    BrokerJobData::Scan(_) => "scan",
                    BrokerJobData::OptOut(_) => "opt-out",
                },
                target: match &job {
                    BrokerJobData::Scan(_) => None,
                    BrokerJobData::OptOut(o) => Some(o.extracted_profile.identifier.clone()),
                },
                scan_type: match &job {
                    BrokerJobData::Scan(s) => Some(s.scan_type()),
                    BrokerJobData::OptOut(_) => None,
                },
                preferred_run_date: job.preferred_run_date(),
                last_run_date: match &job {
                    BrokerJobData::Scan(s) => s.last_run_date,
                    BrokerJobData::OptOut(o) => o.last_run_date,
                },
                attempt_count: match &job {
                    BrokerJobData::Scan(_) => None,
                    BrokerJobData::OptOut(o) => Some(o.attempt_count),
                },
                last_event: job
                    .history_events()
                    .last()
                    .map(|e| e.event_type.label().to_string()),
                due: !item.profile_query.deprecated
                    && !matches!(&job, BrokerJobData::OptOut(o) if o.is_settled(schedule))
                    && is_eligible(&job, Some(now)),
            };

            if let Some(scan) = &item.scan_job_data {
                summary.scan_jobs += 1;
                jobs.push(row(BrokerJobData::Scan(scan.clone())));
            }
            for opt_out in &item.opt_out_jobs_data {
                summary.opt_out_jobs += 1;
                if opt_out.is_removed_by_user {
                    summary.removed_by_user += 1;
                } else if opt_out.extracted_profile.removed_date.is_some() {
                    summary.opt_outs_confirmed += 1;
                } else if opt_out
                    .history_events
                    .iter()
                    .any(|e| e.event_type == HistoryEventType::OptOutRequested)
                {
                    summary.opt_outs_requested += 1;
                }
                jobs.push(row(BrokerJobData::OptOut(opt_out.clone())));
            }
        }
        summary.due_now = jobs.iter().filter(|j| j.due).count();

        Self {
            generated_at: now.to_rfc3339(),
            jobs,
            summary,
        }
    }

    pub fn render(&self, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Terminal => terminal::render(self),
            ReportFormat::Json => json::render(self),
        }
    }
}
