//! Job selection, eligibility and ordering for one scheduling pass.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

use super::{BrokerJobData, BrokerProfileQueryData, ScanType};

/// Which jobs a scheduling pass should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    ManualScan,
    ScheduledScan,
    OptOut,
    All,
}

/// Ordering policy applied to the eligible jobs of one broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobSortPredicate {
    #[default]
    ByEarliestPreferredRunDateFirst,
    ByPriorityForBackgroundTask,
}

impl JobSortPredicate {
    /// `true` when `lhs` should run before `rhs`.
    pub fn should_run_first(self, lhs: &BrokerJobData, rhs: &BrokerJobData) -> bool {
        match self {
            JobSortPredicate::ByEarliestPreferredRunDateFirst => {
                by_earliest_preferred_run_date_first(lhs, rhs)
            }
            JobSortPredicate::ByPriorityForBackgroundTask => {
                by_priority_for_background_task(lhs, rhs)
            }
        }
    }

    pub fn ordering(self, lhs: &BrokerJobData, rhs: &BrokerJobData) -> Ordering {
        if self.should_run_first(lhs, rhs) {
            Ordering::Less
        } else if self.should_run_first(rhs, lhs) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Stable sort: jobs the predicate considers equal keep their input order.
    pub fn sort(self, jobs: &mut [BrokerJobData]) {
        jobs.sort_by(|a, b| self.ordering(a, b));
    }
}

/// Dated jobs first, earliest date first; undated jobs keep their relative order.
pub fn by_earliest_preferred_run_date_first(lhs: &BrokerJobData, rhs: &BrokerJobData) -> bool {
    match (lhs.preferred_run_date(), rhs.preferred_run_date()) {
        (Some(l), Some(r)) => l < r,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Lower rank runs first.
pub fn background_task_rank(job: &BrokerJobData) -> u8 {
    match job {
        BrokerJobData::Scan(scan) => match scan.scan_type() {
            ScanType::Initial => 1,
            ScanType::ConfirmOptOut => 3,
            ScanType::Retry => 4,
            ScanType::Maintenance => 5,
            ScanType::Other => 6,
        },
        BrokerJobData::OptOut(_) => 2,
    }
}

pub fn by_priority_for_background_task(lhs: &BrokerJobData, rhs: &BrokerJobData) -> bool {
    let (l_rank, r_rank) = (background_task_rank(lhs), background_task_rank(rhs));
    if l_rank != r_rank {
        return l_rank < r_rank;
    }
    match (lhs, rhs) {
        (BrokerJobData::OptOut(l), BrokerJobData::OptOut(r)) => l.attempt_count < r.attempt_count,
        (BrokerJobData::Scan(_), BrokerJobData::Scan(_)) => {
            by_earliest_preferred_run_date_first(lhs, rhs)
        }
        _ => false,
    }
}

/// Whether a job may run in a pass bounded by `priority_date`.
///
/// Without a priority date every job not removed by the user is eligible.
/// User-removed opt-outs are never eligible.
pub fn is_eligible(job: &BrokerJobData, priority_date: Option<DateTime<Utc>>) -> bool {
    if job.is_removed_by_user() {
        return false;
    }
    let Some(priority_date) = priority_date else {
        return true;
    };
    match job.preferred_run_date() {
        Some(date) => date <= priority_date,
        None => matches!(job, BrokerJobData::OptOut(_)),
    }
}

/// The priority date a pass of `job_type` starting at `now` runs with.
///
/// Manual scans and `all_dates` passes take every job; other passes only take
/// jobs that are due.
pub fn pass_priority_date(
    job_type: JobType,
    all_dates: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    (!all_dates && job_type != JobType::ManualScan).then_some(now)
}

/// Opt-outs that still have something to request.
fn open_opt_outs(data: &BrokerProfileQueryData) -> impl Iterator<Item = BrokerJobData> + '_ {
    data.opt_out_jobs_data
        .iter()
        .filter(|job| !job.is_settled(&data.data_broker.scheduling_config))
        .cloned()
        .map(BrokerJobData::OptOut)
}

/// Collect the jobs a pass of `job_type` should look at.
pub fn select_jobs(data: &[BrokerProfileQueryData], job_type: JobType) -> Vec<BrokerJobData> {
    match job_type {
        JobType::OptOut => data.iter().flat_map(open_opt_outs).collect(),
        JobType::ManualScan | JobType::ScheduledScan => data
            .iter()
            .filter(|d| !d.profile_query.deprecated)
            .filter_map(|d| d.scan_job_data.clone().map(BrokerJobData::Scan))
            .collect(),
        JobType::All => data
            .iter()
            .flat_map(|d| {
                d.scan_job_data
                    .clone()
                    .map(BrokerJobData::Scan)
                    .into_iter()
                    .chain(open_opt_outs(d))
            })
            .collect(),
    }
}

/// Select, filter and order the jobs for one pass. The result is fixed for
/// the whole pass and never re-sorted.
pub fn filter_and_sort_jobs(
    data: &[BrokerProfileQueryData],
    job_type: JobType,
    priority_date: Option<DateTime<Utc>>,
    predicate: JobSortPredicate,
) -> Vec<BrokerJobData> {
    let mut jobs: Vec<_> = select_jobs(data, job_type)
        .into_iter()
        .filter(|job| is_eligible(job, priority_date))
        .collect();
    predicate.sort(&mut jobs);
    jobs
}
