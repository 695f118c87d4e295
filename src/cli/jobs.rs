use chrono::Utc;
use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::error::AppError;
use crate::jobs::dependencies::BrokerProfileRepository;
use crate::jobs::sorting::{JobSortPredicate, JobType, filter_and_sort_jobs, pass_priority_date};

pub fn list_jobs(
    db: &Database,
    broker_id: &str,
    job_type: JobType,
    predicate: JobSortPredicate,
    all_dates: bool,
) -> anyhow::Result<()> {
    if db.get_broker(broker_id)?.is_none() {
        return Err(AppError::BrokerNotFound(broker_id.to_string()).into());
    }

    let data: Vec<_> = db
        .fetch_all_broker_profile_query_data()?
        .into_iter()
        .filter(|d| d.data_broker.id == broker_id)
        .collect();
    let priority_date = pass_priority_date(job_type, all_dates, Utc::now());
    let jobs = filter_and_sort_jobs(&data, job_type, priority_date, predicate);

    if jobs.is_empty() {
        println!("No eligible jobs for {broker_id}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Job", "Profile", "Preferred Run", "Last Event"]);
    for (i, job) in jobs.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(job.describe()),
            Cell::new(format!("#{}", job.profile_query_id())),
            Cell::new(
                job.preferred_run_date()
                    .map_or_else(|| "-".to_string(), |d| d.to_rfc3339()),
            ),
            Cell::new(
                job.history_events()
                    .last()
                    .map_or("-", |e| e.event_type.label()),
            ),
        ]);
    }
    println!("{table}");
    Ok(())
}
