use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::db::Database;
use crate::jobs::dependencies::{BrokerProfileJobDependencies, LoggingErrorDelegate};
use crate::jobs::events::{EventSink, TracingEventSink};
use crate::jobs::sorting::{JobSortPredicate, JobType, pass_priority_date};
use crate::queue::JobQueueManager;
use crate::runner::ActionRunnerFactory;
use crate::runner::surface::SimulatedSurfaceFactory;

pub struct RunOptions {
    pub job_type: JobType,
    pub broker: Option<String>,
    pub background: bool,
    pub all_dates: bool,
    pub show_web_view: bool,
    pub max_concurrency: Option<usize>,
}

pub async fn run(db: Arc<Database>, settings: &Settings, options: RunOptions) -> anyhow::Result<()> {
    let event_sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let runner_factory = ActionRunnerFactory::new(
        Arc::new(SimulatedSurfaceFactory),
        settings.execution.action_await_time,
        settings.retry_policy.clone(),
        Arc::clone(&event_sink),
    );
    let deps = Arc::new(BrokerProfileJobDependencies {
        repository: db,
        execution_config: settings.execution.clone(),
        event_sink,
        runner_factory: Arc::new(runner_factory),
        sort_predicate: if options.background {
            JobSortPredicate::ByPriorityForBackgroundTask
        } else {
            JobSortPredicate::ByEarliestPreferredRunDateFirst
        },
    });

    let mut manager = JobQueueManager::new(deps, Arc::new(LoggingErrorDelegate));
    if let Some(max) = options.max_concurrency {
        manager = manager.with_max_concurrency(max);
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nStopping after the current jobs...");
                shutdown.cancel();
            }
        })
    };

    let priority_date = pass_priority_date(options.job_type, options.all_dates, Utc::now());

    println!("Running {:?} jobs...", options.job_type);
    let summary = manager
        .run(
            options.job_type,
            priority_date,
            options.show_web_view,
            options.broker.as_deref(),
            shutdown,
        )
        .await;
    ctrl_c.abort();
    let summary = summary?;

    for report in &summary.reports {
        println!(
            "  {:<24} {} run, {} failed{}",
            report.broker_id,
            report.jobs_run,
            report.jobs_failed,
            if report.cancelled { " (cancelled)" } else { "" }
        );
    }
    println!(
        "Pass complete: {} broker(s), {} job(s) run, {} failed.",
        summary.units, summary.jobs_run, summary.jobs_failed
    );
    Ok(())
}
