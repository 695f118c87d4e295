use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};

use super::StatusReport;

fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn render(report: &StatusReport) -> anyhow::Result<String> {
    let mut output = String::new();
    let summary = &report.summary;

    output.push_str(&format!(
        "=== Job Status ({}) ===\n\n",
        report.generated_at
    ));

    output.push_str("--- Summary ---\n");
    output.push_str(&format!("Brokers:              {}\n", summary.brokers));
    output.push_str(&format!("Profile queries:      {}\n", summary.profile_queries));
    output.push_str(&format!("Scan jobs:            {}\n", summary.scan_jobs));
    output.push_str(&format!("Opt-out jobs:         {}\n", summary.opt_out_jobs));
    output.push_str(&format!("  Requested:          {}\n", summary.opt_outs_requested));
    output.push_str(&format!("  Confirmed:          {}\n", summary.opt_outs_confirmed));
    output.push_str(&format!("  Removed by user:    {}\n", summary.removed_by_user));
    output.push_str(&format!("Due now:              {}\n", summary.due_now));

    if !report.jobs.is_empty() {
        output.push_str("\n--- Jobs ---\n");
        let mut table = Table::new();
        table.set_header(vec![
            "Broker", "Profile", "Job", "Target", "Attempts", "Next Run", "Last Run", "Last Event",
        ]);
        for job in &report.jobs {
            let kind = match job.scan_type {
                Some(scan_type) => format!("{} ({scan_type:?})", job.kind),
                None => job.kind.to_string(),
            };
            table.add_row(vec![
                Cell::new(&job.broker_name),
                Cell::new(format!("#{} {}", job.profile_query_id, job.profile_name)),
                Cell::new(if job.due { format!("{kind} *") } else { kind }),
                Cell::new(job.target.as_deref().unwrap_or("-")),
                Cell::new(
                    job.attempt_count
                        .map_or_else(|| "-".to_string(), |n| n.to_string()),
                ),
                Cell::new(date(job.preferred_run_date)),
                Cell::new(date(job.last_run_date)),
                Cell::new(job.last_event.as_deref().unwrap_or("-")),
            ]);
        }
        output.push_str(&table.to_string());
        output.push_str("\n* due now\n");
    }

    Ok(output)
}
