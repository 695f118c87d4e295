use std::path::Path;

use chrono::Utc;

use crate::db::Database;
use crate::jobs::dependencies::BrokerProfileRepository;
use crate::report::{ReportFormat, StatusReport};

pub fn status(db: &Database, format: ReportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let data = db.fetch_all_broker_profile_query_data()?;
    if data.is_empty() && format == ReportFormat::Terminal {
        println!("No jobs yet. Import brokers and add a profile first.");
        return Ok(());
    }

    let rendered = StatusReport::build(&data, Utc::now()).render(format)?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            println!("Status written to {}", path.display());
        }
        None => {
            println!("{rendered}");
        }
    }

    Ok(())
}
