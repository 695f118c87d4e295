mod broker;
mod cli;
mod config;
mod db;
mod error;
mod jobs;
mod queue;
mod report;
mod runner;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, ProfileCommand, RegistryCommand};

use crate::broker::ProfileQuery;
use crate::config::Settings;
use crate::jobs::sorting::JobSortPredicate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let settings = Settings::load(&config_path)?;

    // Open database
    let db_path = config::db_path()?;
    let db = Arc::new(db::Database::open(&db_path)?);

    match cli.command {
        Command::Registry { command } => match command {
            RegistryCommand::Update => {
                cli::registry::update_registry(&db, &settings.registry_url).await?
            }
            RegistryCommand::Import { file } => cli::registry::import_registry(&db, &file)?,
            RegistryCommand::Info => cli::registry::registry_info(&db)?,
        },
        Command::Profile { command } => match command {
            ProfileCommand::Add {
                first_name,
                last_name,
                city,
                state,
                birth_year,
            } => {
                let query = ProfileQuery {
                    id: None,
                    first_name,
                    last_name,
                    city,
                    state,
                    birth_year,
                    deprecated: false,
                };
                cli::profile::add_profile(&db, &query)?;
            }
            ProfileCommand::List => cli::profile::list_profiles(&db)?,
            ProfileCommand::Deprecate { id } => cli::profile::deprecate_profile(&db, id)?,
            ProfileCommand::RemoveMatch {
                extracted_profile_id,
            } => cli::profile::remove_match(&db, extracted_profile_id)?,
        },
        Command::Jobs {
            broker,
            job_type,
            background,
            all_dates,
        } => {
            let predicate = if background {
                JobSortPredicate::ByPriorityForBackgroundTask
            } else {
                JobSortPredicate::ByEarliestPreferredRunDateFirst
            };
            cli::jobs::list_jobs(&db, &broker, job_type, predicate, all_dates)?;
        }
        Command::Run {
            job_type,
            broker,
            background,
            all_dates,
            show_web_view,
            max_concurrency,
        } => {
            let options = cli::run::RunOptions {
                job_type,
                broker,
                background,
                all_dates,
                show_web_view,
                max_concurrency,
            };
            cli::run::run(db, &settings, options).await?;
        }
        Command::Status { format, output } => {
            cli::status::status(&db, format, output.as_deref())?;
        }
    }

    Ok(())
}
