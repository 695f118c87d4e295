use std::path::Path;

use crate::broker::DataBroker;
use crate::db::Database;

pub async fn update_registry(db: &Database, url: &str) -> anyhow::Result<()> {
    println!("Fetching broker registry...");
    let brokers = crate::broker::registry::fetch_registry(url).await?;
    store(db, brokers, url)
}

pub fn import_registry(db: &Database, path: &Path) -> anyhow::Result<()> {
    let brokers = crate::broker::registry::load_registry_file(path)?;
    store(db, brokers, &path.display().to_string())
}

fn store(db: &Database, brokers: Vec<DataBroker>, source: &str) -> anyhow::Result<()> {
    let count = brokers.len();
    for broker in brokers {
        db.upsert_broker(&broker)?;
    }

    let now = chrono::Utc::now().to_rfc3339();
    db.set_registry_meta("last_fetched_at", &now)?;
    db.set_registry_meta("source", source)?;

    println!("Registry updated: {count} broker(s) synced.");
    Ok(())
}

pub fn registry_info(db: &Database) -> anyhow::Result<()> {
    let last_fetched = db.get_registry_meta("last_fetched_at")?;
    let source = db.get_registry_meta("source")?;
    let broker_count = db.list_brokers()?.len();

    match last_fetched {
        Some(ts) => println!("Last updated:  {ts}"),
        None => println!("Last updated:  never (run `dbp-scheduler registry update`)"),
    }
    if let Some(source) = source {
        println!("Source:        {source}");
    }
    println!("Brokers known: {broker_count}");
    Ok(())
}
