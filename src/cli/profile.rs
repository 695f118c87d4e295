use comfy_table::{Cell, Table};

use crate::broker::ProfileQuery;
use crate::db::Database;

pub fn add_profile(db: &Database, query: &ProfileQuery) -> anyhow::Result<()> {
    let id = db.add_profile_query(query)?;
    let brokers = db.list_brokers()?.len();
    println!(
        "Added profile #{id} ({}), scheduled on {brokers} broker(s).",
        query.full_name()
    );
    Ok(())
}

pub fn list_profiles(db: &Database) -> anyhow::Result<()> {
    let queries = db.list_profile_queries()?;
    if queries.is_empty() {
        println!("No profiles yet. Add one with `dbp-scheduler profile add`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "City", "State", "Born", "Active"]);
    for q in &queries {
        table.add_row(vec![
            Cell::new(q.id.map_or_else(|| "-".to_string(), |id| id.to_string())),
            Cell::new(q.full_name()),
            Cell::new(q.city.as_deref().unwrap_or("-")),
            Cell::new(q.state.as_deref().unwrap_or("-")),
            Cell::new(q.birth_year.map_or_else(|| "-".to_string(), |y| y.to_string())),
            Cell::new(if q.deprecated { "no" } else { "yes" }),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn deprecate_profile(db: &Database, id: i64) -> anyhow::Result<()> {
    db.deprecate_profile_query(id)?;
    println!("Profile #{id} will no longer be scanned.");
    Ok(())
}

pub fn remove_match(db: &Database, extracted_profile_id: i64) -> anyhow::Result<()> {
    db.mark_removed_by_user(extracted_profile_id)?;
    println!("Match #{extracted_profile_id} marked as removed; its opt-out will not run again.");
    Ok(())
}
