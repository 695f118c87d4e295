use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Database;
use super::models::{BrokerRow, HistoryEventRow, OptOutJobRow, ScanJobRow, format_date};
use crate::broker::{DataBroker, ExtractedProfile, ProfileQuery};
use crate::error::AppError;
use crate::jobs::dependencies::BrokerProfileRepository;
use crate::jobs::{BrokerProfileQueryData, HistoryEvent, HistoryEventType};

impl Database {
    // --- Brokers ---

    /// Insert or update a broker and give it a scan job for every active query.
    pub fn upsert_broker(&self, broker: &DataBroker) -> anyhow::Result<()> {
        let descriptor = serde_json::to_string(broker)?;
        let now = format_date(Utc::now());
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO brokers (id, name, url, version, descriptor_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                version = excluded.version,
                descriptor_json = excluded.descriptor_json,
                updated_at = excluded.updated_at",
            params![
                broker.id,
                broker.name,
                broker.url,
                broker.version,
                descriptor,
                now,
            ],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO scan_jobs (broker_id, profile_query_id, preferred_run_date)
             SELECT ?1, id, ?2 FROM profile_queries WHERE deprecated = 0",
            params![broker.id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_broker(&self, id: &str) -> anyhow::Result<Option<DataBroker>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, descriptor_json FROM brokers WHERE id = ?1",
                params![id],
                Self::map_broker_row,
            )
            .optional()?;
        row.map(|r| r.decode()).transpose()
    }

    pub fn list_brokers(&self) -> anyhow::Result<Vec<DataBroker>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, descriptor_json FROM brokers ORDER BY name")?;
        let rows = stmt.query_map([], Self::map_broker_row)?;
        let mut brokers = Vec::new();
        for row in rows {
            brokers.push(row?.decode()?);
        }
        Ok(brokers)
    }

    fn map_broker_row(row: &rusqlite::Row) -> rusqlite::Result<BrokerRow> {
        Ok(BrokerRow {
            id: row.get(0)?,
            descriptor_json: row.get(1)?,
        })
    }

    // --- Profile queries ---

    /// Save a new query and schedule a scan of it on every known broker.
    pub fn add_profile_query(&self, query: &ProfileQuery) -> anyhow::Result<i64> {
        let now = format_date(Utc::now());
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO profile_queries (first_name, last_name, city, state, birth_year, deprecated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                query.first_name,
                query.last_name,
                query.city,
                query.state,
                query.birth_year,
                query.deprecated,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT OR IGNORE INTO scan_jobs (broker_id, profile_query_id, preferred_run_date)
             SELECT id, ?1, ?2 FROM brokers",
            params![id, now],
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn list_profile_queries(&self) -> anyhow::Result<Vec<ProfileQuery>> {
        let conn = self.conn.lock().unwrap();
        let mut queries: Vec<ProfileQuery> = load_profile_queries(&conn, None)?.into_values().collect();
        queries.sort_by_key(|q| q.id);
        Ok(queries)
    }

    pub fn deprecate_profile_query(&self, id: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE profile_queries SET deprecated = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(AppError::ProfileQueryNotFound(id).into());
        }
        Ok(())
    }

    /// Mark a match as removed by the user. Its opt-out job never runs again.
    pub fn mark_removed_by_user(&self, extracted_profile_id: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let job: Option<(String, i64)> = tx
            .query_row(
                "SELECT broker_id, profile_query_id FROM opt_out_jobs WHERE extracted_profile_id = ?1",
                params![extracted_profile_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((broker_id, profile_query_id)) = job else {
            return Err(AppError::ExtractedProfileNotFound(extracted_profile_id).into());
        };
        tx.execute(
            "UPDATE opt_out_jobs SET removed_by_user = 1 WHERE extracted_profile_id = ?1",
            params![extracted_profile_id],
        )?;
        insert_history_event(
            &tx,
            &HistoryEvent::now(
                broker_id,
                profile_query_id,
                Some(extracted_profile_id),
                HistoryEventType::MatchRemovedByUser,
            ),
        )?;
        tx.commit()?;
        Ok(())
    }

    // --- Registry Meta ---

    pub fn set_registry_meta(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO registry_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_registry_meta(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM registry_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn insert_history_event(conn: &Connection, event: &HistoryEvent) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO history_events (broker_id, profile_query_id, extracted_profile_id, event_json, date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.broker_id,
            event.profile_query_id,
            event.extracted_profile_id,
            serde_json::to_string(&event.event_type)?,
            format_date(event.date),
        ],
    )?;
    Ok(())
}

fn load_profile_queries(
    conn: &Connection,
    id: Option<i64>,
) -> anyhow::Result<HashMap<i64, ProfileQuery>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, city, state, birth_year, deprecated
         FROM profile_queries WHERE ?1 IS NULL OR id = ?1",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(ProfileQuery {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            city: row.get(3)?,
            state: row.get(4)?,
            birth_year: row.get(5)?,
            deprecated: row.get(6)?,
        })
    })?;
    let mut queries = HashMap::new();
    for row in rows {
        let query = row?;
        if let Some(id) = query.id {
            queries.insert(id, query);
        }
    }
    Ok(queries)
}

/// Load scan jobs with their opt-outs and history, optionally narrowed to one
/// broker and/or one profile query. Rows come back ordered by query id.
fn load_query_data(
    conn: &Connection,
    broker_id: Option<&str>,
    profile_query_id: Option<i64>,
) -> anyhow::Result<Vec<BrokerProfileQueryData>> {
    let mut brokers = HashMap::new();
    {
        let mut stmt =
            conn.prepare("SELECT id, descriptor_json FROM brokers WHERE ?1 IS NULL OR id = ?1")?;
        let rows = stmt.query_map(params![broker_id], Database::map_broker_row)?;
        for row in rows {
            let broker = row?.decode()?;
            brokers.insert(broker.id.clone(), broker);
        }
    }

    let queries = load_profile_queries(conn, profile_query_id)?;

    let mut history = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT broker_id, profile_query_id, extracted_profile_id, event_json, date
             FROM history_events
             WHERE (?1 IS NULL OR broker_id = ?1) AND (?2 IS NULL OR profile_query_id = ?2)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![broker_id, profile_query_id], |row| {
            Ok(HistoryEventRow {
                broker_id: row.get(0)?,
                profile_query_id: row.get(1)?,
                extracted_profile_id: row.get(2)?,
                event_json: row.get(3)?,
                date: row.get(4)?,
            })
        })?;
        for row in rows {
            history.push(row?.decode()?);
        }
    }

    let mut opt_outs = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT o.extracted_profile_id, o.broker_id, o.profile_query_id, o.preferred_run_date,
                    o.last_run_date, o.attempt_count, o.removed_by_user, e.profile_json, e.removed_date
             FROM opt_out_jobs o
             JOIN extracted_profiles e ON e.id = o.extracted_profile_id
             WHERE (?1 IS NULL OR o.broker_id = ?1) AND (?2 IS NULL OR o.profile_query_id = ?2)
             ORDER BY o.extracted_profile_id",
        )?;
        let rows = stmt.query_map(params![broker_id, profile_query_id], |row| {
            Ok(OptOutJobRow {
                extracted_profile_id: row.get(0)?,
                broker_id: row.get(1)?,
                profile_query_id: row.get(2)?,
                preferred_run_date: row.get(3)?,
                last_run_date: row.get(4)?,
                attempt_count: row.get(5)?,
                removed_by_user: row.get(6)?,
                profile_json: row.get(7)?,
                removed_date: row.get(8)?,
            })
        })?;
        for row in rows {
            opt_outs.push(row?);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT broker_id, profile_query_id, preferred_run_date, last_run_date
         FROM scan_jobs
         WHERE (?1 IS NULL OR broker_id = ?1) AND (?2 IS NULL OR profile_query_id = ?2)
         ORDER BY profile_query_id, broker_id",
    )?;
    let rows = stmt.query_map(params![broker_id, profile_query_id], |row| {
        Ok(ScanJobRow {
            broker_id: row.get(0)?,
            profile_query_id: row.get(1)?,
            preferred_run_date: row.get(2)?,
            last_run_date: row.get(3)?,
        })
    })?;

    let mut result = Vec::new();
    for row in rows {
        let scan = row?;
        let (Some(broker), Some(query)) = (
            brokers.get(&scan.broker_id),
            queries.get(&scan.profile_query_id),
        ) else {
            continue;
        };

        // The scan history covers everything that happened to the pair,
        // opt-out events included.
        let scan_history: Vec<HistoryEvent> = history
            .iter()
            .filter(|e| e.broker_id == scan.broker_id && e.profile_query_id == scan.profile_query_id)
            .cloned()
            .collect();

        let mut opt_out_jobs_data = Vec::new();
        for job in opt_outs
            .iter()
            .filter(|j| j.broker_id == scan.broker_id && j.profile_query_id == scan.profile_query_id)
        {
            let job_history = scan_history
                .iter()
                .filter(|e| e.extracted_profile_id == Some(job.extracted_profile_id))
                .cloned()
                .collect();
            opt_out_jobs_data.push(job.clone().decode(job_history)?);
        }

        result.push(BrokerProfileQueryData {
            data_broker: broker.clone(),
            profile_query: query.clone(),
            scan_job_data: Some(scan.decode(scan_history)?),
            opt_out_jobs_data,
        });
    }
    Ok(result)
}

impl BrokerProfileRepository for Database {
    fn fetch_all_broker_profile_query_data(&self) -> anyhow::Result<Vec<BrokerProfileQueryData>> {
        let conn = self.conn.lock().unwrap();
        load_query_data(&conn, None, None)
    }

    fn fetch_broker_profile_query_data(
        &self,
        broker_id: &str,
        profile_query_id: i64,
    ) -> anyhow::Result<Option<BrokerProfileQueryData>> {
        let conn = self.conn.lock().unwrap();
        Ok(load_query_data(&conn, Some(broker_id), Some(profile_query_id))?
            .into_iter()
            .next())
    }

    fn fetch_broker_ids(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM brokers ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn add_history_event(&self, event: &HistoryEvent) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_history_event(&conn, event)
    }

    fn update_scan_preferred_run_date(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scan_jobs SET preferred_run_date = ?3
             WHERE broker_id = ?1 AND profile_query_id = ?2",
            params![broker_id, profile_query_id, date.map(format_date)],
        )?;
        Ok(())
    }

    fn update_scan_last_run_date(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        date: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scan_jobs SET last_run_date = ?3
             WHERE broker_id = ?1 AND profile_query_id = ?2",
            params![broker_id, profile_query_id, format_date(date)],
        )?;
        Ok(())
    }

    fn update_opt_out_preferred_run_date(
        &self,
        extracted_profile_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE opt_out_jobs SET preferred_run_date = ?2 WHERE extracted_profile_id = ?1",
            params![extracted_profile_id, date.map(format_date)],
        )?;
        Ok(())
    }

    fn update_opt_out_last_run_date(
        &self,
        extracted_profile_id: i64,
        date: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE opt_out_jobs SET last_run_date = ?2 WHERE extracted_profile_id = ?1",
            params![extracted_profile_id, format_date(date)],
        )?;
        Ok(())
    }

    fn increment_opt_out_attempt_count(&self, extracted_profile_id: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE opt_out_jobs SET attempt_count = attempt_count + 1 WHERE extracted_profile_id = ?1",
            params![extracted_profile_id],
        )?;
        Ok(())
    }

    fn save_extracted_profile(
        &self,
        broker_id: &str,
        profile_query_id: i64,
        profile: &ExtractedProfile,
    ) -> anyhow::Result<i64> {
        let profile_json = serde_json::to_string(profile)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO extracted_profiles (broker_id, profile_query_id, identifier, profile_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(broker_id, profile_query_id, identifier) DO UPDATE SET
                profile_json = excluded.profile_json",
            params![broker_id, profile_query_id, profile.identifier, profile_json],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM extracted_profiles
             WHERE broker_id = ?1 AND profile_query_id = ?2 AND identifier = ?3",
            params![broker_id, profile_query_id, profile.identifier],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO opt_out_jobs (extracted_profile_id, broker_id, profile_query_id)
             VALUES (?1, ?2, ?3)",
            params![id, broker_id, profile_query_id],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn update_removed_date(
        &self,
        extracted_profile_id: i64,
        date: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE extracted_profiles SET removed_date = ?2 WHERE id = ?1",
            params![extracted_profile_id, date.map(format_date)],
        )?;
        Ok(())
    }
}
