use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    "CREATE TABLE IF NOT EXISTS brokers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        version TEXT NOT NULL,
        descriptor_json TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS profile_queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        city TEXT,
        state TEXT,
        birth_year INTEGER,
        deprecated INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS scan_jobs (
        broker_id TEXT NOT NULL REFERENCES brokers(id),
        profile_query_id INTEGER NOT NULL REFERENCES profile_queries(id),
        preferred_run_date TEXT,
        last_run_date TEXT,
        PRIMARY KEY (broker_id, profile_query_id)
    );

    CREATE TABLE IF NOT EXISTS extracted_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        broker_id TEXT NOT NULL REFERENCES brokers(id),
        profile_query_id INTEGER NOT NULL REFERENCES profile_queries(id),
        identifier TEXT NOT NULL,
        profile_json TEXT NOT NULL,
        removed_date TEXT,
        found_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE(broker_id, profile_query_id, identifier)
    );

    CREATE TABLE IF NOT EXISTS opt_out_jobs (
        extracted_profile_id INTEGER PRIMARY KEY REFERENCES extracted_profiles(id),
        broker_id TEXT NOT NULL REFERENCES brokers(id),
        profile_query_id INTEGER NOT NULL REFERENCES profile_queries(id),
        preferred_run_date TEXT,
        last_run_date TEXT,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        removed_by_user INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS history_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        broker_id TEXT NOT NULL REFERENCES brokers(id),
        profile_query_id INTEGER NOT NULL REFERENCES profile_queries(id),
        extracted_profile_id INTEGER REFERENCES extracted_profiles(id),
        event_json TEXT NOT NULL,
        date TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS history_events_by_job
        ON history_events(broker_id, profile_query_id);

    CREATE TABLE IF NOT EXISTS registry_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
];

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")?;

    let current_version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version > current_version {
            conn.execute_batch(sql)?;
            conn.execute("INSERT INTO _migrations (version) VALUES (?1)", [version])?;
            tracing::info!("Applied migration {version}");
        }
    }

    Ok(())
}
