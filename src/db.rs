use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RosterConfig;
use crate::matcher::RosterEntry;
use crate::sheet::RosterSheetEntry;

// ============================================================================
// STORE STATUS
// ============================================================================

/// Contract status of a store, as written on the agency roster sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreStatus {
    /// 継続
    Continuing,
    /// 新規
    New,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Continuing => "継続",
            StoreStatus::New => "新規",
        }
    }

    pub fn parse(s: &str) -> Option<StoreStatus> {
        match s.trim() {
            "継続" => Some(StoreStatus::Continuing),
            "新規" => Some(StoreStatus::New),
            _ => None,
        }
    }
}

impl ToSql for StoreStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StoreStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        StoreStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown store status: {}", s).into()))
    }
}

// ============================================================================
// RUN STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

impl ToSql for RunStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RunStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => Err(FromSqlError::Other(format!("unknown run status: {}", other).into())),
        }
    }
}

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Persisted store identity. The name is only unique within its agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRow {
    pub id: i64,
    pub agency_id: i64,
    pub name: String,
    pub status: StoreStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl RosterEntry for StoreRow {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    pub id: i64,
    pub store_id: i64,
    pub rank_date: NaiveDate,
    pub rank_value: Option<f64>,
    pub fetched_at: String,
}

/// One reconciliation run, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLog {
    pub id: i64,
    pub run_id: String,
    pub fetched_at: DateTime<Utc>,
    pub status: RunStatus,
    pub stores_updated: i64,
    pub error_message: Option<String>,
}

// ============================================================================
// DATABASE HANDLE
// ============================================================================

/// Owned SQLite handle. Opened explicitly, passed explicitly, closed explicitly.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "database opened");

        Ok(Database { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Database { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Close the connection, surfacing any error SQLite reports on close
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL so the read path never blocks on a running update
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS stores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agency_id INTEGER NOT NULL REFERENCES agencies(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('継続', '新規')),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(agency_id, name)
        );

        CREATE TABLE IF NOT EXISTS rankings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store_id INTEGER NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
            rank_date TEXT NOT NULL,
            rank_value REAL,
            fetched_at TEXT DEFAULT (datetime('now')),
            UNIQUE(store_id, rank_date)
        );

        CREATE TABLE IF NOT EXISTS fetch_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'error')),
            stores_updated INTEGER NOT NULL DEFAULT 0,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_rankings_store_date ON rankings(store_id, rank_date DESC);
        CREATE INDEX IF NOT EXISTS idx_stores_agency ON stores(agency_id);
        CREATE INDEX IF NOT EXISTS idx_fetch_logs_fetched_at ON fetch_logs(fetched_at);",
    )?;

    Ok(())
}

/// Schema plus roster seed on first use. Returns true when the roster was seeded.
pub fn init_database(conn: &mut Connection, roster: &RosterConfig) -> Result<bool> {
    setup_database(conn)?;

    let agencies: i64 = conn.query_row("SELECT COUNT(*) FROM agencies", [], |row| row.get(0))?;
    if agencies > 0 {
        return Ok(false);
    }

    let stores = seed_roster(conn, roster)?;
    info!(agencies = roster.agencies.len(), stores, "seeded roster");
    Ok(true)
}

// ============================================================================
// ROSTER
// ============================================================================

/// Insert every configured agency and store (status 継続) in one transaction.
/// Existing rows are left alone. Returns the number of stores inserted.
pub fn seed_roster(conn: &mut Connection, roster: &RosterConfig) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;

    for agency in &roster.agencies {
        let agency_id = ensure_agency(&tx, &agency.name)?;
        for store in &agency.stores {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO stores (agency_id, name, status) VALUES (?1, ?2, ?3)",
                params![agency_id, store, StoreStatus::Continuing],
            )?;
        }
    }

    tx.commit()?;
    Ok(inserted)
}

/// Id of the named agency, inserting it if needed
fn ensure_agency(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO agencies (name) VALUES (?1)", params![name])?;
    let id = conn.query_row("SELECT id FROM agencies WHERE name = ?1", params![name], |row| row.get(0))?;
    Ok(id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReseedReport {
    pub inserted: usize,
    pub updated: usize,
}

/// Re-seed one agency from its roster sheet: add missing stores and refresh
/// the status of existing ones. Stores missing from the sheet are kept.
pub fn reseed_agency(conn: &mut Connection, agency_name: &str, entries: &[RosterSheetEntry]) -> Result<ReseedReport> {
    if agency_name.trim().is_empty() {
        bail!("Agency name must not be empty");
    }

    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let agency_id = ensure_agency(&tx, agency_name)?;
    let mut report = ReseedReport::default();

    for entry in entries {
        let existing: Option<(i64, StoreStatus)> = tx
            .query_row(
                "SELECT id, status FROM stores WHERE agency_id = ?1 AND name = ?2",
                params![agency_id, entry.store_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((_, status)) if status == entry.status => {}
            Some((id, _)) => {
                tx.execute(
                    "UPDATE stores SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![entry.status, now, id],
                )?;
                report.updated += 1;
            }
            None => {
                tx.execute(
                    "INSERT INTO stores (agency_id, name, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![agency_id, entry.store_name, entry.status, now],
                )?;
                report.inserted += 1;
            }
        }
    }

    tx.commit()?;
    Ok(report)
}

fn map_store(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreRow> {
    Ok(StoreRow {
        id: row.get(0)?,
        agency_id: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

/// All persisted stores in id order (roster order for a seeded database)
pub fn list_stores(conn: &Connection) -> Result<Vec<StoreRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, agency_id, name, status, created_at, updated_at FROM stores ORDER BY id",
    )?;

    let stores = stmt
        .query_map([], map_store)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stores)
}

pub fn get_stores_for_agency(conn: &Connection, agency_id: i64) -> Result<Vec<StoreRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, agency_id, name, status, created_at, updated_at
         FROM stores
         WHERE agency_id = ?1
         ORDER BY name",
    )?;

    let stores = stmt
        .query_map(params![agency_id], map_store)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stores)
}

pub fn list_agencies(conn: &Connection) -> Result<Vec<Agency>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM agencies ORDER BY id")?;

    let agencies = stmt
        .query_map([], |row| {
            Ok(Agency {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(agencies)
}

// ============================================================================
// RANKING POINTS
// ============================================================================

/// Insert a point, or overwrite value and fetched_at of the existing point
/// for the same (store, date). Pass a `rusqlite::Transaction` to batch.
pub fn upsert_point(
    conn: &Connection,
    store_id: i64,
    rank_date: NaiveDate,
    rank_value: Option<f64>,
    fetched_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO rankings (store_id, rank_date, rank_value, fetched_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(store_id, rank_date) DO UPDATE SET
             rank_value = excluded.rank_value,
             fetched_at = excluded.fetched_at",
        params![store_id, rank_date, rank_value, fetched_at.to_rfc3339()],
    )
    .with_context(|| format!("Failed to upsert ranking for store {} on {}", store_id, rank_date))?;

    Ok(())
}

/// Points of one store on or after `from`, oldest first
pub fn get_rankings_since(conn: &Connection, store_id: i64, from: NaiveDate) -> Result<Vec<RankingRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, store_id, rank_date, rank_value, fetched_at
         FROM rankings
         WHERE store_id = ?1 AND rank_date >= ?2
         ORDER BY rank_date ASC",
    )?;

    let rows = stmt
        .query_map(params![store_id, from], |row| {
            Ok(RankingRow {
                id: row.get(0)?,
                store_id: row.get(1)?,
                rank_date: row.get(2)?,
                rank_value: row.get(3)?,
                fetched_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn count_points(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM rankings", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// FETCH LOG
// ============================================================================

/// Append one run record
pub fn record_run(
    conn: &Connection,
    run_id: Uuid,
    status: RunStatus,
    points_written: usize,
    error_message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO fetch_logs (run_id, fetched_at, status, stores_updated, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id.to_string(),
            Utc::now().to_rfc3339(),
            status,
            i64::try_from(points_written).unwrap_or(i64::MAX),
            error_message,
        ],
    )
    .context("Failed to record fetch log")?;

    Ok(())
}

fn map_fetch_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<FetchLog> {
    let fetched_at: String = row.get(2)?;

    Ok(FetchLog {
        id: row.get(0)?,
        run_id: row.get(1)?,
        fetched_at: DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
        status: row.get(3)?,
        stores_updated: row.get(4)?,
        error_message: row.get(5)?,
    })
}

/// Most recent runs, newest first
pub fn get_fetch_logs(conn: &Connection, limit: usize) -> Result<Vec<FetchLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, fetched_at, status, stores_updated, error_message
         FROM fetch_logs
         ORDER BY fetched_at DESC, id DESC
         LIMIT ?1",
    )?;

    let logs = stmt
        .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], map_fetch_log)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(logs)
}

pub fn get_last_successful_fetch(conn: &Connection) -> Result<Option<FetchLog>> {
    let log = conn
        .query_row(
            "SELECT id, run_id, fetched_at, status, stores_updated, error_message
             FROM fetch_logs
             WHERE status = 'success'
             ORDER BY fetched_at DESC, id DESC
             LIMIT 1",
            [],
            map_fetch_log,
        )
        .optional()?;

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgencyConfig;

    fn small_roster() -> RosterConfig {
        RosterConfig {
            agencies: vec![
                AgencyConfig {
                    name: "ネクサス".to_string(),
                    spreadsheet_id: None,
                    stores: vec!["Belle E".to_string(), "D-SPA".to_string()],
                },
                AgencyConfig {
                    name: "東海インターベル".to_string(),
                    spreadsheet_id: None,
                    stores: vec!["Platinum".to_string()],
                },
            ],
        }
    }

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        init_database(&mut conn, &small_roster()).unwrap();
        conn
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_init_seeds_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert!(init_database(&mut conn, &small_roster()).unwrap());
        assert!(!init_database(&mut conn, &small_roster()).unwrap());

        let stores = list_stores(&conn).unwrap();
        assert_eq!(stores.len(), 3);
        assert_eq!(stores[0].name, "Belle E");
        assert_eq!(stores[0].status, StoreStatus::Continuing);
        assert_eq!(list_agencies(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let mut conn = seeded();
        let again = seed_roster(&mut conn, &small_roster()).unwrap();

        assert_eq!(again, 0);
        assert_eq!(list_stores(&conn).unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_same_day_twice_keeps_one_point() {
        let conn = seeded();
        let store = &list_stores(&conn).unwrap()[0];
        let day = date(2025, 1, 10);
        let first = Utc::now();
        let later = first + chrono::Duration::hours(1);

        upsert_point(&conn, store.id, day, Some(12.0), first).unwrap();
        upsert_point(&conn, store.id, day, Some(9.0), later).unwrap();

        let rows = get_rankings_since(&conn, store.id, day).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank_value, Some(9.0));
        assert_eq!(rows[0].fetched_at, later.to_rfc3339());
        assert_eq!(count_points(&conn).unwrap(), 1);
    }

    #[test]
    fn test_upsert_absent_value() {
        let conn = seeded();
        let store = &list_stores(&conn).unwrap()[1];

        upsert_point(&conn, store.id, date(2025, 1, 10), None, Utc::now()).unwrap();

        let rows = get_rankings_since(&conn, store.id, date(2025, 1, 1)).unwrap();
        assert_eq!(rows[0].rank_value, None);
    }

    #[test]
    fn test_rankings_since_filters_and_orders() {
        let conn = seeded();
        let store = &list_stores(&conn).unwrap()[0];

        for (d, v) in [(12, 3.0), (5, 8.0), (10, 4.0)] {
            upsert_point(&conn, store.id, date(2025, 1, d), Some(v), Utc::now()).unwrap();
        }

        let rows = get_rankings_since(&conn, store.id, date(2025, 1, 10)).unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.rank_date).collect();
        assert_eq!(dates, vec![date(2025, 1, 10), date(2025, 1, 12)]);
    }

    #[test]
    fn test_upsert_unknown_store_fails() {
        let conn = seeded();
        let result = upsert_point(&conn, 9999, date(2025, 1, 10), Some(1.0), Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_fetch_log_roundtrip() {
        let conn = seeded();

        record_run(&conn, Uuid::new_v4(), RunStatus::Error, 4, Some("timeout")).unwrap();
        assert!(get_last_successful_fetch(&conn).unwrap().is_none());

        let run_id = Uuid::new_v4();
        record_run(&conn, run_id, RunStatus::Success, 12, None).unwrap();

        let last = get_last_successful_fetch(&conn).unwrap().unwrap();
        assert_eq!(last.run_id, run_id.to_string());
        assert_eq!(last.stores_updated, 12);

        let logs = get_fetch_logs(&conn, 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, RunStatus::Success);
        assert_eq!(logs[1].error_message.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_reseed_agency_inserts_and_updates() {
        let mut conn = seeded();
        let entries = vec![
            RosterSheetEntry {
                store_name: "Belle E".to_string(),
                status: StoreStatus::New,
            },
            RosterSheetEntry {
                store_name: "D-SPA".to_string(),
                status: StoreStatus::Continuing,
            },
            RosterSheetEntry {
                store_name: "REMIS".to_string(),
                status: StoreStatus::New,
            },
        ];

        let report = reseed_agency(&mut conn, "ネクサス", &entries).unwrap();
        assert_eq!(report, ReseedReport { inserted: 1, updated: 1 });

        let stores = list_stores(&conn).unwrap();
        assert_eq!(stores.len(), 4);
        let belle = stores.iter().find(|s| s.name == "Belle E").unwrap();
        assert_eq!(belle.status, StoreStatus::New);
    }

    #[test]
    fn test_same_name_allowed_in_different_agencies() {
        let mut conn = seeded();
        let entries = vec![RosterSheetEntry {
            store_name: "Belle E".to_string(),
            status: StoreStatus::Continuing,
        }];

        let report = reseed_agency(&mut conn, "東海インターベル", &entries).unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_database_handle_open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rankings.db");

        let db = Database::open(&path).unwrap();
        assert!(list_stores(db.conn()).unwrap().is_empty());
        db.close().unwrap();

        assert!(path.exists());
    }
}
