// 📊 Dashboard - Read path over persisted rankings
//
// Everything the trend tables need: per-store points inside a window,
// day/week/month changes, agency averages and the last successful update.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, StoreStatus};
use crate::ranking::{calculate_agency_average, calculate_change, ChangeWindow, RankingChange, RankingEntry};

pub const DEFAULT_WINDOW_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencySummary {
    pub id: i64,
    pub name: String,
    pub store_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreOverview {
    pub id: i64,
    pub name: String,
    pub status: StoreStatus,
    pub rankings: Vec<RankingEntry>,
    pub latest_value: Option<f64>,
    pub daily: RankingChange,
    pub weekly: RankingChange,
    pub monthly: RankingChange,
}

impl StoreOverview {
    pub fn change(&self, window: ChangeWindow) -> &RankingChange {
        match window {
            ChangeWindow::Day => &self.daily,
            ChangeWindow::Week => &self.weekly,
            ChangeWindow::Month => &self.monthly,
        }
    }

    pub fn has_data(&self) -> bool {
        self.rankings.iter().any(|r| r.rank_value.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyOverview {
    pub id: i64,
    pub name: String,
    pub stores: Vec<StoreOverview>,
    pub average_daily: RankingChange,
    pub average_weekly: RankingChange,
    pub average_monthly: RankingChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub agencies: Vec<AgencyOverview>,
    pub total_stores: usize,
    pub stores_with_data: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Overview {
    pub fn agency(&self, id: i64) -> Option<&AgencyOverview> {
        self.agencies.iter().find(|a| a.id == id)
    }
}

/// Agencies in id order with their store counts
pub fn list_agencies(conn: &Connection) -> Result<Vec<AgencySummary>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, COUNT(s.id)
         FROM agencies a
         LEFT JOIN stores s ON s.agency_id = a.id
         GROUP BY a.id, a.name
         ORDER BY a.id",
    )?;

    let agencies = stmt
        .query_map([], |row| {
            Ok(AgencySummary {
                id: row.get(0)?,
                name: row.get(1)?,
                store_count: row.get::<_, i64>(2)? as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(agencies)
}

/// A store's points dated on or after `from`, oldest first
pub fn load_rankings_since(conn: &Connection, store_id: i64, from: NaiveDate) -> Result<Vec<RankingEntry>> {
    let rows = db::get_rankings_since(conn, store_id, from)?;
    Ok(rows
        .into_iter()
        .map(|r| RankingEntry::new(r.rank_date, r.rank_value))
        .collect())
}

/// Build the trend tables for the `days` days up to `today`
pub fn build_overview(conn: &Connection, days: u64, today: NaiveDate) -> Result<Overview> {
    let from = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);

    let mut agencies = Vec::new();
    for agency in db::list_agencies(conn)? {
        let stores = db::get_stores_for_agency(conn, agency.id)?
            .into_iter()
            .map(|store| store_overview(conn, store, from, today))
            .collect::<Result<Vec<_>>>()?;

        agencies.push(agency_overview(agency.id, agency.name, stores));
    }

    let total_stores = agencies.iter().map(|a| a.stores.len()).sum();
    let stores_with_data = agencies
        .iter()
        .flat_map(|a| a.stores.iter())
        .filter(|s| s.has_data())
        .count();
    let last_updated = db::get_last_successful_fetch(conn)?.map(|log| log.fetched_at);

    Ok(Overview {
        from,
        to: today,
        agencies,
        total_stores,
        stores_with_data,
        last_updated,
    })
}

fn store_overview(conn: &Connection, store: db::StoreRow, from: NaiveDate, today: NaiveDate) -> Result<StoreOverview> {
    let rankings = load_rankings_since(conn, store.id, from)?;
    let latest_value = rankings.iter().rev().find_map(|r| r.rank_value);

    let [daily, weekly, monthly] = ChangeWindow::ALL.map(|w| calculate_change(&rankings, w.days(), today));

    Ok(StoreOverview {
        id: store.id,
        name: store.name,
        status: store.status,
        rankings,
        latest_value,
        daily,
        weekly,
        monthly,
    })
}

fn agency_overview(id: i64, name: String, stores: Vec<StoreOverview>) -> AgencyOverview {
    let average = |window: ChangeWindow| {
        let changes: Vec<RankingChange> = stores.iter().map(|s| *s.change(window)).collect();
        calculate_agency_average(&changes)
    };

    AgencyOverview {
        id,
        name,
        average_daily: average(ChangeWindow::Day),
        average_weekly: average(ChangeWindow::Week),
        average_monthly: average(ChangeWindow::Month),
        stores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgencyConfig, RosterConfig};
    use crate::db::{init_database, list_stores, record_run, upsert_point, RunStatus};
    use uuid::Uuid;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn setup() -> Connection {
        let roster = RosterConfig {
            agencies: vec![
                AgencyConfig {
                    name: "ネクサス".to_string(),
                    spreadsheet_id: None,
                    stores: vec!["D-SPA".to_string(), "Belle E".to_string()],
                },
                AgencyConfig {
                    name: "KGエンタープライズ".to_string(),
                    spreadsheet_id: None,
                    stores: vec![],
                },
            ],
        };
        let mut conn = Connection::open_in_memory().unwrap();
        init_database(&mut conn, &roster).unwrap();
        conn
    }

    fn store_id(conn: &Connection, name: &str) -> i64 {
        list_stores(conn).unwrap().into_iter().find(|s| s.name == name).unwrap().id
    }

    #[test]
    fn test_list_agencies_with_counts() {
        let conn = setup();
        let agencies = list_agencies(&conn).unwrap();

        assert_eq!(agencies.len(), 2);
        assert_eq!(agencies[0].name, "ネクサス");
        assert_eq!(agencies[0].store_count, 2);
        assert_eq!(agencies[1].store_count, 0);
    }

    #[test]
    fn test_build_overview() {
        let conn = setup();
        let belle = store_id(&conn, "Belle E");
        let now = Utc::now();

        upsert_point(&conn, belle, date(1, 1), Some(9.0), now).unwrap();
        upsert_point(&conn, belle, date(1, 24), Some(5.0), now).unwrap();
        upsert_point(&conn, belle, date(1, 30), Some(4.0), now).unwrap();
        upsert_point(&conn, belle, date(1, 31), Some(2.0), now).unwrap();
        record_run(&conn, Uuid::new_v4(), RunStatus::Success, 4, None).unwrap();

        let overview = build_overview(&conn, 30, date(1, 31)).unwrap();

        assert_eq!(overview.from, date(1, 1));
        assert_eq!(overview.total_stores, 2);
        assert_eq!(overview.stores_with_data, 1);
        assert!(overview.last_updated.is_some());

        let nexus = &overview.agencies[0];
        // stores ordered by name
        assert_eq!(nexus.stores[0].name, "Belle E");
        assert_eq!(nexus.stores[1].name, "D-SPA");

        let store = &nexus.stores[0];
        assert_eq!(store.latest_value, Some(2.0));
        assert_eq!(store.daily.change, Some(2.0));
        assert_eq!(store.daily.change_percent, Some(50.0));
        assert_eq!(store.weekly.previous, Some(5.0));
        assert_eq!(store.weekly.change, Some(3.0));
        assert_eq!(store.monthly.previous, Some(9.0));

        // D-SPA has no change and stays out of the average
        assert_eq!(nexus.average_daily.change, Some(2.0));
        assert_eq!(nexus.average_daily.change_percent, Some(50.0));
        assert_eq!(overview.agencies[1].average_daily, RankingChange::empty());
    }

    #[test]
    fn test_window_excludes_old_points() {
        let conn = setup();
        let belle = store_id(&conn, "Belle E");
        upsert_point(&conn, belle, date(1, 1), Some(9.0), Utc::now()).unwrap();
        upsert_point(&conn, belle, date(1, 31), Some(2.0), Utc::now()).unwrap();

        let overview = build_overview(&conn, 7, date(1, 31)).unwrap();
        let store = &overview.agencies[0].stores[0];

        // the only point in the window is its own reference
        assert_eq!(store.rankings.len(), 1);
        assert_eq!(store.weekly.previous, Some(2.0));
        assert_eq!(store.weekly.change, Some(0.0));
        assert!(overview.last_updated.is_none());
    }
}
