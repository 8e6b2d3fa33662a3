// 🔄 Reconciliation Pipeline
// scrape → filter → match → upsert (one transaction) → fetch log
//
// A run either writes all of its points or none of them. Whatever happens,
// exactly one fetch log entry is appended per run.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RosterConfig;
use crate::db::{self, RunStatus, StoreRow};
use crate::error::PipelineError;
use crate::filter::filter_rankings_for_stores;
use crate::matcher::match_with_tier;
use crate::scraper::{RankingSource, ScrapedPoint};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Rows returned by the source
    pub scraped_count: usize,
    /// Rows left after the roster pre-filter
    pub target_count: usize,
    pub matched_count: usize,
    pub points_written: usize,
    /// Scraped names that passed the filter but matched no persisted store
    pub unmatched: Vec<String>,
    pub duration: Duration,
}

/// Points destined for one persisted store
struct MatchedRow<'a> {
    store: &'a StoreRow,
    points: Vec<ScrapedPoint>,
}

/// Run one reconciliation against `source` and record the outcome.
///
/// On failure the returned error displays a generic message; the detailed
/// cause goes to the log and to the error fetch log entry.
pub fn run_reconciliation(
    conn: &mut Connection,
    source: &dyn RankingSource,
    roster: &RosterConfig,
) -> Result<RunSummary, PipelineError> {
    let run_id = Uuid::new_v4();
    let started = Instant::now();
    info!(%run_id, source = %source.describe(), "starting ranking update");

    match reconcile(conn, source, roster, run_id, Utc::now()) {
        Ok(mut summary) => {
            summary.duration = started.elapsed();
            info!(
                %run_id,
                points = summary.points_written,
                stores = summary.matched_count,
                unmatched = summary.unmatched.len(),
                elapsed_ms = summary.duration.as_millis() as u64,
                "ranking update finished"
            );
            Ok(summary)
        }
        Err(err) => {
            let detail = err.detail();
            error!(%run_id, partial = err.partial_count(), error = %detail, "ranking update failed");

            if let Err(log_err) = db::record_run(conn, run_id, RunStatus::Error, err.partial_count(), Some(&detail)) {
                error!(%run_id, error = %format!("{:#}", log_err), "could not record failed run");
            }

            Err(err)
        }
    }
}

fn reconcile(
    conn: &mut Connection,
    source: &dyn RankingSource,
    roster: &RosterConfig,
    run_id: Uuid,
    fetched_at: DateTime<Utc>,
) -> Result<RunSummary, PipelineError> {
    let scraped = source.fetch_external_rankings().map_err(PipelineError::Scrape)?;
    let scraped_count = scraped.len();

    let stores = db::list_stores(conn).map_err(|source| PipelineError::Persistence {
        source,
        partial_count: 0,
    })?;

    let targets = roster.target_names();
    let filtered = filter_rankings_for_stores(scraped, &targets);
    let target_count = filtered.len();
    debug!(%run_id, scraped = scraped_count, targets = target_count, "filtered scraped rows");

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for row in filtered {
        match match_with_tier(&row.store_name, &stores) {
            Some(m) => {
                debug!(scraped = %row.store_name, store = %m.entry.name, tier = m.tier.as_str(), "matched store");
                matched.push(MatchedRow {
                    store: m.entry,
                    points: row.rankings,
                });
            }
            None => {
                warn!(%run_id, scraped = %row.store_name, "no persisted store matches scraped name, skipping");
                unmatched.push(row.store_name);
            }
        }
    }

    let points_written = write_batch(conn, &matched, fetched_at)?;

    db::record_run(conn, run_id, RunStatus::Success, points_written, None).map_err(|source| {
        PipelineError::Persistence {
            source,
            partial_count: points_written,
        }
    })?;

    Ok(RunSummary {
        run_id,
        scraped_count,
        target_count,
        matched_count: matched.len(),
        points_written,
        unmatched,
        duration: Duration::ZERO,
    })
}

/// Upsert every point in a single transaction; dropping it on error rolls back
fn write_batch(conn: &mut Connection, matched: &[MatchedRow<'_>], fetched_at: DateTime<Utc>) -> Result<usize, PipelineError> {
    let persistence = |source: anyhow::Error, partial_count: usize| PipelineError::Persistence { source, partial_count };

    let tx = conn.transaction().map_err(|e| persistence(e.into(), 0))?;
    let mut written = 0;

    for row in matched {
        for point in &row.points {
            db::upsert_point(&tx, row.store.id, point.date, Some(point.value), fetched_at)
                .map_err(|e| persistence(e, written))?;
            written += 1;
        }
    }

    tx.commit().map_err(|e| persistence(e.into(), written))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgencyConfig;
    use crate::error::ScrapeError;
    use crate::scraper::ScrapedRanking;
    use chrono::NaiveDate;

    struct FixedSource(Vec<ScrapedRanking>);

    impl RankingSource for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn fetch_external_rankings(&self) -> Result<Vec<ScrapedRanking>, ScrapeError> {
            Ok(self.0.clone())
        }
    }

    fn roster() -> RosterConfig {
        RosterConfig {
            agencies: vec![AgencyConfig {
                name: "ネクサス".to_string(),
                spreadsheet_id: None,
                stores: vec!["ALFARD（アルファード）".to_string(), "Belle E".to_string()],
            }],
        }
    }

    fn row(name: &str, values: &[(u32, f64)]) -> ScrapedRanking {
        ScrapedRanking {
            store_name: name.to_string(),
            rankings: values
                .iter()
                .map(|(d, v)| ScrapedPoint {
                    date: NaiveDate::from_ymd_opt(2025, 2, *d).unwrap(),
                    value: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn test_rows_outside_roster_are_filtered_not_warned() {
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_database(&mut conn, &roster()).unwrap();

        let source = FixedSource(vec![
            row("ALFARD (アルファード)", &[(1, 3.0), (2, 4.0)]),
            row("Someone Else", &[(1, 1.0)]),
        ]);

        let summary = run_reconciliation(&mut conn, &source, &roster()).unwrap();

        assert_eq!(summary.scraped_count, 2);
        assert_eq!(summary.target_count, 1);
        assert_eq!(summary.matched_count, 1);
        assert_eq!(summary.points_written, 2);
        assert!(summary.unmatched.is_empty());
    }

    #[test]
    fn test_filter_passes_but_store_not_persisted() {
        let mut conn = Connection::open_in_memory().unwrap();
        // database only knows Belle E; the roster config also lists ALFARD
        let seeded = RosterConfig {
            agencies: vec![AgencyConfig {
                name: "ネクサス".to_string(),
                spreadsheet_id: None,
                stores: vec!["Belle E".to_string()],
            }],
        };
        db::init_database(&mut conn, &seeded).unwrap();

        let source = FixedSource(vec![row("ALFARD", &[(1, 3.0)]), row("Belle E", &[(1, 7.0)])]);
        let summary = run_reconciliation(&mut conn, &source, &roster()).unwrap();

        assert_eq!(summary.unmatched, vec!["ALFARD".to_string()]);
        assert_eq!(summary.points_written, 1);
    }
}
