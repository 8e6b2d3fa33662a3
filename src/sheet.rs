// 📑 Roster Sheets - Agency sheet import and CSV export
//
// Each agency keeps its roster in a spreadsheet; exported as CSV it looks like:
//   A: 店舗名 | B..F: (ignored) | G: ステータス (継続 / 新規)
// The first row is a header.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::AgencyConfig;
use crate::dashboard::AgencyOverview;
use crate::db::StoreStatus;
use crate::ranking::format_change;

const NAME_COLUMN: usize = 0;
const STATUS_COLUMN: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSheetEntry {
    pub store_name: String,
    pub status: StoreStatus,
}

// ============================================================================
// IMPORT
// ============================================================================

/// Read an agency roster sheet exported as CSV.
///
/// Rows with an empty name or a status other than 継続/新規 are skipped.
pub fn load_roster_sheet(path: &Path) -> Result<Vec<RosterSheetEntry>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open roster sheet: {}", path.display()))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut entries = Vec::new();

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
        })?;

        let name = record.get(NAME_COLUMN).unwrap_or("").trim();
        let status = record.get(STATUS_COLUMN).and_then(StoreStatus::parse);

        match status {
            Some(status) if !name.is_empty() => entries.push(RosterSheetEntry {
                store_name: name.to_string(),
                status,
            }),
            _ => debug!(line = line_num + 2, "skipping roster sheet row"),
        }
    }

    Ok(entries)
}

/// Sheet entries, or the configured store list (all 継続) when the sheet
/// cannot be read.
pub fn roster_entries_or_fallback(path: &Path, agency: &AgencyConfig) -> Vec<RosterSheetEntry> {
    match load_roster_sheet(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(agency = %agency.name, error = %format!("{:#}", e), "roster sheet unreadable, using configured stores");
            agency
                .stores
                .iter()
                .map(|name| RosterSheetEntry {
                    store_name: name.clone(),
                    status: StoreStatus::Continuing,
                })
                .collect()
        }
    }
}

// ============================================================================
// EXPORT
// ============================================================================

/// One CSV row per store: name, status, latest rank and the three change columns
pub fn export_agency_csv<W: Write>(writer: W, agency: &AgencyOverview) -> Result<()> {
    let mut csv = Writer::from_writer(writer);

    csv.write_record(["店舗名", "ステータス", "最新順位", "前日比", "前週比", "前月比"])?;

    for store in &agency.stores {
        let latest = store
            .latest_value
            .map(|v| format!("{}", v))
            .unwrap_or_else(|| "-".to_string());

        csv.write_record([
            store.name.as_str(),
            store.status.as_str(),
            latest.as_str(),
            format_change(store.daily.change).text.as_str(),
            format_change(store.weekly.change).text.as_str(),
            format_change(store.monthly.change).text.as_str(),
        ])?;
    }

    csv.flush().context("Failed to write CSV export")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
