// 📋 Trends Table Parser
// Extracts per-store daily ranks from the portal's trends page.
//
// Expected layout of the largest <table> on the page:
//   店舗名 | 推移 | 01-10 | 01-11 | ... | 合計金額
// Header cells shaped like MM-DD are date columns; every following row is a store.

use super::html;
use super::{ScrapedPoint, ScrapedRanking};
use crate::error::ScrapeError;
use chrono::{Datelike, NaiveDate};
use tracing::debug;

/// Portal decorations that end up inside the store-name cell
const NAME_NOISE: [&str; 4] = ["（退会）", "(退会)", "レポートダウンロード", "店舗分析"];

/// Accepted rank values are strictly inside (0, 10000)
const MAX_RANK_VALUE: f64 = 10000.0;

/// Parse the trends page.
///
/// `today` resolves the missing year of `MM-DD` headers: a header that would
/// fall after `today` belongs to the previous year.
pub fn parse_trends_table(page: &str, today: NaiveDate) -> Result<Vec<ScrapedRanking>, ScrapeError> {
    let tables = html::blocks(page, "table");

    // Largest table by row count; first one wins a tie
    let mut main_table: Option<&str> = None;
    let mut max_rows = 0;
    for table in &tables {
        let rows = html::blocks(table, "tr").len();
        if main_table.is_none() || rows > max_rows {
            max_rows = rows;
            main_table = Some(*table);
        }
    }

    let table = main_table
        .ok_or_else(|| ScrapeError::UnrecognizedStructure("no table found on trends page".to_string()))?;

    let rows = html::blocks(table, "tr");
    if rows.len() < 2 {
        return Ok(Vec::new());
    }

    let date_columns = parse_date_header(rows[0], today);
    if date_columns.is_empty() {
        return Err(ScrapeError::UnrecognizedStructure(
            "trends table has no MM-DD date columns".to_string(),
        ));
    }
    debug!(columns = date_columns.len(), rows = rows.len() - 1, "parsing trends table");

    let results = rows[1..]
        .iter()
        .filter_map(|row| parse_store_row(row, &date_columns))
        .collect();

    Ok(results)
}

/// (column index, date) for every header cell shaped like `MM-DD`
fn parse_date_header(header_row: &str, today: NaiveDate) -> Vec<(usize, NaiveDate)> {
    html::cells(header_row, &["th", "td"])
        .into_iter()
        .enumerate()
        .filter_map(|(idx, cell)| parse_month_day(&html::text(cell), today).map(|date| (idx, date)))
        .collect()
}

fn parse_month_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    let shaped = bytes.len() == 5
        && bytes[2] == b'-'
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[3..].iter().all(u8::is_ascii_digit);
    if !shaped {
        return None;
    }

    let month: u32 = text[..2].parse().ok()?;
    let day: u32 = text[3..].parse().ok()?;

    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date > today => NaiveDate::from_ymd_opt(today.year() - 1, month, day),
        other => other,
    }
}

fn parse_store_row(row: &str, date_columns: &[(usize, NaiveDate)]) -> Option<ScrapedRanking> {
    let cells = html::cells(row, &["td"]);
    if cells.len() < 3 {
        return None;
    }

    let store_name = extract_store_name(cells[0]);
    if store_name.chars().count() < 2 {
        return None;
    }

    let rankings: Vec<ScrapedPoint> = date_columns
        .iter()
        .filter_map(|(idx, date)| {
            let cell = cells.get(*idx)?;
            let value = parse_leading_number(&html::text(cell))?;
            (value > 0.0 && value < MAX_RANK_VALUE).then_some(ScrapedPoint { date: *date, value })
        })
        .collect();

    if rankings.is_empty() {
        return None;
    }

    Some(ScrapedRanking {
        store_name,
        rankings,
    })
}

/// Link text if the cell has a link, otherwise the cell text without buttons
fn extract_store_name(cell: &str) -> String {
    let content = html::inner(cell);

    let link_text = html::blocks(content, "a")
        .first()
        .map(|link| html::text(link))
        .unwrap_or_default();

    let raw = if link_text.is_empty() {
        let without_buttons = html::remove_blocks(content, "button", |_| true);
        let without_btn_spans =
            html::remove_blocks(&without_buttons, "span", |b| html::open_tag(b).contains("btn"));
        html::text(&without_btn_spans)
    } else {
        link_text
    };

    let cleaned = NAME_NOISE
        .iter()
        .fold(raw, |name, noise| name.replace(noise, ""));

    html::normalize_ws(&cleaned)
}

/// Leading decimal number of a cell, e.g. "12.5位" → 12.5
fn parse_leading_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            '+' | '-' if i == 0 => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }

    text[..end].trim_end_matches('.').parse().ok()
}

// ============================================================================
// TESTS
// ============================================================================
