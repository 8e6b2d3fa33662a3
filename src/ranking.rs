// 📈 Ranking Change Calculator
// Day/week/month movement of a store's rank, and agency-wide averages.
//
// Ranks are "lower is better", so change = previous - current:
//   positive → rank improved
//   negative → rank declined

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// RANKING ENTRY
// ============================================================================

/// One day's rank for one store (value may be missing for that day)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank_date: NaiveDate,
    pub rank_value: Option<f64>,
}

impl RankingEntry {
    pub fn new(rank_date: NaiveDate, rank_value: Option<f64>) -> Self {
        RankingEntry {
            rank_date,
            rank_value,
        }
    }
}

// ============================================================================
// RANKING CHANGE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingChange {
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

impl RankingChange {
    /// All fields absent ("no data")
    pub fn empty() -> Self {
        RankingChange::default()
    }

    pub fn has_change(&self) -> bool {
        self.change.is_some()
    }
}

// ============================================================================
// LOOKBACK WINDOWS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeWindow {
    Day,
    Week,
    Month,
}

impl ChangeWindow {
    pub const ALL: [ChangeWindow; 3] = [ChangeWindow::Day, ChangeWindow::Week, ChangeWindow::Month];

    pub fn days(&self) -> i64 {
        match self {
            ChangeWindow::Day => 1,
            ChangeWindow::Week => 7,
            ChangeWindow::Month => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeWindow::Day => "1d",
            ChangeWindow::Week => "7d",
            ChangeWindow::Month => "30d",
        }
    }
}

// ============================================================================
// CHANGE CALCULATION
// ============================================================================

/// Change between the latest rank and the rank closest to `today - days_back`.
///
/// The reference date is anchored to `today`, not to the latest data point,
/// so a stale series compares against an old point. A negative `days_back`
/// yields an empty change.
pub fn calculate_change(points: &[RankingEntry], days_back: i64, today: NaiveDate) -> RankingChange {
    if points.is_empty() || days_back < 0 {
        return RankingChange::empty();
    }

    let target = match today.checked_sub_days(Days::new(days_back.unsigned_abs())) {
        Some(date) => date,
        None => return RankingChange::empty(),
    };

    // Newest first
    let mut sorted: Vec<&RankingEntry> = points.iter().collect();
    sorted.sort_by(|a, b| b.rank_date.cmp(&a.rank_date));

    let current = match sorted[0].rank_value {
        Some(value) => value,
        None => return RankingChange::empty(),
    };

    // Closest to target; on equal distance the newer point (seen first) wins
    let mut previous: Option<f64> = None;
    let mut closest_diff = i64::MAX;

    for entry in &sorted {
        let value = match entry.rank_value {
            Some(v) => v,
            None => continue,
        };
        let diff = (entry.rank_date - target).num_days().abs();
        if diff < closest_diff {
            closest_diff = diff;
            previous = Some(value);
        }
    }

    let previous = match previous {
        Some(p) => p,
        None => {
            return RankingChange {
                current: Some(current),
                ..RankingChange::empty()
            }
        }
    };

    let change = previous - current;
    let change_percent = if previous != 0.0 {
        Some(change / previous * 100.0)
    } else {
        None
    };

    RankingChange {
        current: Some(current),
        previous: Some(previous),
        change: Some(change),
        change_percent,
    }
}

/// Average the changes of several stores.
///
/// Only entries with a change are averaged. Within those, a missing
/// current/previous/percent counts as zero. Each field is rounded to one
/// decimal place.
pub fn calculate_agency_average(changes: &[RankingChange]) -> RankingChange {
    let valid: Vec<&RankingChange> = changes.iter().filter(|c| c.has_change()).collect();

    if valid.is_empty() {
        return RankingChange::empty();
    }

    let count = valid.len() as f64;
    let mean = |field: fn(&RankingChange) -> Option<f64>| -> f64 {
        valid.iter().map(|c| field(c).unwrap_or(0.0)).sum::<f64>() / count
    };

    RankingChange {
        current: Some(round_one_decimal(mean(|c| c.current))),
        previous: Some(round_one_decimal(mean(|c| c.previous))),
        change: Some(round_one_decimal(mean(|c| c.change))),
        change_percent: Some(round_one_decimal(mean(|c| c.change_percent))),
    }
}

/// Round to one decimal, halves away from zero
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// DISPLAY FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// No data
    Unknown,
    Improved,
    Declined,
    Unchanged,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Unknown => "",
            Trend::Improved => "↑",
            Trend::Declined => "↓",
            Trend::Unchanged => "→",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDisplay {
    pub text: String,
    pub trend: Trend,
}

impl ChangeDisplay {
    /// Arrow and text together, e.g. "↑ +2.0"
    pub fn label(&self) -> String {
        match self.trend {
            Trend::Unknown => self.text.clone(),
            _ => format!("{} {}", self.trend.arrow(), self.text),
        }
    }
}

pub fn format_change(change: Option<f64>) -> ChangeDisplay {
    match change {
        None => ChangeDisplay {
            text: "-".to_string(),
            trend: Trend::Unknown,
        },
        Some(c) if c > 0.0 => ChangeDisplay {
            text: format!("+{:.1}", c),
            trend: Trend::Improved,
        },
        Some(c) if c < 0.0 => ChangeDisplay {
            text: format!("{:.1}", c),
            trend: Trend::Declined,
        },
        Some(_) => ChangeDisplay {
            text: "±0".to_string(),
            trend: Trend::Unchanged,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
