// Rank Tracker - Core Library
// Store name matching, ranking change calculation and the reconciliation
// pipeline, shared by the CLI and the tests

pub mod error;
pub mod config;
pub mod normalize;
pub mod matcher;
pub mod filter;
pub mod ranking;
pub mod scraper;
pub mod db;
pub mod pipeline;
pub mod dashboard;
pub mod sheet;

// Re-export commonly used types
pub use error::{ConfigError, PipelineError, ScrapeError};
pub use config::{default_roster, AgencyConfig, AppConfig, PortalConfig, RosterConfig};
pub use normalize::{normalize, remove_bracket_chars, strip_bracket_content};
pub use matcher::{find_best_match, match_with_tier, MatchTier, RosterEntry, StoreMatch};
pub use filter::{filter_rankings_for_stores, is_target_store};
pub use ranking::{
    calculate_agency_average, calculate_change, format_change,
    ChangeDisplay, ChangeWindow, RankingChange, RankingEntry, Trend,
};
pub use scraper::{parse_trends_table, HtmlFileSource, RankingSource, ScrapedPoint, ScrapedRanking};
#[cfg(feature = "http")]
pub use scraper::HttpTrendsSource;
pub use db::{
    Agency, Database, FetchLog, RankingRow, RunStatus, StoreRow, StoreStatus,
    init_database, setup_database, seed_roster, reseed_agency,
    list_stores, upsert_point, record_run, get_fetch_logs, get_last_successful_fetch,
};
pub use pipeline::{run_reconciliation, RunSummary};
pub use dashboard::{build_overview, AgencyOverview, AgencySummary, Overview, StoreOverview};
pub use sheet::{export_agency_csv, load_roster_sheet, RosterSheetEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
