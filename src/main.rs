// 🏁 rank-tracker CLI
//
// Settings come from the environment (see AppConfig::from_env); --db and
// --roster override them. Logs go to stderr (RUST_LOG, default "info"),
// command output to stdout.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use rank_tracker::dashboard::{build_overview, list_agencies, DEFAULT_WINDOW_DAYS};
use rank_tracker::db::{self, Database};
use rank_tracker::ranking::{format_change, ChangeWindow, RankingChange};
use rank_tracker::sheet::{export_agency_csv, roster_entries_or_fallback};
use rank_tracker::{
    filter_rankings_for_stores, match_with_tier, run_reconciliation, AppConfig, HtmlFileSource, RankingSource,
    RosterConfig, ScrapedRanking,
};

/// Track store rankings scraped from the portal trends page
#[derive(Parser, Debug)]
#[command(name = "rank-tracker")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// SQLite database file (overrides RANK_TRACKER_DB)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Roster TOML file (overrides RANK_TRACKER_ROSTER)
    #[arg(long, global = true, value_name = "FILE")]
    roster: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and seed the roster if the database is empty
    Init,

    /// Scrape the trends page and store today's rankings
    Update {
        /// Read a saved trends page instead of fetching it
        #[arg(long, value_name = "FILE")]
        html: Option<PathBuf>,

        /// Date used to resolve MM-DD headers of a saved page (YYYY-MM-DD)
        #[arg(long, requires = "html")]
        today: Option<NaiveDate>,
    },

    /// Print trend tables per agency
    Report {
        /// Days of history to load
        #[arg(short, long, default_value_t = DEFAULT_WINDOW_DAYS)]
        days: u64,

        /// Reference date (YYYY-MM-DD, default today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Write one agency's trend table as CSV
    Export {
        /// Agency id (see `report`)
        #[arg(long)]
        agency: i64,

        #[arg(short, long, default_value_t = DEFAULT_WINDOW_DAYS)]
        days: u64,

        /// Output file (default stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Re-seed one agency's stores from its roster sheet (CSV export)
    SyncRoster {
        /// Agency name
        #[arg(long)]
        agency: String,

        #[arg(value_name = "CSV")]
        sheet: PathBuf,
    },

    /// Show how a scraped name would be filtered and matched
    Match {
        name: String,
    },

    /// Show recent update runs
    Logs {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(roster) = cli.roster {
        config.roster_path = Some(roster);
    }
    let roster = config.load_roster()?;

    let mut database = Database::open(&config.db_path)?;

    match cli.command {
        Command::Init => run_init(&mut database, &roster)?,
        Command::Update { html, today } => run_update(&mut database, &config, &roster, html, today)?,
        Command::Report { days, today, json } => run_report(&database, days, today, json)?,
        Command::Export { agency, days, output } => run_export(&database, agency, days, output)?,
        Command::SyncRoster { agency, sheet } => run_sync_roster(&mut database, &roster, &agency, sheet)?,
        Command::Match { name } => run_match(&database, &roster, &name)?,
        Command::Logs { limit } => run_logs(&database, limit)?,
    }

    database.close()
}

fn run_init(database: &mut Database, roster: &RosterConfig) -> Result<()> {
    if db::init_database(database.conn_mut(), roster)? {
        println!("✓ Seeded {} agencies, {} stores", roster.agencies.len(), roster.store_count());
    } else {
        println!("✓ Database already initialized");
    }

    for agency in list_agencies(database.conn())? {
        println!("  [{}] {} ({} stores)", agency.id, agency.name, agency.store_count);
    }

    Ok(())
}

fn run_update(
    database: &mut Database,
    config: &AppConfig,
    roster: &RosterConfig,
    html: Option<PathBuf>,
    today: Option<NaiveDate>,
) -> Result<()> {
    db::init_database(database.conn_mut(), roster)?;

    let source: Box<dyn RankingSource> = match html {
        Some(path) => {
            let source = HtmlFileSource::new(path);
            Box::new(match today {
                Some(date) => source.with_today(date),
                None => source,
            })
        }
        None => live_source(config)?,
    };

    match run_reconciliation(database.conn_mut(), source.as_ref(), roster) {
        Ok(summary) => {
            println!(
                "✓ Updated {} points for {} stores in {:.1}s",
                summary.points_written,
                summary.matched_count,
                summary.duration.as_secs_f64()
            );
            for name in &summary.unmatched {
                println!("  ⚠️  unmatched: {}", name);
            }
            Ok(())
        }
        // details were logged by the pipeline
        Err(e) => bail!("{}", e),
    }
}

#[cfg(feature = "http")]
fn live_source(config: &AppConfig) -> Result<Box<dyn RankingSource>> {
    let source = rank_tracker::HttpTrendsSource::new(config.portal.clone())?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "http"))]
fn live_source(_config: &AppConfig) -> Result<Box<dyn RankingSource>> {
    bail!("built without the `http` feature; pass --html FILE")
}

fn run_report(database: &Database, days: u64, today: Option<NaiveDate>, json: bool) -> Result<()> {
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let overview = build_overview(database.conn(), days, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("📈 Rankings {} .. {}", overview.from, overview.to);
    match overview.last_updated {
        Some(at) => println!("   last update: {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M")),
        None => println!("   last update: never"),
    }
    println!("   stores with data: {}/{}", overview.stores_with_data, overview.total_stores);

    for agency in &overview.agencies {
        println!("\n[{}] {}", agency.id, agency.name);
        println!("  {:<40} {:>8} {:>10} {:>10} {:>10}", "store", "latest", "1d", "7d", "30d");

        for store in &agency.stores {
            let latest = store
                .latest_value
                .map(|v| format!("{}", v))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<40} {:>8} {:>10} {:>10} {:>10}",
                store.name,
                latest,
                change_cell(store.change(ChangeWindow::Day)),
                change_cell(store.change(ChangeWindow::Week)),
                change_cell(store.change(ChangeWindow::Month)),
            );
        }

        println!(
            "  {:<40} {:>8} {:>10} {:>10} {:>10}",
            "average",
            "",
            change_cell(&agency.average_daily),
            change_cell(&agency.average_weekly),
            change_cell(&agency.average_monthly),
        );
    }

    Ok(())
}

fn change_cell(change: &RankingChange) -> String {
    format_change(change.change).label()
}

fn run_export(database: &Database, agency_id: i64, days: u64, output: Option<PathBuf>) -> Result<()> {
    let overview = build_overview(database.conn(), days, Local::now().date_naive())?;
    let agency = overview
        .agency(agency_id)
        .with_context(|| format!("No agency with id {}", agency_id))?;

    match output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
            export_agency_csv(file, agency)?;
            println!("✓ Wrote {} stores to {}", agency.stores.len(), path.display());
        }
        None => export_agency_csv(io::stdout().lock(), agency)?,
    }

    Ok(())
}

fn run_sync_roster(database: &mut Database, roster: &RosterConfig, agency: &str, sheet: PathBuf) -> Result<()> {
    let configured = roster
        .agency(agency)
        .with_context(|| format!("Agency {} is not in the roster", agency))?;

    let entries = roster_entries_or_fallback(&sheet, configured);
    let report = db::reseed_agency(database.conn_mut(), agency, &entries)?;

    println!(
        "✓ {}: {} sheet rows, {} stores added, {} statuses updated",
        agency,
        entries.len(),
        report.inserted,
        report.updated
    );
    Ok(())
}

fn run_match(database: &Database, roster: &RosterConfig, name: &str) -> Result<()> {
    let probe = vec![ScrapedRanking {
        store_name: name.to_string(),
        rankings: Vec::new(),
    }];
    let passes_filter = !filter_rankings_for_stores(probe, &roster.target_names()).is_empty();
    println!("filter: {}", if passes_filter { "kept" } else { "dropped" });

    let stores = db::list_stores(database.conn())?;
    match match_with_tier(name, &stores) {
        Some(m) => println!("match:  {} (store {}, {})", m.entry.name, m.entry.id, m.tier.as_str()),
        None => println!("match:  none"),
    }

    Ok(())
}

fn run_logs(database: &Database, limit: usize) -> Result<()> {
    let mut out = io::stdout().lock();

    for log in db::get_fetch_logs(database.conn(), limit)? {
        writeln!(
            out,
            "{}  {:<7}  {:>5} points  {}{}",
            log.fetched_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            log.status.as_str(),
            log.stores_updated,
            log.run_id,
            log.error_message.map(|m| format!("  {}", m)).unwrap_or_default()
        )?;
    }

    Ok(())
}
