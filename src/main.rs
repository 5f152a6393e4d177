use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chartsmith::catalog::{CatalogClient, ThreadSleeper};
use chartsmith::chart::ChartBuilder;
use chartsmith::config::{AppConfig, ConfigError, RankingMode};
use chartsmith::db::Database;
use chartsmith::db::models::ChartRecord;
use clap::{Parser, Subcommand};

/// Exit code for missing required configuration.
const EXIT_MISSING_CONFIG: u8 = 2;
/// Exit code for any other failure.
const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "chartsmith", version, about = "Yearly album chart builder")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Chart table name (overrides CHARTS_TABLE)
    #[arg(long, global = true)]
    table: Option<String>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and store charts for a range of years
    Run {
        /// First year (inclusive)
        #[arg(long)]
        start_year: Option<i32>,

        /// Last year (inclusive)
        #[arg(long)]
        end_year: Option<i32>,

        /// Entries per chart
        #[arg(long)]
        top_k: Option<usize>,

        /// Albums requested per market
        #[arg(long)]
        per_market_fetch: Option<usize>,

        /// Comma-separated market codes (e.g. US,GB,DE)
        #[arg(long)]
        markets: Option<String>,

        /// Candidate ordering before top-K truncation
        #[arg(long, value_enum)]
        ranking: Option<RankingMode>,

        /// Fetch and rank but don't write to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the stored chart for a year
    Show {
        /// Chart year (e.g. 1999)
        year: i32,

        /// Also list each album's tracks
        #[arg(long)]
        tracks: bool,
    },

    /// List years with a stored chart
    Years,

    /// Copy charted albums into the album catalog table
    SeedAlbums,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Exit status for a failed run: 2 when a required setting is missing
/// anywhere in the error chain, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    let missing_config = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ConfigError>())
        .any(|c| matches!(c, ConfigError::Missing(_)));
    if missing_config { EXIT_MISSING_CONFIG } else { EXIT_FAILURE }
}

/// Validate layered settings and return the chart table name.
///
/// Missing required settings are reported ahead of malformed values, so a
/// run lacking credentials exits 2 even when another value is also bad.
fn check_settings(
    config: &AppConfig,
    env_result: std::result::Result<(), ConfigError>,
    needs_catalog: bool,
) -> Result<String> {
    let charts_table = config.charts_table();
    if needs_catalog {
        config.catalog_settings()?;
    }
    let charts_table = charts_table?;
    env_result.context("Invalid environment configuration")?;
    Ok(charts_table)
}

fn run(cli: Cli) -> Result<()> {
    // Config file (optional), then environment, then CLI flags
    let mut config = AppConfig::load();
    let env_result = config.apply_env(|key| std::env::var(key).ok());
    if let Some(table) = cli.table {
        config.charts_table = Some(table);
    }

    let needs_catalog = matches!(cli.command, Commands::Run { .. });
    let charts_table = check_settings(&config, env_result, needs_catalog)?;

    // Resolve database path: CLI > env/config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(chartsmith::config::default_db_path);
    log::info!("Database: {} (table {charts_table})", db_path.display());

    match cli.command {
        Commands::Run {
            start_year,
            end_year,
            top_k,
            per_market_fetch,
            markets,
            ranking,
            dry_run,
        } => {
            if let Some(y) = start_year {
                config.run.start_year = y;
            }
            if let Some(y) = end_year {
                config.run.end_year = y;
            }
            if let Some(k) = top_k {
                config.run.top_k = k;
            }
            if let Some(n) = per_market_fetch {
                config.run.per_market_fetch = n;
            }
            if let Some(m) = markets {
                config.run.markets = chartsmith::config::parse_markets(&m);
            }
            if let Some(r) = ranking {
                config.run.ranking = r;
            }

            let settings = config.catalog_settings()?;
            let params = config.run_params()?;

            let db = Database::open(&db_path, &charts_table).context("Failed to open database")?;
            let catalog = CatalogClient::connect(settings).context("Catalog authentication failed")?;

            if dry_run {
                println!("DRY RUN — no charts will be written to the database");
            }
            let summary = ChartBuilder::new(&catalog, &ThreadSleeper, &params)
                .run_years(&db, dry_run)
                .context("Chart run failed")?;

            println!(
                "Run complete: {} years, {} entries written, {} duplicates skipped, \
                 {} market fetches failed, {} albums without tracks",
                summary.years,
                summary.entries_written,
                summary.duplicates_skipped,
                summary.markets_failed,
                summary.enrichment_failures
            );
            if dry_run && summary.entries_written > 0 {
                println!("(dry run — re-run without --dry-run to write charts)");
            }
        }

        Commands::Show { year, tracks } => {
            let db = Database::open(&db_path, &charts_table).context("Failed to open database")?;
            let chart = db.get_chart(&year.to_string()).context("Query failed")?;

            if chart.is_empty() {
                println!("No chart for year {year}.");
                return Ok(());
            }

            println!("Top {} albums of {year}:", chart.len());
            println!();
            print_chart_table(&chart, tracks);
        }

        Commands::Years => {
            let db = Database::open(&db_path, &charts_table).context("Failed to open database")?;
            let years = db.chart_years().context("Query failed")?;

            if years.is_empty() {
                println!("No charts stored. Run `chartsmith run` first.");
                return Ok(());
            }

            println!("{:<6} {:>7}  {}", "Year", "Entries", "Fetched");
            println!("{}", "-".repeat(36));
            for y in &years {
                println!(
                    "{:<6} {:>7}  {}",
                    y.chart_key,
                    y.entries,
                    y.fetched_at.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::SeedAlbums => {
            let db = Database::open(&db_path, &charts_table).context("Failed to open database")?;
            let result = chartsmith::albums::seed_albums_from_charts(&db).context("Album seeding failed")?;
            println!(
                "Seed complete: {} chart rows scanned, {} albums written",
                result.chart_rows, result.albums_written
            );
        }
    }

    Ok(())
}

/// Print a chart ordered by rank.
fn print_chart_table(chart: &[ChartRecord], with_tracks: bool) {
    println!("{:>4}  {:<30} {:<30} {:>10}", "Rank", "Artist", "Title", "Released");
    println!("{}", "-".repeat(78));

    for r in chart {
        println!(
            "{:>4}  {:<30} {:<30} {:>10}",
            r.rank,
            truncate(&r.artist, 30),
            truncate(&r.title, 30),
            r.release_date
        );
        if with_tracks {
            for (i, t) in r.track_titles.iter().enumerate() {
                println!("        {:>2}. {t}", i + 1);
            }
        }
    }

    if let Some(first) = chart.first() {
        println!();
        println!("Source: {}  Fetched: {}", first.source, first.fetched_at);
    }
}

/// Truncate on a char boundary, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        s.to_string()
    }
}
