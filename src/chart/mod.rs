//! Yearly chart builder.
//!
//! For each year: fetch every configured market from the catalog, fold the
//! albums released that year into an accumulator, dedup and cut to top-K,
//! enrich each entry with its track list, and write the ranked chart.

pub mod aggregate;
pub mod persist;
pub mod rank;
pub mod search;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::{CatalogApi, RetryPolicy, Sleeper};
use crate::config::RunParams;
use crate::db::Database;

/// Catalog, clock and parameters for a chart run.
pub struct ChartBuilder<'a> {
    catalog: &'a dyn CatalogApi,
    sleeper: &'a dyn Sleeper,
    params: &'a RunParams,
    retry: RetryPolicy,
}

/// Result of building one year's chart.
#[derive(Debug)]
pub struct YearOutcome {
    pub year: i32,
    pub albums_seen: usize,
    pub failed_markets: Vec<String>,
    pub save: persist::SaveOutcome,
}

/// Totals across a whole run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub years: usize,
    pub entries_written: usize,
    pub duplicates_skipped: usize,
    pub markets_failed: usize,
    pub enrichment_failures: usize,
}

impl RunSummary {
    fn add(&mut self, outcome: &YearOutcome) {
        self.years += 1;
        self.entries_written += outcome.save.records.len();
        self.duplicates_skipped += outcome.save.duplicates_skipped;
        self.markets_failed += outcome.failed_markets.len();
        self.enrichment_failures += outcome.save.enrichment_failures;
    }
}

/// Number of years in the inclusive range, zero when it is empty.
fn year_count(start_year: i32, end_year: i32) -> u64 {
    (i64::from(end_year) - i64::from(start_year) + 1).max(0) as u64
}

impl<'a> ChartBuilder<'a> {
    pub fn new(catalog: &'a dyn CatalogApi, sleeper: &'a dyn Sleeper, params: &'a RunParams) -> Self {
        Self {
            catalog,
            sleeper,
            params,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Aggregate, rank and persist a single year.
    pub fn run_for_year(&self, db: &Database, year: i32, dry_run: bool) -> Result<YearOutcome> {
        log::info!("Aggregating {year}");
        let aggregation = self.aggregate_for_markets(year, &self.params.markets, self.params.per_market_fetch);
        let entries = rank::build_chart_entries(&aggregation.accumulator, self.params.top_k, self.params.ranking);

        let save = self
            .save_chart(db, year, &entries, Utc::now(), dry_run)
            .with_context(|| format!("Failed to save chart for {year}"))?;

        Ok(YearOutcome {
            year,
            albums_seen: aggregation.accumulator.len(),
            failed_markets: aggregation.failed_markets,
            save,
        })
    }

    /// Build charts for every year in the configured range, in order.
    /// Any error aborts the run; years already written stay written.
    pub fn run_years(&self, db: &Database, dry_run: bool) -> Result<RunSummary> {
        let p = self.params;
        log::info!(
            "Run years {}-{} | per_market_fetch={} | top_k={} | markets={}",
            p.start_year,
            p.end_year,
            p.per_market_fetch,
            p.top_k,
            p.markets.join(",")
        );

        let total = year_count(p.start_year, p.end_year);
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template("  [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} years {msg}")
                .unwrap()
                .progress_chars("##-"),
        );

        let mut summary = RunSummary::default();
        for year in p.start_year..=p.end_year {
            pb.set_message(year.to_string());
            let outcome = self.run_for_year(db, year, dry_run)?;
            summary.add(&outcome);
            pb.inc(1);
        }

        pb.finish_with_message("done");
        Ok(summary)
    }
}
