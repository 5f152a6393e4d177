use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::models::{CHART_SOURCE, ChartRecord};
use crate::db::{self, Database};

use super::ChartBuilder;
use super::rank::ChartCandidate;

/// What happened when one year's chart was written.
#[derive(Debug, Default)]
pub struct SaveOutcome {
    pub records: Vec<ChartRecord>,
    pub duplicates_skipped: usize,
    pub enrichment_failures: usize,
    /// Rows from an earlier run still stored below the last written rank.
    pub stale_rows: usize,
}

/// Timestamp format for `fetched_at`.
pub fn format_fetched_at(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl ChartBuilder<'_> {
    /// Track titles for an album, or `None` if the lookup failed.
    pub fn album_track_titles(&self, album_id: &str) -> Option<Vec<String>> {
        let label = format!("album {album_id}");
        match self
            .retry
            .call(self.sleeper, &label, || self.catalog.album_track_titles(album_id))
        {
            Ok(titles) => Some(titles),
            Err(e) => {
                log::warn!("Album details for {album_id} not found: {e}");
                None
            }
        }
    }

    /// Enrich and write one year's chart as a single batch.
    ///
    /// Ranks are handed out 1, 2, ... to the entries actually written. An
    /// entry whose id was already written in this batch is skipped before
    /// enrichment. With `dry_run` nothing is written; the records that would
    /// have been are still returned.
    pub fn save_chart(
        &self,
        db: &Database,
        year: i32,
        entries: &[ChartCandidate],
        fetched_at: DateTime<Utc>,
        dry_run: bool,
    ) -> db::Result<SaveOutcome> {
        let chart_key = year.to_string();
        let fetched_at = format_fetched_at(fetched_at);

        let mut outcome = SaveOutcome::default();
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for entry in entries {
            if !seen_ids.insert(entry.item_id.as_str()) {
                log::warn!(
                    "Skipping duplicate: {} - {} (id={})",
                    entry.artist, entry.title, entry.item_id
                );
                outcome.duplicates_skipped += 1;
                continue;
            }

            let track_titles = match self.album_track_titles(&entry.item_id) {
                Some(titles) => titles,
                None => {
                    outcome.enrichment_failures += 1;
                    Vec::new()
                }
            };

            let rank = outcome.records.len() as i64 + 1;
            log::info!("{year} #{rank}: {} - {}", entry.artist, entry.title);

            outcome.records.push(ChartRecord {
                chart_key: chart_key.clone(),
                rank,
                year,
                item_id: entry.item_id.clone(),
                title: entry.title.clone(),
                artist: entry.artist.clone(),
                release_date: entry.release_date.clone(),
                cover: entry.cover.clone(),
                source: CHART_SOURCE.to_string(),
                fetched_at: fetched_at.clone(),
                track_titles,
            });
        }

        if dry_run {
            log::info!("{year}: dry run, {} records not written", outcome.records.len());
        } else {
            db.upsert_chart_records(&outcome.records)?;
            outcome.stale_rows = db.stale_chart_rows(&chart_key, outcome.records.len())?;
            if outcome.stale_rows > 0 {
                log::warn!(
                    "{year}: {} rows from an earlier run remain below rank {}",
                    outcome.stale_rows,
                    outcome.records.len()
                );
            }
        }

        Ok(outcome)
    }
}
