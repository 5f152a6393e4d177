use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::db::Database;
use crate::db::models::{AlbumRecord, ChartRecord};

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Result of seeding the album table from charts.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub chart_rows: usize,
    pub albums_written: usize,
}

/// URL-friendly form of a title: lower-case, punctuation stripped,
/// whitespace runs collapsed to a single hyphen.
pub fn slugify(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    WHITESPACE_RUN.replace_all(&stripped, "-").into_owned()
}

/// Year from a release date like `1999-05-17` or `1999`.
fn release_year(release_date: &str) -> Option<i32> {
    let prefix = release_date.get(..4)?;
    if prefix.bytes().all(|b| b.is_ascii_digit()) {
        prefix.parse().ok()
    } else {
        None
    }
}

/// Build the album row for a chart entry, keeping any rating already stored.
fn album_from_chart(record: &ChartRecord, existing: Option<&AlbumRecord>) -> AlbumRecord {
    let title = record.title.trim().to_string();
    AlbumRecord {
        album_id: record.item_id.clone(),
        title_lower: title.to_lowercase(),
        title_slug: slugify(&title),
        title,
        artist: record.artist.trim().to_string(),
        cover: record.cover.clone(),
        songs: record.track_titles.clone(),
        year: release_year(&record.release_date),
        average_rating: existing.map(|a| a.average_rating).unwrap_or(0.0),
        ratings_count: existing.map(|a| a.ratings_count).unwrap_or(0),
    }
}

/// Copy every album that appears in a stored chart into the album table.
/// Each album id is written once, from its first chart row.
pub fn seed_albums_from_charts(db: &Database) -> Result<SeedResult> {
    let rows = db
        .all_chart_records()
        .context("Failed to read chart rows")?;

    let mut result = SeedResult {
        chart_rows: rows.len(),
        ..SeedResult::default()
    };
    let mut seen: HashSet<&str> = HashSet::new();

    for row in &rows {
        if row.item_id.is_empty() || !seen.insert(row.item_id.as_str()) {
            continue;
        }

        let existing = db
            .get_album(&row.item_id)
            .with_context(|| format!("Failed to read album {}", row.item_id))?;
        let album = album_from_chart(row, existing.as_ref());
        db.upsert_album(&album)
            .with_context(|| format!("Failed to write album {}", row.item_id))?;

        result.albums_written += 1;
        log::info!("Seeded album: {} - {} ({})", album.artist, album.title, album.album_id);
    }

    Ok(result)
}
