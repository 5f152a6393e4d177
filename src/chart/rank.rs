use std::collections::HashSet;

use crate::config::RankingMode;

use super::aggregate::Accumulator;

/// Artist name used when the catalog lists none.
const UNKNOWN_ARTIST: &str = "Unknown";

/// A chart candidate before enrichment and rank assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartCandidate {
    pub item_id: String,
    pub title: String,
    pub artist: String,
    pub release_date: String,
    pub cover: String,
    pub mean_popularity: f64,
}

/// Turn the accumulator into at most `top_k` candidates.
///
/// With [`RankingMode::FirstSeen`] no score sort happens: candidates keep
/// accumulator order, so the chart is the first `top_k` albums to survive
/// dedup, which depends on market order and on the order the catalog
/// returned results. [`RankingMode::MeanPopularity`] stably sorts by mean
/// popularity first. Either way dedup keys on the lower-cased
/// `(artist, title)` pair and the first candidate wins.
pub fn build_chart_entries(acc: &Accumulator, top_k: usize, ranking: RankingMode) -> Vec<ChartCandidate> {
    let mut candidates: Vec<ChartCandidate> = acc
        .iter()
        .filter(|(_, tally)| tally.observations > 0)
        .map(|(id, tally)| ChartCandidate {
            item_id: id.clone(),
            title: tally.album.name.clone().unwrap_or_default(),
            artist: tally.album.primary_artist().unwrap_or(UNKNOWN_ARTIST).to_string(),
            release_date: tally.album.release_date.clone().unwrap_or_default(),
            cover: tally.album.cover_url().unwrap_or_default().to_string(),
            mean_popularity: tally.mean_popularity(),
        })
        .collect();

    if ranking == RankingMode::MeanPopularity {
        candidates.sort_by(|a, b| b.mean_popularity.total_cmp(&a.mean_popularity));
    }

    dedup_top_k(candidates, top_k)
}

/// Drop repeated `(artist, title)` pairs and keep the first `top_k`.
pub fn dedup_top_k(candidates: Vec<ChartCandidate>, top_k: usize) -> Vec<ChartCandidate> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut deduped = Vec::new();

    for c in candidates {
        if deduped.len() >= top_k {
            break;
        }
        let key = (c.artist.to_lowercase(), c.title.to_lowercase());
        if !seen.insert(key) {
            log::debug!("Dropping duplicate {} - {} ({})", c.artist, c.title, c.item_id);
            continue;
        }
        deduped.push(c);
    }

    deduped
}
