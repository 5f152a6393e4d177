use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::catalog::AlbumItem;

use super::ChartBuilder;

/// Popularity signals gathered for one album across markets.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumTally {
    pub popularity_sum: f64,
    pub observations: u32,
    /// Most recently observed payload for this album.
    pub album: AlbumItem,
    pub markets: BTreeSet<String>,
}

impl AlbumTally {
    pub fn mean_popularity(&self) -> f64 {
        if self.observations == 0 {
            0.0
        } else {
            self.popularity_sum / f64::from(self.observations)
        }
    }
}

/// Album id -> tally, iterated in first-observation order.
pub type Accumulator = IndexMap<String, AlbumTally>;

/// Outcome of fetching one market.
#[derive(Debug)]
pub enum MarketFetch {
    Fetched { market: String, items: Vec<AlbumItem> },
    Failed { market: String, reason: String },
}

/// Accumulator for a year plus the markets that could not be fetched.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub accumulator: Accumulator,
    pub failed_markets: Vec<String>,
}

impl ChartBuilder<'_> {
    /// Fetch every market for `year`. A failing market is recorded and
    /// does not stop the remaining ones.
    pub fn fetch_markets(&self, year: i32, markets: &[String], per_market_fetch: usize) -> Vec<MarketFetch> {
        markets
            .iter()
            .map(|market| {
                log::info!("{year}: fetching market {market}");
                match self.search_albums_year_market(year, market, per_market_fetch) {
                    Ok(items) => MarketFetch::Fetched { market: market.clone(), items },
                    Err(e) => MarketFetch::Failed { market: market.clone(), reason: e.to_string() },
                }
            })
            .collect()
    }

    /// Fetch all markets and fold the successful ones into an accumulator.
    pub fn aggregate_for_markets(&self, year: i32, markets: &[String], per_market_fetch: usize) -> Aggregation {
        let mut aggregation = Aggregation::default();

        for fetch in self.fetch_markets(year, markets, per_market_fetch) {
            match fetch {
                MarketFetch::Fetched { market, items } => {
                    fold_market(&mut aggregation.accumulator, year, &market, &items);
                }
                MarketFetch::Failed { market, reason } => {
                    log::warn!("{year} market {market}: {reason}");
                    aggregation.failed_markets.push(market);
                }
            }
        }

        log::info!(
            "{year}: {} albums accumulated, {} markets failed",
            aggregation.accumulator.len(),
            aggregation.failed_markets.len()
        );
        aggregation
    }
}

/// True for full albums released in `year` (release date starts with it).
pub fn matches_year(album: &AlbumItem, year: i32) -> bool {
    if album.album_type.as_deref() != Some("album") {
        return false;
    }
    let release = album.release_date.as_deref().unwrap_or("");
    release.get(..4) == Some(year.to_string().as_str())
}

/// Add one market's search results to the accumulator.
pub fn fold_market(acc: &mut Accumulator, year: i32, market: &str, items: &[AlbumItem]) {
    for album in items {
        if !matches_year(album, year) {
            continue;
        }
        let Some(id) = album.id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };

        let popularity = f64::from(album.popularity.unwrap_or(0));
        let tally = acc.entry(id.to_string()).or_insert_with(|| AlbumTally {
            popularity_sum: 0.0,
            observations: 0,
            album: album.clone(),
            markets: BTreeSet::new(),
        });
        tally.popularity_sum += popularity;
        tally.observations += 1;
        tally.album = album.clone();
        tally.markets.insert(market.to_string());
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::testing::{RecordingSleeper, StubCatalog, album};
    use crate::chart::tests::params;

    use super::*;

    #[test]
    fn test_matches_year() {
        assert!(matches_year(&album("a", "X", "Y", "1999-05-17", 1), 1999));
        assert!(matches_year(&album("a", "X", "Y", "1999", 1), 1999));
        assert!(!matches_year(&album("a", "X", "Y", "2009-01-01", 1), 1999));
        assert!(!matches_year(&album("a", "X", "Y", "199", 1), 1999));
        assert!(!matches_year(&album("a", "X", "Y", "", 1), 1999));

        let mut single = album("a", "X", "Y", "1999-01-01", 1);
        single.album_type = Some("single".into());
        assert!(!matches_year(&single, 1999));
    }

    #[test]
    fn test_fold_filters_other_years() {
        let mut acc = Accumulator::new();
        let items = vec![
            album("a", "X", "In", "1999-03-01", 10),
            album("b", "X", "Reissue", "2005-03-01", 90),
            album("c", "X", "Early", "1998-12-31", 90),
        ];
        fold_market(&mut acc, 1999, "US", &items);

        assert_eq!(acc.len(), 1);
        assert!(acc.contains_key("a"));
        assert!(!acc.contains_key("b"));
        assert!(!acc.contains_key("c"));
    }

    #[test]
    fn test_fold_accumulates_across_markets() {
        let mut acc = Accumulator::new();
        fold_market(&mut acc, 1999, "US", &[album("a", "X", "Y", "1999", 40)]);
        fold_market(&mut acc, 1999, "GB", &[album("a", "X", "Y", "1999", 60), album("b", "Z", "W", "1999", 5)]);

        let a = &acc["a"];
        assert_eq!(a.observations, 2);
        assert_eq!(a.popularity_sum, 100.0);
        assert_eq!(a.mean_popularity(), 50.0);
        assert_eq!(a.markets.iter().collect::<Vec<_>>(), vec!["GB", "US"]);
        assert_eq!(a.album.popularity, Some(60));

        // First-observation order
        assert_eq!(acc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_fold_skips_missing_ids_and_defaults_popularity() {
        let mut acc = Accumulator::new();
        let mut no_id = album("", "X", "Y", "1999", 10);
        no_id.id = None;
        let mut no_pop = album("p", "X", "Y", "1999", 0);
        no_pop.popularity = None;
        fold_market(&mut acc, 1999, "US", &[no_id, album("", "X", "Y", "1999", 3), no_pop]);

        assert_eq!(acc.len(), 1);
        assert_eq!(acc["p"].popularity_sum, 0.0);
        assert_eq!(acc["p"].observations, 1);
    }

    #[test]
    fn test_failed_market_does_not_abort() {
        let mut catalog = StubCatalog::with_albums(vec![album("a", "X", "Y", "1999", 10)]);
        catalog.failing_markets.insert("GB".to_string());
        let sleeper = RecordingSleeper::default();
        let p = params();
        let builder = ChartBuilder::new(&catalog, &sleeper, &p);

        let markets = vec!["US".to_string(), "GB".to_string(), "DE".to_string()];
        let aggregation = builder.aggregate_for_markets(1999, &markets, 10);

        assert_eq!(aggregation.failed_markets, vec!["GB"]);
        let a = &aggregation.accumulator["a"];
        assert_eq!(a.observations, 2);
        assert!(a.markets.contains("US") && a.markets.contains("DE"));
    }

    #[test]
    fn test_fetch_markets_reports_each_market() {
        let mut catalog = StubCatalog::with_albums(vec![album("a", "X", "Y", "1999", 10)]);
        catalog.failing_markets.insert("US".to_string());
        let sleeper = RecordingSleeper::default();
        let p = params();
        let builder = ChartBuilder::new(&catalog, &sleeper, &p);

        let fetches = builder.fetch_markets(1999, &["US".to_string(), "IT".to_string()], 5);
        assert_eq!(fetches.len(), 2);
        assert!(matches!(&fetches[0], MarketFetch::Failed { market, .. } if market == "US"));
        assert!(matches!(&fetches[1], MarketFetch::Fetched { market, items } if market == "IT" && items.len() == 1));
    }
}
