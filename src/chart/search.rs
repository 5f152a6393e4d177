use crate::catalog::{AlbumItem, CatalogError, MAX_PAGE_SIZE, SearchQuery};

use super::ChartBuilder;

impl ChartBuilder<'_> {
    /// Page through the search endpoint for one market until `want` albums
    /// have been collected or the catalog runs dry.
    ///
    /// Stops on an empty page or on a page shorter than requested. Sleeps
    /// the configured inter-call delay after every non-empty page.
    pub fn search_albums_year_market(
        &self,
        year: i32,
        market: &str,
        want: usize,
    ) -> Result<Vec<AlbumItem>, CatalogError> {
        let mut items = Vec::new();
        let mut remaining = want;
        let mut offset = 0;

        while remaining > 0 {
            let limit = remaining.min(MAX_PAGE_SIZE);
            let query = SearchQuery { year, market, limit, offset };
            let label = format!("search {year}/{market} offset {offset}");

            let batch = self
                .retry
                .call(self.sleeper, &label, || self.catalog.search_albums(&query))?;
            if batch.is_empty() {
                break;
            }

            let got = batch.len();
            items.extend(batch);
            remaining = remaining.saturating_sub(got);
            offset += got;
            self.sleeper.sleep(self.params.inter_call_delay);

            if got < limit {
                break; // Last page
            }
        }

        log::debug!("{year}/{market}: {} albums fetched", items.len());
        Ok(items)
    }
}
