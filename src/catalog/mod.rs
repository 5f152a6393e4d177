pub mod client;
pub mod retry;

use serde::Deserialize;
use thiserror::Error;

pub use client::{CatalogClient, CatalogSettings};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};

/// Largest page the search endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Non-2xx response. `retry_after` is the server's wait hint in seconds.
    #[error("catalog returned HTTP {status}")]
    Status { status: u16, retry_after: Option<f64> },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] ureq::Error),
    #[error("failed to decode catalog response: {0}")]
    Decode(String),
    #[error("catalog authentication failed: {0}")]
    Auth(String),
}

impl CatalogError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One page request against the album search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery<'a> {
    pub year: i32,
    pub market: &'a str,
    pub limit: usize,
    pub offset: usize,
}

/// The two catalog calls the chart builder needs.
///
/// Implemented by [`CatalogClient`] over HTTP and by stubs in tests.
pub trait CatalogApi {
    /// Fetch one page of albums matching `year:{year}` in a market.
    fn search_albums(&self, query: &SearchQuery<'_>) -> Result<Vec<AlbumItem>, CatalogError>;

    /// Fetch the track titles of a single album.
    fn album_track_titles(&self, album_id: &str) -> Result<Vec<String>, CatalogError>;
}

/// Simplified album object as returned by the search endpoint.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AlbumItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub popularity: Option<u32>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl AlbumItem {
    /// Name of the first listed artist.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().and_then(|a| a.name.as_deref())
    }

    /// URL of the first (largest) cover image.
    pub fn cover_url(&self) -> Option<&str> {
        self.images.first().and_then(|i| i.url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ArtistRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ImageRef {
    pub url: Option<String>,
}

/// Search endpoint response: `{"albums": {"items": [...]}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResponse {
    pub albums: Option<AlbumPage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AlbumPage {
    /// The catalog occasionally returns `null` slots inside a page.
    #[serde(default)]
    pub items: Vec<Option<AlbumItem>>,
}

impl SearchResponse {
    pub fn into_items(self) -> Vec<AlbumItem> {
        self.albums
            .map(|page| page.items.into_iter().flatten().collect())
            .unwrap_or_default()
    }
}

/// Album detail response; only the track listing is read.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AlbumDetail {
    pub tracks: Option<TrackPage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TrackPage {
    #[serde(default)]
    pub items: Vec<TrackItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TrackItem {
    pub name: Option<String>,
}

impl AlbumDetail {
    pub fn track_titles(self) -> Vec<String> {
        self.tracks
            .map(|page| page.items.into_iter().filter_map(|t| t.name).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by catalog and chart tests.

    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use super::{AlbumItem, ArtistRef, CatalogApi, CatalogError, ImageRef, SearchQuery, Sleeper};

    /// Records every requested sleep instead of blocking.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: RefCell<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn total(&self) -> Duration {
            self.slept.borrow().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    pub fn album(id: &str, artist: &str, title: &str, release_date: &str, popularity: u32) -> AlbumItem {
        AlbumItem {
            id: Some(id.to_string()),
            name: Some(title.to_string()),
            album_type: Some("album".to_string()),
            release_date: Some(release_date.to_string()),
            popularity: Some(popularity),
            artists: vec![ArtistRef { name: Some(artist.to_string()) }],
            images: vec![ImageRef { url: Some(format!("https://img.example/{id}.jpg")) }],
        }
    }

    /// In-memory catalog. Every market sees the same album list unless it
    /// has an override or is marked as failing.
    #[derive(Default)]
    pub struct StubCatalog {
        pub albums: Vec<AlbumItem>,
        pub per_market: HashMap<String, Vec<AlbumItem>>,
        pub failing_markets: HashSet<String>,
        pub failing_details: HashSet<String>,
        pub search_calls: RefCell<Vec<(String, usize, usize)>>,
        pub detail_calls: RefCell<Vec<String>>,
    }

    impl StubCatalog {
        pub fn with_albums(albums: Vec<AlbumItem>) -> Self {
            Self { albums, ..Self::default() }
        }
    }

    impl CatalogApi for StubCatalog {
        fn search_albums(&self, query: &SearchQuery<'_>) -> Result<Vec<AlbumItem>, CatalogError> {
            self.search_calls
                .borrow_mut()
                .push((query.market.to_string(), query.limit, query.offset));
            if self.failing_markets.contains(query.market) {
                return Err(CatalogError::Status { status: 404, retry_after: None });
            }
            let source = self.per_market.get(query.market).unwrap_or(&self.albums);
            Ok(source
                .iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect())
        }

        fn album_track_titles(&self, album_id: &str) -> Result<Vec<String>, CatalogError> {
            self.detail_calls.borrow_mut().push(album_id.to_string());
            if self.failing_details.contains(album_id) {
                return Err(CatalogError::Status { status: 403, retry_after: None });
            }
            Ok(vec![format!("{album_id} track 1"), format!("{album_id} track 2")])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_skips_null_items() {
        let json = r#"{"albums": {"items": [
            {"id": "a1", "name": "Play", "album_type": "album", "release_date": "1999-05-17",
             "artists": [{"name": "Moby"}], "images": [{"url": "https://i/1.jpg"}]},
            null
        ]}}"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        let items = resp.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].primary_artist(), Some("Moby"));
        assert_eq!(items[0].cover_url(), Some("https://i/1.jpg"));
        assert_eq!(items[0].popularity, None);
    }

    #[test]
    fn test_search_response_without_albums() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.into_items().is_empty());
    }

    #[test]
    fn test_album_detail_track_titles() {
        let json = r#"{"id": "a1", "tracks": {"items": [{"name": "Honey"}, {"name": "Find My Baby"}, {}]}}"#;
        let detail: AlbumDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.track_titles(), vec!["Honey", "Find My Baby"]);
    }

    #[test]
    fn test_album_without_artists_or_images() {
        let item: AlbumItem = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(item.primary_artist(), None);
        assert_eq!(item.cover_url(), None);
    }
}
