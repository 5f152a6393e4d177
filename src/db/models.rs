use serde::Serialize;

/// Value of the `source` column for charts built from the catalog.
pub const CHART_SOURCE: &str = "external-catalog";

/// One ranked row of a yearly chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRecord {
    /// Year as a string; partition key together with `rank`.
    pub chart_key: String,
    pub rank: i64,
    pub year: i32,
    pub item_id: String,
    pub title: String,
    pub artist: String,
    pub release_date: String,
    pub cover: String,
    pub source: String,
    /// ISO-8601 UTC, second precision.
    pub fetched_at: String,
    pub track_titles: Vec<String>,
}

/// Stored chart years with their entry counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartYear {
    pub chart_key: String,
    pub entries: i64,
    pub fetched_at: Option<String>,
}

/// An album in the catalog table, seeded from chart rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumRecord {
    pub album_id: String,
    pub title: String,
    pub title_lower: String,
    pub title_slug: String,
    pub artist: String,
    pub cover: String,
    pub songs: Vec<String>,
    pub year: Option<i32>,
    pub average_rating: f64,
    pub ratings_count: i64,
}
