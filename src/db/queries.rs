use super::models::{AlbumRecord, ChartRecord, ChartYear};
use super::{Database, Result};
use rusqlite::{OptionalExtension, Row, params};

impl Database {
    /// Write chart rows in a single transaction, replacing any row already
    /// stored at the same `(chart_key, rank)`. Returns the number written.
    pub fn upsert_chart_records(&self, records: &[ChartRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (
                    chart_key, rank, year, item_id, title, artist,
                    release_date, cover, source, fetched_at, track_titles
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(chart_key, rank) DO UPDATE SET
                    year = excluded.year,
                    item_id = excluded.item_id,
                    title = excluded.title,
                    artist = excluded.artist,
                    release_date = excluded.release_date,
                    cover = excluded.cover,
                    source = excluded.source,
                    fetched_at = excluded.fetched_at,
                    track_titles = excluded.track_titles",
                self.charts_table()
            ))?;

            for r in records {
                let tracks = serde_json::to_string(&r.track_titles)?;
                stmt.execute(params![
                    r.chart_key, r.rank, r.year, r.item_id, r.title, r.artist,
                    r.release_date, r.cover, r.source, r.fetched_at, tracks,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// All rows of one year's chart, ordered by rank.
    pub fn get_chart(&self, chart_key: &str) -> Result<Vec<ChartRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT chart_key, rank, year, item_id, title, artist,
                    release_date, cover, source, fetched_at, track_titles
             FROM {} WHERE chart_key = ?1 ORDER BY rank",
            self.charts_table()
        ))?;

        let rows = stmt
            .query_map(params![chart_key], read_chart_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_chart_row).collect()
    }

    /// Every stored chart row, ordered by year then rank.
    pub fn all_chart_records(&self) -> Result<Vec<ChartRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT chart_key, rank, year, item_id, title, artist,
                    release_date, cover, source, fetched_at, track_titles
             FROM {} ORDER BY year, rank",
            self.charts_table()
        ))?;

        let rows = stmt
            .query_map([], read_chart_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_chart_row).collect()
    }

    /// Stored chart years with row counts and latest fetch time.
    pub fn chart_years(&self) -> Result<Vec<ChartYear>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT chart_key, COUNT(*), MAX(fetched_at)
             FROM {} GROUP BY chart_key ORDER BY chart_key",
            self.charts_table()
        ))?;

        let years = stmt
            .query_map([], |row| {
                Ok(ChartYear {
                    chart_key: row.get(0)?,
                    entries: row.get(1)?,
                    fetched_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(years)
    }

    /// Rows of a chart ranked below `ranks_written`, left over from an
    /// earlier, longer run.
    pub fn stale_chart_rows(&self, chart_key: &str, ranks_written: usize) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE chart_key = ?1 AND rank > ?2", self.charts_table()),
            params![chart_key, ranks_written as i64],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Look up one album by id.
    pub fn get_album(&self, album_id: &str) -> Result<Option<AlbumRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT album_id, title, title_lower, title_slug, artist, cover,
                        songs, year, average_rating, ratings_count
                 FROM albums WHERE album_id = ?1",
                params![album_id],
                |row| {
                    Ok((
                        AlbumRecord {
                            album_id: row.get(0)?,
                            title: row.get(1)?,
                            title_lower: row.get(2)?,
                            title_slug: row.get(3)?,
                            artist: row.get(4)?,
                            cover: row.get(5)?,
                            songs: Vec::new(),
                            year: row.get(7)?,
                            average_rating: row.get(8)?,
                            ratings_count: row.get(9)?,
                        },
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((mut album, songs)) => {
                album.songs = serde_json::from_str(&songs)?;
                Ok(Some(album))
            }
            None => Ok(None),
        }
    }

    /// Insert or update an album.
    pub fn upsert_album(&self, a: &AlbumRecord) -> Result<()> {
        let songs = serde_json::to_string(&a.songs)?;
        self.conn.execute(
            "INSERT INTO albums (
                album_id, title, title_lower, title_slug, artist, cover,
                songs, year, average_rating, ratings_count, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
            ON CONFLICT(album_id) DO UPDATE SET
                title = excluded.title,
                title_lower = excluded.title_lower,
                title_slug = excluded.title_slug,
                artist = excluded.artist,
                cover = excluded.cover,
                songs = excluded.songs,
                year = excluded.year,
                average_rating = excluded.average_rating,
                ratings_count = excluded.ratings_count,
                updated_at = datetime('now')",
            params![
                a.album_id, a.title, a.title_lower, a.title_slug, a.artist, a.cover,
                songs, a.year, a.average_rating, a.ratings_count,
            ],
        )?;
        Ok(())
    }

    /// Number of albums in the catalog table.
    pub fn album_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Raw chart row with the track list still JSON-encoded.
type RawChartRow = (ChartRecord, String);

fn read_chart_row(row: &Row<'_>) -> rusqlite::Result<RawChartRow> {
    Ok((
        ChartRecord {
            chart_key: row.get(0)?,
            rank: row.get(1)?,
            year: row.get(2)?,
            item_id: row.get(3)?,
            title: row.get(4)?,
            artist: row.get(5)?,
            release_date: row.get(6)?,
            cover: row.get(7)?,
            source: row.get(8)?,
            fetched_at: row.get(9)?,
            track_titles: Vec::new(),
        },
        row.get(10)?,
    ))
}

fn decode_chart_row((mut record, tracks): RawChartRow) -> Result<ChartRecord> {
    record.track_titles = serde_json::from_str(&tracks)?;
    Ok(record)
}
