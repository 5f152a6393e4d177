pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode track list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid table name {0:?}")]
    InvalidTable(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex"));

/// True if `name` can be interpolated into SQL as a table identifier.
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME.is_match(name) && !name.eq_ignore_ascii_case("albums")
}

pub struct Database {
    pub conn: Connection,
    charts_table: String,
}

impl Database {
    /// Open (or create) the database, storing charts in `charts_table`.
    pub fn open(path: &Path, charts_table: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, charts_table)
    }

    pub fn open_in_memory(charts_table: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, charts_table)
    }

    fn with_connection(conn: Connection, charts_table: &str) -> Result<Self> {
        if !is_valid_table_name(charts_table) {
            return Err(DbError::InvalidTable(charts_table.to_string()));
        }
        let db = Self {
            conn,
            charts_table: charts_table.to_string(),
        };
        db.init()?;
        Ok(db)
    }

    pub fn charts_table(&self) -> &str {
        &self.charts_table
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.migrate()?;
        self.ensure_chart_table()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", 1)?;
        Ok(())
    }

    /// V1: album catalog seeded from charts
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS albums (
                album_id        TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                title_lower     TEXT NOT NULL,
                title_slug      TEXT NOT NULL,
                artist          TEXT NOT NULL,
                cover           TEXT NOT NULL DEFAULT '',
                songs           TEXT NOT NULL DEFAULT '[]', -- JSON array of track titles
                year            INTEGER,
                average_rating  REAL NOT NULL DEFAULT 0,
                ratings_count   INTEGER NOT NULL DEFAULT 0,
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_albums_title_lower ON albums(title_lower);
            CREATE INDEX IF NOT EXISTS idx_albums_slug ON albums(title_slug);
            CREATE INDEX IF NOT EXISTS idx_albums_year ON albums(year);
            ",
        )?;
        Ok(())
    }

    /// The chart table name is configurable, so it lives outside the
    /// versioned migrations.
    fn ensure_chart_table(&self) -> Result<()> {
        let t = &self.charts_table;
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {t} (
                chart_key       TEXT NOT NULL,
                rank            INTEGER NOT NULL,
                year            INTEGER NOT NULL,
                item_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                artist          TEXT NOT NULL,
                release_date    TEXT NOT NULL DEFAULT '',
                cover           TEXT NOT NULL DEFAULT '',
                source          TEXT NOT NULL,
                fetched_at      TEXT NOT NULL,
                track_titles    TEXT NOT NULL DEFAULT '[]', -- JSON array
                PRIMARY KEY (chart_key, rank)
            );

            CREATE INDEX IF NOT EXISTS idx_{t}_item ON {t}(item_id);
            "
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("charts"));
        assert!(is_valid_table_name("Charts_2024"));
        assert!(is_valid_table_name("_tmp"));
        assert!(!is_valid_table_name("2024charts"));
        assert!(!is_valid_table_name("charts-table"));
        assert!(!is_valid_table_name("charts; DROP TABLE x"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("albums"));
    }

    #[test]
    fn test_open_rejects_bad_table() {
        assert!(matches!(
            Database::open_in_memory("bad name"),
            Err(DbError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("charts.db");
        drop(Database::open(&path, "charts").unwrap());
        let db = Database::open(&path, "charts").unwrap();
        assert_eq!(db.charts_table(), "charts");
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
