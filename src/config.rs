use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::CatalogSettings;

/// Markets queried when none are configured.
pub const DEFAULT_MARKETS: &[&str] = &["US", "GB", "DE", "FR", "IT"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0} (set it in config.toml or the environment)")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How candidates are ordered before dedup and top-K truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Keep accumulator order (first observed album first). No score sort.
    #[default]
    FirstSeen,
    /// Sort by mean popularity across observations, highest first.
    MeanPopularity,
}

impl std::str::FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "first_seen" => Ok(Self::FirstSeen),
            "mean_popularity" => Ok(Self::MeanPopularity),
            other => Err(format!("expected first_seen or mean_popularity, got {other:?}")),
        }
    }
}

/// Application configuration loaded from TOML config file.
/// Everything but the table name and catalog credentials has a default.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the SQLite table holding chart rows.
    pub charts_table: Option<String>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Chart run parameters.
    pub run: RunConfig,
    /// Catalog API credentials and endpoints.
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub start_year: i32,
    pub end_year: i32,
    /// Albums requested per market (paged in blocks of at most 50).
    pub per_market_fetch: usize,
    pub top_k: usize,
    /// Pause after each search page, in seconds.
    pub sleep_between_calls: f64,
    pub markets: Vec<String>,
    pub ranking: RankingMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_year: 1970,
            end_year: 2025,
            per_market_fetch: 100,
            top_k: 20,
            sleep_between_calls: 0.25,
            markets: DEFAULT_MARKETS.iter().map(|m| m.to_string()).collect(),
            ranking: RankingMode::FirstSeen,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: String,
    pub token_url: String,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Validated, immutable parameters for one chart run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub start_year: i32,
    pub end_year: i32,
    pub per_market_fetch: usize,
    pub top_k: usize,
    pub inter_call_delay: Duration,
    pub markets: Vec<String>,
    pub ranking: RankingMode,
}

impl AppConfig {
    /// Load config from `~/.config/chartsmith/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on error.
    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in the binary.
    ///
    /// Plain string values are applied before any value that needs parsing,
    /// so a parse error still leaves credentials and names in place.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CHARTS_TABLE") {
            self.charts_table = Some(v);
        }
        if let Some(v) = get("CHARTSMITH_DB") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CATALOG_CLIENT_ID") {
            self.catalog.client_id = Some(v);
        }
        if let Some(v) = get("CATALOG_CLIENT_SECRET") {
            self.catalog.client_secret = Some(v);
        }
        if let Some(v) = get("CATALOG_API_BASE") {
            self.catalog.api_base = v;
        }
        if let Some(v) = get("CATALOG_TOKEN_URL") {
            self.catalog.token_url = v;
        }
        if let Some(v) = get("CHART_MARKETS") {
            self.run.markets = parse_markets(&v);
        }

        if let Some(v) = get("START_YEAR") {
            self.run.start_year = parse_value("START_YEAR", &v)?;
        }
        if let Some(v) = get("END_YEAR") {
            self.run.end_year = parse_value("END_YEAR", &v)?;
        }
        if let Some(v) = get("PER_MARKET_FETCH") {
            self.run.per_market_fetch = parse_value("PER_MARKET_FETCH", &v)?;
        }
        if let Some(v) = get("TOP_K") {
            self.run.top_k = parse_value("TOP_K", &v)?;
        }
        if let Some(v) = get("SLEEP_BETWEEN_CALL") {
            self.run.sleep_between_calls = parse_value("SLEEP_BETWEEN_CALL", &v)?;
        }
        if let Some(v) = get("CHART_RANKING") {
            self.run.ranking = parse_value("CHART_RANKING", &v)?;
        }
        Ok(())
    }

    /// The chart table name, validated as a plain SQL identifier.
    pub fn charts_table(&self) -> Result<String, ConfigError> {
        let table = self
            .charts_table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("CHARTS_TABLE"))?;
        if !crate::db::is_valid_table_name(table) {
            return Err(ConfigError::Invalid {
                key: "CHARTS_TABLE",
                value: table.to_string(),
                reason: "must be letters, digits and underscores, not starting with a digit"
                    .to_string(),
            });
        }
        Ok(table.to_string())
    }

    /// Validate the run section into [`RunParams`].
    pub fn run_params(&self) -> Result<RunParams, ConfigError> {
        let run = &self.run;
        if run.start_year > run.end_year {
            return Err(ConfigError::Invalid {
                key: "START_YEAR",
                value: run.start_year.to_string(),
                reason: format!("after END_YEAR {}", run.end_year),
            });
        }
        if run.top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "TOP_K",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let inter_call_delay = Duration::try_from_secs_f64(run.sleep_between_calls).map_err(|e| {
            ConfigError::Invalid {
                key: "SLEEP_BETWEEN_CALL",
                value: run.sleep_between_calls.to_string(),
                reason: e.to_string(),
            }
        })?;
        let markets: Vec<String> = run
            .markets
            .iter()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if markets.is_empty() {
            return Err(ConfigError::Invalid {
                key: "CHART_MARKETS",
                value: String::new(),
                reason: "at least one market is required".to_string(),
            });
        }

        Ok(RunParams {
            start_year: run.start_year,
            end_year: run.end_year,
            per_market_fetch: run.per_market_fetch,
            top_k: run.top_k,
            inter_call_delay,
            markets,
            ranking: run.ranking,
        })
    }

    /// Catalog credentials and endpoints. Both credentials are required.
    pub fn catalog_settings(&self) -> Result<CatalogSettings, ConfigError> {
        let required = |value: &Option<String>, key: &'static str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        Ok(CatalogSettings {
            client_id: required(&self.catalog.client_id, "CATALOG_CLIENT_ID")?,
            client_secret: required(&self.catalog.client_secret, "CATALOG_CLIENT_SECRET")?,
            api_base: self.catalog.api_base.trim_end_matches('/').to_string(),
            token_url: self.catalog.token_url.clone(),
            timeout: Duration::from_secs(self.catalog.timeout_secs),
        })
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Split a comma-separated market list.
pub fn parse_markets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .collect()
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("chartsmith.db")
    } else {
        // Fallback: current directory
        PathBuf::from("chartsmith.db")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        let params = config.run_params().unwrap();
        assert_eq!(params.start_year, 1970);
        assert_eq!(params.end_year, 2025);
        assert_eq!(params.per_market_fetch, 100);
        assert_eq!(params.top_k, 20);
        assert_eq!(params.inter_call_delay, Duration::from_millis(250));
        assert_eq!(params.markets, vec!["US", "GB", "DE", "FR", "IT"]);
        assert_eq!(params.ranking, RankingMode::FirstSeen);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("CHARTS_TABLE", "charts"),
                ("START_YEAR", "1999"),
                ("END_YEAR", "2001"),
                ("PER_MARKET_FETCH", "10"),
                ("TOP_K", "5"),
                ("SLEEP_BETWEEN_CALL", "0"),
                ("CHART_MARKETS", "us, gb"),
                ("CHART_RANKING", "mean-popularity"),
            ]))
            .unwrap();

        assert_eq!(config.charts_table().unwrap(), "charts");
        let params = config.run_params().unwrap();
        assert_eq!((params.start_year, params.end_year), (1999, 2001));
        assert_eq!(params.per_market_fetch, 10);
        assert_eq!(params.top_k, 5);
        assert_eq!(params.inter_call_delay, Duration::ZERO);
        assert_eq!(params.markets, vec!["US", "GB"]);
        assert_eq!(params.ranking, RankingMode::MeanPopularity);
    }

    #[test]
    fn test_unparsable_env_value() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("TOP_K", "twenty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TOP_K", .. }));
    }

    #[test]
    fn test_parse_error_keeps_plain_values() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[
                ("START_YEAR", "nineteen"),
                ("CHARTS_TABLE", "charts"),
                ("CATALOG_CLIENT_ID", "id"),
                ("CATALOG_CLIENT_SECRET", "secret"),
            ]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "START_YEAR", .. }));
        assert_eq!(config.charts_table().unwrap(), "charts");
        assert_eq!(config.catalog_settings().unwrap().client_id, "id");
    }

    #[test]
    fn test_missing_required_settings() {
        let config = AppConfig::default();
        assert!(matches!(config.charts_table(), Err(ConfigError::Missing("CHARTS_TABLE"))));
        assert!(matches!(
            config.catalog_settings(),
            Err(ConfigError::Missing("CATALOG_CLIENT_ID"))
        ));

        let mut config = AppConfig::default();
        config.apply_env(env(&[("CATALOG_CLIENT_ID", "id")])).unwrap();
        assert!(matches!(
            config.catalog_settings(),
            Err(ConfigError::Missing("CATALOG_CLIENT_SECRET"))
        ));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("CHARTS_TABLE", "  ")])).unwrap();
        assert!(matches!(config.charts_table(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_invalid_table_name() {
        let config = AppConfig {
            charts_table: Some("charts; DROP TABLE albums".to_string()),
            ..AppConfig::default()
        };
        assert!(matches!(config.charts_table(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_inverted_year_range() {
        let mut config = AppConfig::default();
        config.run.start_year = 2001;
        config.run.end_year = 1999;
        assert!(config.run_params().is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = AppConfig::default();
        config.run.top_k = 0;
        assert!(matches!(config.run_params(), Err(ConfigError::Invalid { key: "TOP_K", .. })));
    }

    #[test]
    fn test_catalog_settings_trim_api_base() {
        let mut config = AppConfig::default();
        config.catalog.client_id = Some("id".into());
        config.catalog.client_secret = Some("secret".into());
        config.catalog.api_base = "http://localhost:9000/v1/".into();
        let settings = config.catalog_settings().unwrap();
        assert_eq!(settings.api_base, "http://localhost:9000/v1");
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
charts_table = "year_charts"

[run]
start_year = 1990
end_year = 1995
top_k = 10
markets = ["JP", "BR"]
ranking = "mean_popularity"

[catalog]
client_id = "abc"
client_secret = "def"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path());
        assert_eq!(config.charts_table().unwrap(), "year_charts");
        let params = config.run_params().unwrap();
        assert_eq!(params.start_year, 1990);
        assert_eq!(params.top_k, 10);
        // Unset keys keep their defaults
        assert_eq!(params.per_market_fetch, 100);
        assert_eq!(params.markets, vec!["JP", "BR"]);
        assert_eq!(params.ranking, RankingMode::MeanPopularity);
        assert_eq!(config.catalog_settings().unwrap().client_id, "abc");
    }

    #[test]
    fn test_load_from_malformed_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "run = [not toml").unwrap();
        let config = AppConfig::load_from(file.path());
        assert!(config.charts_table.is_none());
        assert_eq!(config.run.top_k, 20);
    }

    #[test]
    fn test_parse_markets() {
        assert_eq!(parse_markets("us,GB, ,de"), vec!["US", "GB", "DE"]);
        assert!(parse_markets("").is_empty());
    }

    #[test]
    fn test_ranking_mode_from_str() {
        assert_eq!("first_seen".parse::<RankingMode>().unwrap(), RankingMode::FirstSeen);
        assert_eq!("Mean-Popularity".parse::<RankingMode>().unwrap(), RankingMode::MeanPopularity);
        assert!("loudest".parse::<RankingMode>().is_err());
    }
}
