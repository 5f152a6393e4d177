use std::cell::RefCell;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use ureq::Body;
use ureq::http::Response;

use super::{AlbumDetail, AlbumItem, CatalogApi, CatalogError, SearchQuery, SearchResponse};

/// Refresh the access token this long before it actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Connection settings for the catalog service.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
    pub timeout: Duration,
}

/// Token endpoint response for the client-credentials grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Blocking HTTP client for the catalog search and album endpoints.
///
/// Authenticates once with the client-credentials grant and re-authenticates
/// transparently when the token is about to expire (runs over many years
/// outlive a single token).
pub struct CatalogClient {
    agent: ureq::Agent,
    settings: CatalogSettings,
    token: RefCell<AccessToken>,
}

impl CatalogClient {
    /// Build the HTTP agent and obtain the first access token.
    pub fn connect(settings: CatalogSettings) -> Result<Self, CatalogError> {
        let agent = build_agent(settings.timeout);
        let token = request_token(&agent, &settings)?;
        log::info!("Authenticated against {}", settings.token_url);

        Ok(Self {
            agent,
            settings,
            token: RefCell::new(token),
        })
    }

    fn bearer(&self) -> Result<String, CatalogError> {
        if !self.token.borrow().is_fresh() {
            log::debug!("Access token expiring, refreshing");
            let fresh = request_token(&self.agent, &self.settings)?;
            *self.token.borrow_mut() = fresh;
        }
        Ok(format!("Bearer {}", self.token.borrow().value))
    }
}

impl CatalogApi for CatalogClient {
    fn search_albums(&self, query: &SearchQuery<'_>) -> Result<Vec<AlbumItem>, CatalogError> {
        let url = format!("{}/search", self.settings.api_base);
        log::debug!(
            "GET {url} year={} market={} limit={} offset={}",
            query.year, query.market, query.limit, query.offset
        );

        let response = self
            .agent
            .get(&url)
            .query("q", format!("year:{}", query.year))
            .query("type", "album")
            .query("limit", query.limit.to_string())
            .query("offset", query.offset.to_string())
            .query("market", query.market)
            .header("Authorization", self.bearer()?.as_str())
            .call()?;

        let body: SearchResponse = read_json(response)?;
        Ok(body.into_items())
    }

    fn album_track_titles(&self, album_id: &str) -> Result<Vec<String>, CatalogError> {
        let url = format!("{}/albums/{album_id}", self.settings.api_base);
        log::debug!("GET {url}");

        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer()?.as_str())
            .call()?;

        let detail: AlbumDetail = read_json(response)?;
        Ok(detail.track_titles())
    }
}

/// Agent that hands non-2xx responses back instead of erroring.
fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Exchange client credentials for an access token.
fn request_token(agent: &ureq::Agent, settings: &CatalogSettings) -> Result<AccessToken, CatalogError> {
    let credentials = BASE64.encode(format!("{}:{}", settings.client_id, settings.client_secret));

    let response = agent
        .post(&settings.token_url)
        .header("Authorization", format!("Basic {credentials}").as_str())
        .send_form([("grant_type", "client_credentials")])?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(CatalogError::Auth(format!(
            "token endpoint returned HTTP {status}"
        )));
    }

    let token: TokenResponse = read_json(response)?;
    Ok(AccessToken {
        value: token.access_token,
        expires_at: Instant::now() + Duration::from_secs(token.expires_in),
    })
}

/// Turn a response into `T`, or into a status error carrying `Retry-After`.
fn read_json<T: DeserializeOwned>(mut response: Response<Body>) -> Result<T, CatalogError> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(CatalogError::Status {
            status: status.as_u16(),
            retry_after,
        });
    }

    response
        .body_mut()
        .read_json::<T>()
        .map_err(|e| CatalogError::Decode(e.to_string()))
}

/// Parse a `Retry-After` value given in seconds. HTTP-date values are
/// ignored and fall back to the local backoff schedule.
fn parse_retry_after(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}
