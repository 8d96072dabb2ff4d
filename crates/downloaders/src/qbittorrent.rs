//! qBittorrent client
//!
//! Web API v2 with optional cookie-session login; empty credentials mean a
//! LAN-whitelisted instance and skip authentication entirely. `add_torrent`
//! is the one operation in the system that retries: exactly once, and only
//! on a transport failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use felarr_core::{AddTorrent, FelarrError, Result, TorrentProgress, TorrentQueue};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const SERVICE: &str = "qbittorrent";

/// Session re-login threshold.
const SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct QBittorrentConfig {
    /// Base URL of the Web UI, e.g. "http://localhost:8080".
    pub base_url: String,
    /// Empty username and password select LAN mode (no login).
    pub username: String,
    pub password: String,
    /// General request timeout in seconds.
    pub timeout: u64,
    /// Timeout for the add-torrent call, which can stall on tracker DNS.
    pub add_timeout: u64,
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            username: String::new(),
            password: String::new(),
            timeout: 30,
            add_timeout: 60,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    last_auth_time: Option<std::time::Instant>,
}

#[derive(Debug)]
pub struct QBittorrentClient {
    config: QBittorrentConfig,
    client: Client,
    base_url: Url,
    session_state: Arc<RwLock<SessionState>>,
}

#[derive(Debug, Deserialize)]
struct TorrentInfoRow {
    hash: String,
    state: String,
    progress: f64,
    /// Unix timestamp of when the torrent was added.
    #[serde(default)]
    added_on: i64,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| FelarrError::ConfigurationError {
                field: "qbittorrent.base_url".to_string(),
                message: format!("invalid base URL: {}", e),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .cookie_store(true)
            .build()
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        Ok(Self {
            config,
            client,
            base_url,
            session_state: Arc::new(RwLock::new(SessionState::default())),
        })
    }

    fn lan_mode(&self) -> bool {
        self.config.username.is_empty() && self.config.password.is_empty()
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| FelarrError::malformed(SERVICE, e))
    }

    async fn needs_authentication(&self) -> bool {
        if self.lan_mode() {
            return false;
        }
        let state = self.session_state.read().await;
        if !state.authenticated {
            return true;
        }
        state
            .last_auth_time
            .map(|t| t.elapsed() > SESSION_MAX_AGE)
            .unwrap_or(true)
    }

    async fn ensure_authenticated(&self) -> Result<()> {
        if self.needs_authentication().await {
            self.login().await?;
        }
        Ok(())
    }

    /// Establish a SID cookie session. The API answers 200 "Fails." on bad
    /// credentials, so the body has to be inspected.
    pub async fn login(&self) -> Result<()> {
        let url = self.join("api/v2/auth/login")?;
        debug!(%url, "logging in to qBittorrent");

        let response = self
            .client
            .post(url)
            .form(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        if !status.is_success() {
            return Err(FelarrError::protocol(SERVICE, status.as_u16(), &body));
        }
        if body.to_lowercase().contains("fails") {
            return Err(FelarrError::protocol(
                SERVICE,
                403,
                "authentication failed: invalid credentials",
            ));
        }

        let mut state = self.session_state.write().await;
        state.authenticated = true;
        state.last_auth_time = Some(std::time::Instant::now());
        info!("qBittorrent session established");
        Ok(())
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.ensure_authenticated().await?;
        let url = self.join("api/v2/app/version")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FelarrError::protocol(SERVICE, status.as_u16(), &body));
        }
        Ok(())
    }

    /// Torrent hash embedded in a magnet URI, uppercased.
    fn hash_from_magnet(uri: &str) -> Option<String> {
        let start = uri.find("xt=urn:btih:")? + "xt=urn:btih:".len();
        let rest = &uri[start..];
        let hash = rest.split('&').next().unwrap_or(rest);
        if hash.is_empty() {
            None
        } else {
            Some(hash.to_uppercase())
        }
    }

    async fn add_torrent_once(&self, request: &AddTorrent) -> Result<()> {
        let url = self.join("api/v2/torrents/add")?;

        let form = [
            ("urls", request.url.as_str()),
            ("savepath", request.save_path.as_str()),
            ("category", request.category.as_str()),
            ("paused", if request.paused { "true" } else { "false" }),
            (
                "sequentialDownload",
                if request.sequential { "true" } else { "false" },
            ),
        ];

        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.config.add_timeout))
            .form(&form)
            .send()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        if !status.is_success() {
            return Err(FelarrError::protocol(SERVICE, status.as_u16(), &body));
        }
        // The add endpoint reports an unusable torrent as 200 "Fails."
        if body.trim().eq_ignore_ascii_case("fails.") {
            return Err(FelarrError::protocol(SERVICE, 415, "torrent rejected"));
        }
        Ok(())
    }

    async fn fetch_torrent_rows(&self, query: &str, value: &str) -> Result<Vec<TorrentInfoRow>> {
        self.ensure_authenticated().await?;
        let mut url = self.join("api/v2/torrents/info")?;
        url.query_pairs_mut().append_pair(query, value);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FelarrError::protocol(SERVICE, status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| FelarrError::malformed(SERVICE, e))
    }

    async fn fetch_torrent_info(&self, hash: &str) -> Result<Option<TorrentInfoRow>> {
        let mut rows = self
            .fetch_torrent_rows("hashes", &hash.to_lowercase())
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    /// Hash of the most recently added torrent in a category. The add
    /// endpoint returns no identifier, so this is how a hash is recovered
    /// for both magnet and .torrent submissions.
    async fn latest_hash_in_category(&self, category: &str) -> Result<Option<String>> {
        let rows = self.fetch_torrent_rows("category", category).await?;
        Ok(rows
            .into_iter()
            .max_by_key(|row| row.added_on)
            .map(|row| row.hash))
    }
}

#[async_trait]
impl TorrentQueue for QBittorrentClient {
    async fn add_torrent(&self, request: &AddTorrent) -> Result<Option<String>> {
        self.ensure_authenticated().await?;

        debug!(
            save_path = request.save_path.as_str(),
            category = request.category.as_str(),
            "submitting torrent"
        );

        match self.add_torrent_once(request).await {
            Ok(()) => {}
            Err(err) if err.is_transport() => {
                warn!(%err, "add_torrent transport failure; retrying once");
                self.add_torrent_once(request).await?;
            }
            Err(err) => return Err(err),
        }

        info!(category = request.category.as_str(), "torrent queued");

        // the add endpoint answers a bare "Ok."; the hash comes from the
        // category listing, for .torrent URLs as well as magnets
        match self.latest_hash_in_category(&request.category).await {
            Ok(Some(hash)) => Ok(Some(hash)),
            Ok(None) => Ok(Self::hash_from_magnet(&request.url)),
            Err(err) => {
                warn!(%err, "hash recovery after add failed");
                Ok(Self::hash_from_magnet(&request.url))
            }
        }
    }

    async fn torrent_progress(&self, hash: &str) -> Result<Option<TorrentProgress>> {
        Ok(self
            .fetch_torrent_info(hash)
            .await?
            .map(|row| TorrentProgress {
                hash: row.hash,
                state: row.state,
                progress: row.progress,
            }))
    }
}
