//! Tracker HTTP client

use std::time::Duration;

use async_trait::async_trait;
use felarr_core::{FelarrError, ReleaseRecord, ReleaseSource, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::parser;

const SERVICE: &str = "tracker";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    /// Advanced-search query. The default hunts dual-layer Profile 7
    /// releases, which announce themselves as BL+EL+RPU.
    pub search_term: String,
    /// Session cookie pair for the private tracker.
    pub uid: String,
    pub pass: String,
    pub timeout: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iptorrents.com".to_string(),
            search_term: "BL+EL+RPU".to_string(),
            uid: String::new(),
            pass: String::new(),
            timeout: 30,
        }
    }
}

#[derive(Debug)]
pub struct TrackerClient {
    config: TrackerConfig,
    client: Client,
    base_url: Url,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| FelarrError::ConfigurationError {
                field: "tracker.base_url".to_string(),
                message: format!("invalid base URL: {}", e),
            })?;

        let mut headers = HeaderMap::new();
        if !config.uid.is_empty() {
            let cookie = format!("uid={}; pass={}", config.uid, config.pass);
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&cookie).map_err(|e| FelarrError::ConfigurationError {
                    field: "tracker.uid".to_string(),
                    message: format!("invalid cookie value: {}", e),
                })?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .pool_max_idle_per_host(10)
            .default_headers(headers)
            .user_agent("Felarr/0.3")
            .build()
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    fn search_url(&self) -> Result<Url> {
        let mut url = self
            .base_url
            .join("/t")
            .map_err(|e| FelarrError::malformed(SERVICE, e))?;
        url.query_pairs_mut()
            .append_pair("q", &self.config.search_term)
            .append_pair("qf", "adv");
        Ok(url)
    }

    /// Fetch the current search snapshot. A login redirect page (no rows,
    /// login form present) means the session cookies have gone stale.
    pub async fn fetch_snapshot(&self) -> Result<Vec<ReleaseRecord>> {
        let url = self.search_url()?;
        debug!(%url, "polling tracker");

        let response = self
            .client
            .get(url)
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

        let releases = parser::parse_releases(&body, &self.base_url)?;
        if releases.is_empty() && body.contains("name=\"password\"") {
            return Err(FelarrError::protocol(
                SERVICE,
                401,
                "login form returned; session cookies expired",
            ));
        }

        info!(count = releases.len(), "tracker snapshot fetched");
        Ok(releases)
    }
}

#[async_trait]
impl ReleaseSource for TrackerClient {
    async fn poll(&self) -> Result<Vec<ReleaseRecord>> {
        self.fetch_snapshot().await
    }
}
