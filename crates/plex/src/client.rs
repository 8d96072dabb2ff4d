//! Plex HTTP client
//!
//! Thin typed wrapper over the Plex XML API on a keep-alive connection
//! pool. Transport, protocol and parse failures surface as the distinct
//! error kinds the rest of the system dispatches on.

use std::time::Duration;

use felarr_core::{FelarrError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::xml;

const SERVICE: &str = "plex";

/// Page size for section listings.
const CONTAINER_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct PlexConfig {
    /// Base URL of the server, e.g. "http://plex.lan:32400".
    pub base_url: String,
    pub token: String,
    /// Name of the movie library section to scan.
    pub library_name: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Timeout for the full section listing, which can be large.
    pub listing_timeout: u64,
}

impl Default for PlexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:32400".to_string(),
            token: String::new(),
            library_name: "Movies".to_string(),
            timeout: 30,
            listing_timeout: 300,
        }
    }
}

/// A collection as listed by Plex.
#[derive(Debug, Clone)]
pub struct PlexCollection {
    pub key: String,
    pub title: String,
}

/// A library item reference (listing or collection membership).
#[derive(Debug, Clone)]
pub struct PlexItem {
    pub rating_key: String,
    pub title: String,
    pub year: Option<i32>,
}

#[derive(Debug)]
pub struct PlexClient {
    config: PlexConfig,
    client: Client,
    base_url: Url,
}

impl PlexClient {
    pub fn new(config: PlexConfig) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| FelarrError::ConfigurationError {
                field: "plex.base_url".to_string(),
                message: format!("invalid base URL: {}", e),
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Plex-Token",
            HeaderValue::from_str(&config.token).map_err(|e| FelarrError::ConfigurationError {
                field: "plex.token".to_string(),
                message: format!("invalid token: {}", e),
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/xml"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .pool_max_idle_per_host(10)
            .default_headers(headers)
            .build()
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    pub fn library_name(&self) -> &str {
        &self.config.library_name
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| FelarrError::malformed(SERVICE, e))
    }

    /// GET a path and return the XML body, mapping errors onto the
    /// taxonomy. `timeout` overrides the pool default when given.
    async fn get_xml(&self, url: Url, timeout: Option<Duration>) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
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

        Ok(body)
    }

    async fn mutate(&self, method: reqwest::Method, url: Url) -> Result<()> {
        let response = self
            .client
            .request(method, url)
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

    /// Server machine identifier, needed for collection item URIs. Also
    /// serves as the connectivity test.
    pub async fn server_identity(&self) -> Result<String> {
        let body = self.get_xml(self.join("/")?, None).await?;
        xml::parse_machine_identifier(&body)
            .ok_or_else(|| FelarrError::malformed(SERVICE, "no machineIdentifier on container"))
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.server_identity().await.map(|_| ())
    }

    /// Numeric key of the configured library section.
    pub async fn section_key(&self) -> Result<String> {
        let body = self.get_xml(self.join("/library/sections")?, None).await?;
        let sections = xml::parse_directories(&body)?;
        sections
            .into_iter()
            .find(|(_, title)| title == &self.config.library_name)
            .map(|(key, _)| key)
            .ok_or_else(|| FelarrError::NotFound {
                entity: format!("library section '{}'", self.config.library_name),
            })
    }

    /// Every movie in the section, in server order. Paginated with the
    /// container start/size parameters.
    pub async fn list_section(&self, section_key: &str) -> Result<Vec<PlexItem>> {
        let mut items = Vec::new();
        let mut start = 0usize;
        let timeout = Duration::from_secs(self.config.listing_timeout);

        loop {
            let mut url = self.join(&format!("/library/sections/{}/all", section_key))?;
            url.query_pairs_mut()
                .append_pair("type", "1")
                .append_pair("X-Plex-Container-Start", &start.to_string())
                .append_pair("X-Plex-Container-Size", &CONTAINER_PAGE_SIZE.to_string());

            let body = self.get_xml(url, Some(timeout)).await?;
            let page = xml::parse_container_items(&body)?;
            let fetched = page.items.len();
            items.extend(page.items);
            start += fetched;

            let done = match page.total_size {
                Some(total) => start >= total,
                None => fetched < CONTAINER_PAGE_SIZE,
            };
            if fetched == 0 || done {
                break;
            }
        }

        debug!(count = items.len(), "listed library section");
        Ok(items)
    }

    /// Full per-item metadata XML, streams and parts included.
    pub async fn item_metadata(&self, rating_key: &str) -> Result<String> {
        self.get_xml(self.join(&format!("/library/metadata/{}", rating_key))?, None)
            .await
    }

    /// Collections of a section.
    pub async fn collections(&self, section_key: &str) -> Result<Vec<PlexCollection>> {
        let url = self.join(&format!("/library/sections/{}/collections", section_key))?;
        let body = self.get_xml(url, None).await?;
        Ok(xml::parse_directories(&body)?
            .into_iter()
            .map(|(key, title)| PlexCollection { key, title })
            .collect())
    }

    /// Current members of a collection.
    pub async fn collection_items(&self, collection_key: &str) -> Result<Vec<PlexItem>> {
        let url = self.join(&format!("/library/collections/{}/children", collection_key))?;
        let body = self.get_xml(url, None).await?;
        Ok(xml::parse_container_items(&body)?.items)
    }

    fn metadata_uri(&self, machine_id: &str, rating_keys: &[String]) -> String {
        format!(
            "server://{}/com.plexapp.plugins.library/library/metadata/{}",
            machine_id,
            rating_keys.join(",")
        )
    }

    /// Create a collection seeded with the given items.
    pub async fn create_collection(
        &self,
        section_key: &str,
        machine_id: &str,
        title: &str,
        rating_keys: &[String],
    ) -> Result<()> {
        let mut url = self.join("/library/collections")?;
        url.query_pairs_mut()
            .append_pair("type", "1")
            .append_pair("title", title)
            .append_pair("smart", "0")
            .append_pair("sectionId", section_key)
            .append_pair("uri", &self.metadata_uri(machine_id, rating_keys));
        self.mutate(reqwest::Method::POST, url).await
    }

    /// Add one item to an existing collection.
    pub async fn add_to_collection(
        &self,
        collection_key: &str,
        machine_id: &str,
        rating_key: &str,
    ) -> Result<()> {
        let mut url = self.join(&format!("/library/collections/{}/items", collection_key))?;
        url.query_pairs_mut().append_pair(
            "uri",
            &self.metadata_uri(machine_id, &[rating_key.to_string()]),
        );
        self.mutate(reqwest::Method::PUT, url).await
    }

    /// Remove one item from a collection.
    pub async fn remove_from_collection(
        &self,
        collection_key: &str,
        rating_key: &str,
    ) -> Result<()> {
        let url = self.join(&format!(
            "/library/collections/{}/children/{}",
            collection_key, rating_key
        ))?;
        self.mutate(reqwest::Method::DELETE, url).await
    }
}
