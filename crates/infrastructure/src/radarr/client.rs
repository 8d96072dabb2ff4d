//! Radarr API client

use std::time::Duration;

use async_trait::async_trait;
use felarr_core::{FelarrError, FolderLookup, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::models::{
    AddMovieRequest, QualityProfile, RadarrMovie, RadarrRelease, RootFolder, SearchCommand,
};

const SERVICE: &str = "radarr";

#[derive(Debug, Clone)]
pub struct RadarrConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: u64,
}

impl Default for RadarrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7878".to_string(),
            api_key: String::new(),
            timeout: 30,
        }
    }
}

#[derive(Debug)]
pub struct RadarrClient {
    client: Client,
    base_url: Url,
}

impl RadarrClient {
    pub fn new(config: RadarrConfig) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| FelarrError::ConfigurationError {
                field: "radarr.base_url".to_string(),
                message: format!("invalid base URL: {}", e),
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Api-Key",
            HeaderValue::from_str(&config.api_key).map_err(|e| {
                FelarrError::ConfigurationError {
                    field: "radarr.api_key".to_string(),
                    message: format!("invalid api key: {}", e),
                }
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .pool_max_idle_per_host(10)
            .default_headers(headers)
            .build()
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        Ok(Self { client, base_url })
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| FelarrError::malformed(SERVICE, e))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.join(path)?)
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

        serde_json::from_str(&body).map_err(|e| FelarrError::malformed(SERVICE, e))
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(self.join(path)?)
            .json(body)
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

    pub async fn get_movies(&self) -> Result<Vec<RadarrMovie>> {
        self.get_json("/api/v3/movie").await
    }

    pub async fn get_root_folders(&self) -> Result<Vec<RootFolder>> {
        self.get_json("/api/v3/rootFolder").await
    }

    pub async fn get_quality_profiles(&self) -> Result<Vec<QualityProfile>> {
        self.get_json("/api/v3/qualityProfile").await
    }

    pub async fn get_releases(&self, movie_id: i64) -> Result<Vec<RadarrRelease>> {
        self.get_json(&format!("/api/v3/release?movieId={movie_id}"))
            .await
    }

    pub async fn add_movie(&self, request: &AddMovieRequest) -> Result<()> {
        self.post_json("/api/v3/movie", request).await
    }

    /// Kick a search for the given movies.
    pub async fn search_movies(&self, movie_ids: Vec<i64>) -> Result<()> {
        self.post_json(
            "/api/v3/command",
            &SearchCommand {
                name: "MoviesSearch",
                movie_ids,
            },
        )
        .await
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.get_root_folders().await.map(|_| ())
    }

    /// Resolve a movie's folder by title and year. Titles compare
    /// case-insensitively; an exact year match is required when the year
    /// is known.
    pub async fn get_movie_folder(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<String>> {
        let movies = self.get_movies().await?;
        let wanted = title.trim().to_lowercase();

        let found = movies.into_iter().find(|movie| {
            let title_match = movie.title.trim().to_lowercase() == wanted;
            match year {
                Some(year) => title_match && movie.year == Some(year),
                None => title_match,
            }
        });

        debug!(
            title,
            found = found.is_some(),
            "radarr movie folder lookup"
        );
        Ok(found.and_then(|movie| movie.path))
    }
}

#[async_trait]
impl FolderLookup for RadarrClient {
    async fn movie_folder(&self, title: &str, year: Option<i32>) -> Result<Option<String>> {
        self.get_movie_folder(title, year).await
    }
}
