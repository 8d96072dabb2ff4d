//! Radarr API payload models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrMovie {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    /// On-disk folder for the movie, when Radarr manages one.
    pub path: Option<String>,
    #[serde(default)]
    pub has_file: bool,
    pub tmdb_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootFolder {
    pub id: i64,
    pub path: String,
    #[serde(default)]
    pub accessible: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrRelease {
    pub guid: String,
    pub title: String,
    #[serde(default)]
    pub size: i64,
    pub download_url: Option<String>,
}

/// Body for adding a movie to Radarr.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMovieRequest {
    pub title: String,
    pub tmdb_id: i64,
    pub quality_profile_id: i64,
    pub root_folder_path: String,
    pub monitored: bool,
}

/// Body for the command endpoint (movie search).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCommand {
    pub name: &'static str,
    pub movie_ids: Vec<i64>,
}
