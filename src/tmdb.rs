use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::{Config, DEFAULT_IMAGE_BASE, DEFAULT_TMDB_BASE};
use crate::models::{MediaFilter, MediaSummary, MediaType, Paged, TimeWindow};

/// TMDB serves at most this many result pages for any list.
pub const MAX_PAGES: u32 = 500;

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn trending(&self, scope: MediaFilter, window: TimeWindow) -> Result<Vec<MediaSummary>>;
    async fn popular(&self, media: MediaType) -> Result<Vec<MediaSummary>>;
    async fn upcoming_movies(&self) -> Result<Vec<MediaSummary>>;
    async fn now_playing_movies(&self) -> Result<Vec<MediaSummary>>;
    async fn movie_details(&self, id: i32) -> Result<MovieDetail>;
    async fn tv_details(&self, id: i32) -> Result<TvDetail>;
    async fn person_details(&self, id: i32) -> Result<PersonDetail>;
    async fn search_multi(&self, query: &str, page: u32) -> Result<Paged<MediaSummary>>;
}

/// Non-2xx answer from TMDB. Carried inside `anyhow::Error` so callers can downcast.
#[derive(Debug)]
pub struct TmdbStatusError {
    pub status: u16,
    pub path: String,
    pub body: String,
}

impl fmt::Display for TmdbStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TMDB {} -> {}: {}", self.path, self.status, self.body)
    }
}

impl std::error::Error for TmdbStatusError {}

impl TmdbStatusError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("movie-explorer/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.tmdb_api_key.clone(), config.tmdb_base_url.clone())
    }

    /// Client against the public endpoint, for tools that only have an API key.
    pub fn with_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new(api_key, DEFAULT_TMDB_BASE)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}{}?api_key={}", self.base_url, path, self.api_key);
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .client
            .get(self.url(path, params))
            .send()
            .await
            .with_context(|| format!("TMDB request to {} failed", path))?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(TmdbStatusError {
                status: status.as_u16(),
                path: path.to_string(),
                body: text,
            }
            .into());
        }
        let parsed: T = serde_json::from_str(&text)
            .with_context(|| format!("JSON parse failed for {}", path))?;
        Ok(parsed)
    }

    async fn list(&self, path: &str, list_type: Option<MediaType>) -> Result<Vec<MediaSummary>> {
        let data: Paged<TmdbMedia> = self.get_json(path, &[]).await?;
        Ok(data
            .results
            .into_iter()
            .filter_map(|m| m.into_summary(list_type))
            .collect())
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn trending(&self, scope: MediaFilter, window: TimeWindow) -> Result<Vec<MediaSummary>> {
        let path = format!("/trending/{}/{}", scope.as_str(), window.as_str());
        self.list(&path, scope.media_type()).await
    }

    async fn popular(&self, media: MediaType) -> Result<Vec<MediaSummary>> {
        self.list(&format!("/{}/popular", media), Some(media)).await
    }

    async fn upcoming_movies(&self) -> Result<Vec<MediaSummary>> {
        self.list("/movie/upcoming", Some(MediaType::Movie)).await
    }

    async fn now_playing_movies(&self) -> Result<Vec<MediaSummary>> {
        self.list("/movie/now_playing", Some(MediaType::Movie)).await
    }

    async fn movie_details(&self, id: i32) -> Result<MovieDetail> {
        self.get_json(
            &format!("/movie/{id}"),
            &[("append_to_response", "credits,videos,similar".to_string())],
        )
        .await
    }

    async fn tv_details(&self, id: i32) -> Result<TvDetail> {
        self.get_json(
            &format!("/tv/{id}"),
            &[("append_to_response", "credits,videos,similar".to_string())],
        )
        .await
    }

    async fn person_details(&self, id: i32) -> Result<PersonDetail> {
        self.get_json(
            &format!("/person/{id}"),
            &[("append_to_response", "combined_credits,images".to_string())],
        )
        .await
    }

    async fn search_multi(&self, query: &str, page: u32) -> Result<Paged<MediaSummary>> {
        if query.trim().is_empty() {
            return Err(anyhow!("search query is empty"));
        }
        let data: Paged<TmdbMedia> = self
            .get_json(
                "/search/multi",
                &[("query", query.to_string()), ("page", page.to_string())],
            )
            .await?;
        Ok(data.map_results(|m| m.into_summary(None)))
    }
}

/// Builds image URLs of the form `{base}/{size}{path}`.
#[derive(Debug, Clone)]
pub struct ImageBase {
    base: String,
}

impl Default for ImageBase {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_BASE)
    }
}

impl ImageBase {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: Option<&str>, size: &str) -> Option<String> {
        let path = path.filter(|p| !p.is_empty())?;
        if path.starts_with('/') {
            Some(format!("{}/{}{}", self.base, size, path))
        } else {
            Some(format!("{}/{}/{}", self.base, size, path))
        }
    }

    pub fn poster(&self, path: Option<&str>) -> Option<String> {
        self.url(path, "w500")
    }

    pub fn thumbnail(&self, path: Option<&str>) -> Option<String> {
        self.url(path, "w185")
    }

    pub fn original(&self, path: Option<&str>) -> Option<String> {
        self.url(path, "original")
    }
}

/// A list entry as TMDB sends it. Movies carry `title`/`release_date`,
/// shows carry `name`/`first_air_date`, people carry `name`/`profile_path`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbMedia {
    pub id: i32,
    pub media_type: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub profile_path: Option<String>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub vote_average: Option<f32>,
    pub popularity: Option<f32>,
    pub known_for_department: Option<String>,
    pub character: Option<String>,
}

impl TmdbMedia {
    /// Entries whose type is neither tagged nor implied by the list are dropped.
    pub fn into_summary(self, list_type: Option<MediaType>) -> Option<MediaSummary> {
        let media_type = match self.media_type.as_deref() {
            Some(raw) => raw.parse().ok()?,
            None => list_type?,
        };
        let title = match media_type {
            MediaType::Movie => self.title.or(self.name),
            MediaType::Tv | MediaType::Person => self.name.or(self.title),
        }
        .unwrap_or_default();
        let release_date = match media_type {
            MediaType::Movie => self.release_date,
            MediaType::Tv => self.first_air_date,
            MediaType::Person => None,
        };
        Some(MediaSummary {
            id: self.id,
            media_type,
            title,
            overview: non_empty(self.overview),
            poster_path: non_empty(self.poster_path),
            backdrop_path: non_empty(self.backdrop_path),
            profile_path: non_empty(self.profile_path),
            release_date: non_empty(release_date),
            vote_average: self.vote_average.unwrap_or_default(),
            popularity: self.popularity.unwrap_or_default(),
            known_for_department: non_empty(self.known_for_department),
            character: non_empty(self.character),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credits {
    pub cast: Vec<CastCredit>,
    pub crew: Vec<CrewCredit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CastCredit {
    pub id: i32,
    pub name: String,
    pub character: Option<String>,
    pub profile_path: Option<String>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrewCredit {
    pub id: i32,
    pub name: String,
    pub job: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Videos {
    pub results: Vec<Video>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Video {
    pub key: String,
    pub name: Option<String>,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieDetail {
    pub id: i32,
    pub title: String,
    pub original_title: Option<String>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    pub status: Option<String>,
    pub budget: u64,
    pub revenue: u64,
    pub vote_average: f32,
    pub vote_count: u32,
    pub popularity: f32,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub homepage: Option<String>,
    pub imdb_id: Option<String>,
    pub original_language: Option<String>,
    pub genres: Vec<Genre>,
    pub credits: Credits,
    pub videos: Videos,
    pub similar: Paged<TmdbMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TvDetail {
    pub id: i32,
    pub name: String,
    pub original_name: Option<String>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub last_air_date: Option<String>,
    pub status: Option<String>,
    pub number_of_seasons: Option<u32>,
    pub number_of_episodes: Option<u32>,
    pub episode_run_time: Vec<u32>,
    pub vote_average: f32,
    pub vote_count: u32,
    pub popularity: f32,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub homepage: Option<String>,
    pub original_language: Option<String>,
    pub genres: Vec<Genre>,
    pub created_by: Vec<Creator>,
    pub networks: Vec<Network>,
    pub seasons: Vec<Season>,
    pub credits: Credits,
    pub videos: Videos,
    pub similar: Paged<TmdbMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Creator {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Network {
    pub id: i32,
    pub name: String,
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Season {
    pub season_number: u32,
    pub name: String,
    pub episode_count: Option<u32>,
    pub air_date: Option<String>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonDetail {
    pub id: i32,
    pub name: String,
    pub biography: Option<String>,
    pub birthday: Option<String>,
    pub deathday: Option<String>,
    pub place_of_birth: Option<String>,
    pub known_for_department: Option<String>,
    pub homepage: Option<String>,
    pub profile_path: Option<String>,
    pub popularity: f32,
    pub also_known_as: Vec<String>,
    pub combined_credits: CombinedCredits,
    pub images: PersonImages,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CombinedCredits {
    pub cast: Vec<TmdbMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonImages {
    pub profiles: Vec<ImageFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageFile {
    pub file_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}
