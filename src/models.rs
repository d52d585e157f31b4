use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MediaType {
    Movie,
    Tv,
    Person,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Person => "person",
        }
    }

    /// Heading used for list sections ("Trending Movies", "Popular TV Shows").
    pub fn plural_label(&self) -> &'static str {
        match self {
            MediaType::Movie => "Movies",
            MediaType::Tv => "TV Shows",
            MediaType::Person => "People",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            "person" => Ok(MediaType::Person),
            other => Err(anyhow!("unknown media type '{}'", other)),
        }
    }
}

impl TryFrom<String> for MediaType {
    type Error = anyhow::Error;
    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

/// Either every media type or a single one. Used by trending scopes and list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFilter {
    #[default]
    All,
    Only(MediaType),
}

impl MediaFilter {
    pub fn matches(&self, media_type: MediaType) -> bool {
        match self {
            MediaFilter::All => true,
            MediaFilter::Only(t) => *t == media_type,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFilter::All => "all",
            MediaFilter::Only(t) => t.as_str(),
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            MediaFilter::All => None,
            MediaFilter::Only(t) => Some(*t),
        }
    }
}

impl FromStr for MediaFilter {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(MediaFilter::All);
        }
        s.parse().map(MediaFilter::Only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            other => Err(anyhow!("time window must be 'day' or 'week', got '{}'", other)),
        }
    }
}

/// The card shape shared by every list: trending, popular, search hits, similar titles, credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub id: i32,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub profile_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f32,
    pub popularity: f32,
    pub known_for_department: Option<String>,
    pub character: Option<String>,
}

impl MediaSummary {
    pub fn new(id: i32, media_type: MediaType, title: impl Into<String>) -> Self {
        Self {
            id,
            media_type,
            title: title.into(),
            overview: None,
            poster_path: None,
            backdrop_path: None,
            profile_path: None,
            release_date: None,
            vote_average: 0.0,
            popularity: 0.0,
            known_for_department: None,
            character: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self {
            page: 1,
            results: Vec::new(),
            total_pages: 0,
            total_results: 0,
        }
    }
}

impl<T> Paged<T> {
    pub fn map_results<U>(self, f: impl FnMut(T) -> Option<U>) -> Paged<U> {
        Paged {
            page: self.page,
            results: self.results.into_iter().filter_map(f).collect(),
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}
