//! Presentation views built from decoded TMDB payloads.
//!
//! Everything here is pure: detail payloads and an [`ImageBase`] in, serializable views out.
//! Watchlist membership is filled in by the HTTP layer.

use serde::Serialize;
use std::collections::HashSet;

use crate::models::{MediaSummary, MediaType};
use crate::tmdb::{
    CastCredit, Credits, ImageBase, MovieDetail, PersonDetail, TmdbMedia, TvDetail, Videos,
};

const MAX_CAST: usize = 20;
const MAX_KNOWN_FOR: usize = 10;
const MAX_CREDITS: usize = 12;
const MAX_PROFILE_IMAGES: usize = 12;

/// A list card: the summary plus ready-to-use image URLs.
#[derive(Debug, Clone, Serialize)]
pub struct Card {
    #[serde(flatten)]
    pub summary: MediaSummary,
    pub poster_url: Option<String>,
    pub profile_url: Option<String>,
}

impl Card {
    pub fn new(summary: MediaSummary, images: &ImageBase) -> Self {
        let poster_url = images.poster(summary.poster_path.as_deref());
        let profile_url = images.poster(summary.profile_path.as_deref());
        Self {
            summary,
            poster_url,
            profile_url,
        }
    }
}

pub fn cards(items: Vec<MediaSummary>, images: &ImageBase) -> Vec<Card> {
    items.into_iter().map(|s| Card::new(s, images)).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CastView {
    pub id: i32,
    pub name: String,
    pub character: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrailerView {
    pub key: String,
    pub name: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieView {
    pub id: i32,
    pub media_type: MediaType,
    pub title: String,
    pub original_title: Option<String>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub status: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub runtime: Option<String>,
    pub budget: Option<u64>,
    pub revenue: Option<u64>,
    pub vote_average: f32,
    pub vote_count: u32,
    pub genres: Vec<String>,
    pub homepage: Option<String>,
    pub imdb_url: Option<String>,
    pub poster_path: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub directors: Vec<String>,
    pub cast: Vec<CastView>,
    pub trailer: Option<TrailerView>,
    pub similar: Vec<Card>,
    pub in_watchlist: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonView {
    pub season_number: u32,
    pub name: String,
    pub episode_count: Option<u32>,
    pub air_date: Option<String>,
    pub poster_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TvView {
    pub id: i32,
    pub media_type: MediaType,
    pub title: String,
    pub original_title: Option<String>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub last_air_date: Option<String>,
    pub status: Option<String>,
    pub number_of_seasons: Option<u32>,
    pub number_of_episodes: Option<u32>,
    pub episode_runtime: Option<String>,
    pub vote_average: f32,
    pub vote_count: u32,
    pub genres: Vec<String>,
    pub homepage: Option<String>,
    pub poster_path: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub creators: Vec<String>,
    pub networks: Vec<String>,
    pub seasons: Vec<SeasonView>,
    pub cast: Vec<CastView>,
    pub trailer: Option<TrailerView>,
    pub similar: Vec<Card>,
    pub in_watchlist: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonView {
    pub id: i32,
    pub name: String,
    pub biography: Option<String>,
    pub birthday: Option<String>,
    pub deathday: Option<String>,
    pub place_of_birth: Option<String>,
    pub known_for_department: Option<String>,
    pub homepage: Option<String>,
    pub also_known_as: Vec<String>,
    pub profile_url: Option<String>,
    pub profile_original_url: Option<String>,
    pub known_for: Vec<Card>,
    pub credits: Vec<Card>,
    pub images: Vec<String>,
}

pub fn movie_view(detail: MovieDetail, images: &ImageBase) -> MovieView {
    let trailer = select_trailer(&detail.videos);
    let directors = directors(&detail.credits);
    let cast = top_cast(&detail.credits, images);
    let similar = similar_cards(detail.similar.results, MediaType::Movie, images);
    MovieView {
        id: detail.id,
        media_type: MediaType::Movie,
        original_title: detail
            .original_title
            .filter(|o| !o.is_empty() && *o != detail.title),
        title: detail.title,
        tagline: non_empty(detail.tagline),
        overview: non_empty(detail.overview),
        release_date: non_empty(detail.release_date),
        status: detail.status,
        runtime_minutes: detail.runtime.filter(|r| *r > 0),
        runtime: detail.runtime.and_then(format_runtime),
        budget: Some(detail.budget).filter(|b| *b > 0),
        revenue: Some(detail.revenue).filter(|r| *r > 0),
        vote_average: detail.vote_average,
        vote_count: detail.vote_count,
        genres: detail.genres.into_iter().map(|g| g.name).collect(),
        homepage: non_empty(detail.homepage),
        imdb_url: non_empty(detail.imdb_id).map(|id| format!("https://www.imdb.com/title/{id}")),
        poster_url: images.poster(detail.poster_path.as_deref()),
        backdrop_url: images.original(detail.backdrop_path.as_deref()),
        poster_path: detail.poster_path,
        directors,
        cast,
        trailer,
        similar,
        in_watchlist: false,
    }
}

pub fn tv_view(detail: TvDetail, images: &ImageBase) -> TvView {
    let trailer = select_trailer(&detail.videos);
    let cast = top_cast(&detail.credits, images);
    let similar = similar_cards(detail.similar.results, MediaType::Tv, images);
    let seasons = detail
        .seasons
        .into_iter()
        .map(|s| SeasonView {
            poster_url: images.poster(s.poster_path.as_deref()),
            season_number: s.season_number,
            name: s.name,
            episode_count: s.episode_count,
            air_date: non_empty(s.air_date),
        })
        .collect();
    TvView {
        id: detail.id,
        media_type: MediaType::Tv,
        original_title: detail
            .original_name
            .filter(|o| !o.is_empty() && *o != detail.name),
        title: detail.name,
        tagline: non_empty(detail.tagline),
        overview: non_empty(detail.overview),
        release_date: non_empty(detail.first_air_date),
        last_air_date: non_empty(detail.last_air_date),
        status: detail.status,
        number_of_seasons: detail.number_of_seasons,
        number_of_episodes: detail.number_of_episodes,
        episode_runtime: detail
            .episode_run_time
            .first()
            .copied()
            .and_then(format_runtime),
        vote_average: detail.vote_average,
        vote_count: detail.vote_count,
        genres: detail.genres.into_iter().map(|g| g.name).collect(),
        homepage: non_empty(detail.homepage),
        poster_url: images.poster(detail.poster_path.as_deref()),
        backdrop_url: images.original(detail.backdrop_path.as_deref()),
        poster_path: detail.poster_path,
        creators: detail.created_by.into_iter().map(|c| c.name).collect(),
        networks: detail.networks.into_iter().map(|n| n.name).collect(),
        seasons,
        cast,
        trailer,
        similar,
        in_watchlist: false,
    }
}

pub fn person_view(detail: PersonDetail, images: &ImageBase) -> PersonView {
    let credits: Vec<MediaSummary> = detail
        .combined_credits
        .cast
        .into_iter()
        .filter_map(|c| c.into_summary(None))
        .collect();
    let known_for = cards(known_for(&credits, MAX_KNOWN_FOR), images);
    let credits = credits
        .into_iter()
        .filter(|c| c.poster_path.is_some())
        .take(MAX_CREDITS)
        .map(|c| Card::new(c, images))
        .collect();
    let gallery = detail
        .images
        .profiles
        .iter()
        .take(MAX_PROFILE_IMAGES)
        .filter_map(|i| images.poster(Some(&i.file_path)))
        .collect();

    PersonView {
        id: detail.id,
        name: detail.name,
        biography: non_empty(detail.biography),
        birthday: non_empty(detail.birthday),
        deathday: non_empty(detail.deathday),
        place_of_birth: non_empty(detail.place_of_birth),
        known_for_department: non_empty(detail.known_for_department),
        homepage: non_empty(detail.homepage),
        also_known_as: detail.also_known_as,
        profile_url: images.poster(detail.profile_path.as_deref()),
        profile_original_url: images.original(detail.profile_path.as_deref()),
        known_for,
        credits,
        images: gallery,
    }
}

/// First YouTube video typed exactly "Trailer".
pub fn select_trailer(videos: &Videos) -> Option<TrailerView> {
    videos
        .results
        .iter()
        .find(|v| v.video_type == "Trailer" && v.site == "YouTube")
        .map(|v| TrailerView {
            key: v.key.clone(),
            name: v.name.clone(),
            url: format!("https://www.youtube.com/watch?v={}", v.key),
        })
}

/// "2h 28m", "45m", or `None` for zero.
pub fn format_runtime(minutes: u32) -> Option<String> {
    if minutes == 0 {
        return None;
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    Some(if hours == 0 {
        format!("{mins}m")
    } else {
        format!("{hours}h {mins}m")
    })
}

/// Cast credits by popularity, highest first, de-duplicated on `(id, media_type)`.
pub fn known_for(credits: &[MediaSummary], max: usize) -> Vec<MediaSummary> {
    let mut sorted: Vec<&MediaSummary> = credits.iter().collect();
    // stable sort keeps upstream order among ties
    sorted.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|c| seen.insert((c.id, c.media_type)))
        .take(max)
        .cloned()
        .collect()
}

fn directors(credits: &Credits) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for c in credits.crew.iter().filter(|c| c.job.as_deref() == Some("Director")) {
        if !names.contains(&c.name) {
            names.push(c.name.clone());
        }
    }
    names
}

fn top_cast(credits: &Credits, images: &ImageBase) -> Vec<CastView> {
    let mut cast: Vec<&CastCredit> = credits.cast.iter().collect();
    cast.sort_by_key(|c| c.order.unwrap_or(u32::MAX));
    cast.into_iter()
        .take(MAX_CAST)
        .map(|c| CastView {
            id: c.id,
            name: c.name.clone(),
            character: c.character.clone().filter(|ch| !ch.is_empty()),
            profile_url: images.thumbnail(c.profile_path.as_deref()),
        })
        .collect()
}

fn similar_cards(items: Vec<TmdbMedia>, media: MediaType, images: &ImageBase) -> Vec<Card> {
    items
        .into_iter()
        .filter_map(|m| m.into_summary(Some(media)))
        .map(|s| Card::new(s, images))
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paged;
    use crate::tmdb::{CombinedCredits, CrewCredit, ImageFile, PersonImages, Video};

    fn video(site: &str, kind: &str, key: &str) -> Video {
        Video {
            key: key.to_string(),
            name: None,
            site: site.to_string(),
            video_type: kind.to_string(),
        }
    }

    fn credit(id: i32, media: &str, popularity: f32) -> MediaSummary {
        let mut s = MediaSummary::new(id, media.parse().unwrap(), format!("Title {id}"));
        s.popularity = popularity;
        s
    }

    #[test]
    fn trailer_requires_youtube_trailer() {
        let videos = Videos {
            results: vec![
                video("YouTube", "Teaser", "teaser"),
                video("Vimeo", "Trailer", "vimeo"),
                video("YouTube", "Trailer", "yt"),
            ],
        };
        let t = select_trailer(&videos).unwrap();
        assert_eq!(t.key, "yt");
        assert_eq!(t.url, "https://www.youtube.com/watch?v=yt");

        let none = Videos {
            results: vec![video("YouTube", "Teaser", "teaser")],
        };
        assert!(select_trailer(&none).is_none());
    }

    #[test]
    fn runtime_formatting() {
        assert_eq!(format_runtime(148).as_deref(), Some("2h 28m"));
        assert_eq!(format_runtime(45).as_deref(), Some("45m"));
        assert_eq!(format_runtime(120).as_deref(), Some("2h 0m"));
        assert_eq!(format_runtime(0), None);
    }

    #[test]
    fn known_for_sorts_by_popularity_and_dedupes() {
        let credits = vec![
            credit(1, "movie", 5.0),
            credit(2, "tv", 50.0),
            credit(1, "movie", 5.0),
            credit(1, "tv", 20.0),
            credit(3, "movie", 20.0),
        ];
        let top = known_for(&credits, 3);
        let keys: Vec<(i32, MediaType)> = top.iter().map(|c| (c.id, c.media_type)).collect();
        assert_eq!(
            keys,
            vec![(2, MediaType::Tv), (1, MediaType::Tv), (3, MediaType::Movie)]
        );
    }

    #[test]
    fn movie_view_maps_core_fields() {
        let detail = MovieDetail {
            id: 27205,
            title: "Inception".to_string(),
            original_title: Some("Inception".to_string()),
            runtime: Some(148),
            budget: 0,
            revenue: 836_800_000,
            poster_path: Some("/poster.jpg".to_string()),
            imdb_id: Some("tt1375666".to_string()),
            credits: Credits {
                cast: vec![
                    CastCredit {
                        id: 2,
                        name: "Second".to_string(),
                        order: Some(1),
                        ..Default::default()
                    },
                    CastCredit {
                        id: 1,
                        name: "First".to_string(),
                        order: Some(0),
                        ..Default::default()
                    },
                ],
                crew: vec![
                    CrewCredit {
                        id: 9,
                        name: "Christopher Nolan".to_string(),
                        job: Some("Director".to_string()),
                        department: None,
                    },
                    CrewCredit {
                        id: 10,
                        name: "Someone".to_string(),
                        job: Some("Producer".to_string()),
                        department: None,
                    },
                ],
            },
            similar: Paged {
                results: vec![TmdbMedia {
                    id: 157336,
                    title: Some("Interstellar".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let view = movie_view(detail, &ImageBase::default());
        assert_eq!(view.title, "Inception");
        assert!(view.original_title.is_none());
        assert_eq!(view.runtime.as_deref(), Some("2h 28m"));
        assert_eq!(view.budget, None);
        assert_eq!(view.revenue, Some(836_800_000));
        assert_eq!(view.directors, vec!["Christopher Nolan".to_string()]);
        assert_eq!(view.cast[0].name, "First");
        assert_eq!(
            view.imdb_url.as_deref(),
            Some("https://www.imdb.com/title/tt1375666")
        );
        assert_eq!(
            view.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/poster.jpg")
        );
        assert_eq!(view.similar.len(), 1);
        assert_eq!(view.similar[0].summary.media_type, MediaType::Movie);
        assert!(!view.in_watchlist);
    }

    #[test]
    fn person_view_limits_gallery_and_filters_credits() {
        let mut cast = Vec::new();
        for i in 0..30 {
            cast.push(TmdbMedia {
                id: i,
                media_type: Some("movie".to_string()),
                title: Some(format!("Film {i}")),
                popularity: Some(i as f32),
                poster_path: if i % 2 == 0 { Some(format!("/{i}.jpg")) } else { None },
                ..Default::default()
            });
        }
        let detail = PersonDetail {
            id: 6193,
            name: "Leonardo DiCaprio".to_string(),
            combined_credits: CombinedCredits { cast },
            images: PersonImages {
                profiles: (0..20)
                    .map(|i| ImageFile {
                        file_path: format!("/profile{i}.jpg"),
                        ..Default::default()
                    })
                    .collect(),
            },
            ..Default::default()
        };
        let view = person_view(detail, &ImageBase::default());
        assert_eq!(view.images.len(), 12);
        assert_eq!(view.known_for.len(), 10);
        assert_eq!(view.known_for[0].summary.id, 29);
        assert_eq!(view.credits.len(), 12);
        assert_eq!(view.credits[0].summary.id, 0);
        assert_eq!(view.credits[11].summary.id, 22);
        assert!(view.credits.iter().all(|c| c.summary.poster_path.is_some()));
        assert!(view.biography.is_none());
    }
}
