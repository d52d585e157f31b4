use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::models::{MediaFilter, MediaSummary, MediaType, TimeWindow};
use crate::tmdb::{ImageBase, TmdbApi, MAX_PAGES};
use crate::views::{cards, Card};

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: &'static str,
    pub title: String,
    pub count: usize,
    pub items: Vec<Card>,
}

impl Section {
    fn new(id: &'static str, title: String, items: Vec<MediaSummary>, images: &ImageBase) -> Self {
        Self {
            id,
            title,
            count: items.len(),
            items: cards(items, images),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeFeed {
    pub media_type: MediaType,
    pub sections: Vec<Section>,
}

/// Trending and popular lists for `media`; movies also get upcoming and now-playing.
pub async fn home(tmdb: &dyn TmdbApi, media: MediaType, images: &ImageBase) -> Result<HomeFeed> {
    let (trending, popular) = tokio::try_join!(
        tmdb.trending(MediaFilter::Only(media), TimeWindow::Week),
        tmdb.popular(media),
    )?;

    let (upcoming, now_playing) = if media == MediaType::Movie {
        tokio::try_join!(tmdb.upcoming_movies(), tmdb.now_playing_movies())?
    } else {
        (Vec::new(), Vec::new())
    };
    debug!(
        media = %media,
        trending = trending.len(),
        popular = popular.len(),
        upcoming = upcoming.len(),
        now_playing = now_playing.len(),
        "Home feed fetched"
    );

    let label = media.plural_label();
    // Upcoming and now playing only exist for movies; TV gets them empty.
    let sections = vec![
        Section::new("trending", format!("Trending {label}"), trending, images),
        Section::new("popular", format!("Popular {label}"), popular, images),
        Section::new("upcoming", "Upcoming Movies".to_string(), upcoming, images),
        Section::new(
            "now_playing",
            "Now Playing Movies".to_string(),
            now_playing,
            images,
        ),
    ];

    Ok(HomeFeed {
        media_type: media,
        sections,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeCounts {
    pub all: usize,
    pub movie: usize,
    pub tv: usize,
    pub person: usize,
}

impl TypeCounts {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a MediaSummary>) -> Self {
        let mut counts = TypeCounts::default();
        for item in items {
            counts.all += 1;
            match item.media_type {
                MediaType::Movie => counts.movie += 1,
                MediaType::Tv => counts.tv += 1,
                MediaType::Person => counts.person += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub filter: &'static str,
    pub counts: TypeCounts,
    pub results: Vec<Card>,
}

/// `query` must already be trimmed and non-empty; `page` starts at 1.
pub async fn search(
    tmdb: &dyn TmdbApi,
    query: &str,
    page: u32,
    filter: MediaFilter,
    images: &ImageBase,
) -> Result<SearchPage> {
    let data = tmdb.search_multi(query, page).await?;
    let counts = TypeCounts::tally(&data.results);
    let results = data
        .results
        .into_iter()
        .filter(|r| filter.matches(r.media_type))
        .map(|r| Card::new(r, images))
        .collect();

    Ok(SearchPage {
        query: query.to_string(),
        page: data.page,
        total_pages: data.total_pages.min(MAX_PAGES),
        total_results: data.total_results,
        filter: filter.as_str(),
        counts,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paged;
    use crate::tmdb::{MovieDetail, PersonDetail, TvDetail};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl TmdbApi for Recorder {
        async fn trending(&self, scope: MediaFilter, window: TimeWindow) -> Result<Vec<MediaSummary>> {
            self.record(format!("trending/{}/{}", scope.as_str(), window.as_str()));
            let media = scope.media_type().unwrap_or(MediaType::Movie);
            Ok(vec![MediaSummary::new(1, media, "Trending")])
        }
        async fn popular(&self, media: MediaType) -> Result<Vec<MediaSummary>> {
            self.record(format!("popular/{media}"));
            Ok(vec![
                MediaSummary::new(2, media, "Popular A"),
                MediaSummary::new(3, media, "Popular B"),
            ])
        }
        async fn upcoming_movies(&self) -> Result<Vec<MediaSummary>> {
            self.record("upcoming");
            Ok(vec![MediaSummary::new(4, MediaType::Movie, "Soon")])
        }
        async fn now_playing_movies(&self) -> Result<Vec<MediaSummary>> {
            self.record("now_playing");
            Ok(Vec::new())
        }
        async fn movie_details(&self, _id: i32) -> Result<MovieDetail> {
            unreachable!()
        }
        async fn tv_details(&self, _id: i32) -> Result<TvDetail> {
            unreachable!()
        }
        async fn person_details(&self, _id: i32) -> Result<PersonDetail> {
            unreachable!()
        }
        async fn search_multi(&self, query: &str, page: u32) -> Result<Paged<MediaSummary>> {
            self.record(format!("search/{query}/{page}"));
            Ok(Paged {
                page,
                results: vec![
                    MediaSummary::new(10, MediaType::Movie, "Alien"),
                    MediaSummary::new(11, MediaType::Tv, "Alien Nation"),
                    MediaSummary::new(12, MediaType::Person, "Alien Person"),
                    MediaSummary::new(13, MediaType::Movie, "Aliens"),
                ],
                total_pages: 812,
                total_results: 16_240,
            })
        }
    }

    #[tokio::test]
    async fn movie_home_has_four_sections() {
        let tmdb = Recorder::default();
        let feed = home(&tmdb, MediaType::Movie, &ImageBase::default())
            .await
            .unwrap();
        let ids: Vec<&str> = feed.sections.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["trending", "popular", "upcoming", "now_playing"]);
        assert_eq!(feed.sections[0].title, "Trending Movies");
        assert_eq!(feed.sections[1].count, 2);
        assert_eq!(feed.sections[3].count, 0);
    }

    #[tokio::test]
    async fn tv_home_leaves_movie_only_lists_empty() {
        let tmdb = Recorder::default();
        let feed = home(&tmdb, MediaType::Tv, &ImageBase::default())
            .await
            .unwrap();
        assert_eq!(feed.sections.len(), 4);
        assert_eq!(feed.sections[1].title, "Popular TV Shows");
        assert_eq!(feed.sections[2].id, "upcoming");
        assert_eq!(feed.sections[2].count, 0);
        assert!(feed.sections[2].items.is_empty());
        assert_eq!(feed.sections[3].id, "now_playing");
        assert_eq!(feed.sections[3].count, 0);
        let calls = tmdb.calls.lock().unwrap();
        assert!(calls.contains(&"trending/tv/week".to_string()));
        assert!(!calls.iter().any(|c| c == "upcoming" || c == "now_playing"));
    }

    #[tokio::test]
    async fn search_clamps_pages_and_counts_before_filtering() {
        let tmdb = Recorder::default();
        let page = search(
            &tmdb,
            "alien",
            3,
            MediaFilter::Only(MediaType::Movie),
            &ImageBase::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total_pages, MAX_PAGES);
        assert_eq!(page.page, 3);
        assert_eq!(page.results.len(), 2);
        assert_eq!(
            page.counts,
            TypeCounts {
                all: 4,
                movie: 2,
                tv: 1,
                person: 1
            }
        );
        assert_eq!(page.filter, "movie");
    }
}
