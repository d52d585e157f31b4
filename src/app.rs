use crate::config::Config;
use crate::discovery;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::{MediaFilter, MediaType, TimeWindow};
use crate::preferences::{Preferences, Theme};
use crate::storage::{JsonFileStorage, Storage};
use crate::tmdb::{ImageBase, TmdbApi, TmdbClient, MAX_PAGES};
use crate::views::{self, Card};
use crate::watchlist::{Watchlist, WatchlistItem};
use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
pub const PER_IP_LIMIT: u32 = 120; // per minute
pub const PER_IP_BURST: u32 = 20;
pub const GLOBAL_LIMIT: u32 = 600; // per minute
pub const GLOBAL_BURST: u32 = 60;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub images: ImageBase,
    pub watchlist: Arc<Mutex<Watchlist>>,
    pub preferences: Arc<Mutex<Preferences>>,
    pub api_token: Option<String>,
    pub rate_limits: Arc<Mutex<HashMap<String, WindowCounter>>>,
    pub global_limit: Arc<Mutex<WindowCounter>>,
}

#[derive(Clone, Debug, Default)]
pub struct WindowCounter {
    pub window: u64,
    pub count: u32,
}

impl AppState {
    /// Loads the watchlist and preferences from `storage`.
    pub async fn new(
        tmdb: Arc<dyn TmdbApi>,
        storage: Arc<dyn Storage>,
        images: ImageBase,
        api_token: Option<String>,
    ) -> Result<Self> {
        let watchlist = Watchlist::load(storage.clone()).await?;
        let preferences = Preferences::load(storage).await?;
        Ok(Self {
            tmdb,
            images,
            watchlist: Arc::new(Mutex::new(watchlist)),
            preferences: Arc::new(Mutex::new(preferences)),
            api_token,
            rate_limits: Arc::new(Mutex::new(HashMap::new())),
            global_limit: Arc::new(Mutex::new(WindowCounter::default())),
        })
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_config(&config)?);
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::open(&config.data_file).await?);
    info!("Persisting user data to {}", config.data_file.display());
    if config.api_token.is_some() {
        info!("Mutating routes require API_TOKEN");
    } else {
        warn!("API_TOKEN not set - watchlist changes are unauthenticated");
    }

    let state = AppState::new(
        tmdb,
        storage,
        ImageBase::new(config.image_base_url.clone()),
        config.api_token.clone(),
    )
    .await?;

    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/home", get(home))
        .route("/trending", get(trending_default))
        .route("/trending/:media/:window", get(trending))
        .route("/popular/:media", get(popular))
        .route("/movie/upcoming", get(upcoming))
        .route("/movie/now_playing", get(now_playing))
        .route("/movie/:id", get(movie_details))
        .route("/tv/:id", get(tv_details))
        .route("/person/:id", get(person_details))
        .route("/search", get(search))
        .route("/watchlist", get(list_watchlist).post(add_to_watchlist))
        .route("/watchlist/toggle", post(toggle_watchlist))
        .route(
            "/watchlist/:media/:id",
            get(watchlist_membership).delete(remove_from_watchlist),
        )
        .route("/preferences", get(preferences))
        .route("/preferences/theme", put(set_theme))
        .route("/preferences/theme/toggle", post(toggle_theme))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_ip(&headers);
    if !check_rate_limit(&state, &ip).await || !check_global_rate_limit(&state).await {
        warn!("Rate limit exceeded for {}", ip);
        return ApiError::TooManyRequests.into_response();
    }
    next.run(request).await
}

/// Mutating requests need the bearer token before any body is read.
async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let safe = matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if !safe {
        if let Err(e) = authorize(&state, &headers) {
            return e.into_response();
        }
    }
    next.run(request).await
}

#[derive(Deserialize)]
struct HomeQuery {
    #[serde(rename = "type")]
    media_type: Option<String>,
}

async fn home(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<HomeQuery>,
) -> Result<Json<discovery::HomeFeed>, ApiError> {
    let media = match q.media_type.as_deref() {
        None => MediaType::Movie,
        Some(raw) => match raw.parse::<MediaType>() {
            Ok(m @ (MediaType::Movie | MediaType::Tv)) => m,
            _ => return Err(ApiError::bad_request("type must be 'movie' or 'tv'")),
        },
    };
    let feed = discovery::home(state.tmdb.as_ref(), media, &state.images)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "List"))?;
    Ok(Json(feed))
}

async fn trending_default(State(state): State<AppState>) -> Result<Json<Vec<Card>>, ApiError> {
    fetch_trending(&state, MediaFilter::All, TimeWindow::Week).await
}

async fn trending(
    State(state): State<AppState>,
    ApiPath((media, window)): ApiPath<(String, String)>,
) -> Result<Json<Vec<Card>>, ApiError> {
    let scope: MediaFilter = media
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;
    let window: TimeWindow = window
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;
    fetch_trending(&state, scope, window).await
}

async fn fetch_trending(
    state: &AppState,
    scope: MediaFilter,
    window: TimeWindow,
) -> Result<Json<Vec<Card>>, ApiError> {
    let items = state
        .tmdb
        .trending(scope, window)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Trending list"))?;
    Ok(Json(views::cards(items, &state.images)))
}

async fn popular(
    State(state): State<AppState>,
    ApiPath(media): ApiPath<String>,
) -> Result<Json<Vec<Card>>, ApiError> {
    let media = parse_media(&media)?;
    let items = state
        .tmdb
        .popular(media)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Popular list"))?;
    Ok(Json(views::cards(items, &state.images)))
}

async fn upcoming(State(state): State<AppState>) -> Result<Json<Vec<Card>>, ApiError> {
    let items = state
        .tmdb
        .upcoming_movies()
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Upcoming list"))?;
    Ok(Json(views::cards(items, &state.images)))
}

async fn now_playing(State(state): State<AppState>) -> Result<Json<Vec<Card>>, ApiError> {
    let items = state
        .tmdb
        .now_playing_movies()
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Now playing list"))?;
    Ok(Json(views::cards(items, &state.images)))
}

async fn movie_details(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<views::MovieView>, ApiError> {
    let detail = state
        .tmdb
        .movie_details(id)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Movie"))?;
    let mut view = views::movie_view(detail, &state.images);
    view.in_watchlist = state.watchlist.lock().await.contains(view.id, MediaType::Movie);
    Ok(Json(view))
}

async fn tv_details(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<views::TvView>, ApiError> {
    let detail = state
        .tmdb
        .tv_details(id)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "TV show"))?;
    let mut view = views::tv_view(detail, &state.images);
    view.in_watchlist = state.watchlist.lock().await.contains(view.id, MediaType::Tv);
    Ok(Json(view))
}

async fn person_details(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<views::PersonView>, ApiError> {
    let detail = state
        .tmdb
        .person_details(id)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Person"))?;
    Ok(Json(views::person_view(detail, &state.images)))
}

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
    page: Option<u32>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<Json<discovery::SearchPage>, ApiError> {
    let query = q.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let page = q.page.unwrap_or(1);
    if page == 0 || page > MAX_PAGES {
        return Err(ApiError::bad_request(format!(
            "page must be between 1 and {}",
            MAX_PAGES
        )));
    }
    let filter = parse_filter(q.media_type.as_deref())?;
    let results = discovery::search(state.tmdb.as_ref(), query, page, filter, &state.images)
        .await
        .map_err(|e| ApiError::from_tmdb(e, "Search"))?;
    Ok(Json(results))
}

#[derive(Deserialize)]
struct WatchlistQuery {
    #[serde(rename = "type")]
    media_type: Option<String>,
}

async fn list_watchlist(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<WatchlistQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(q.media_type.as_deref())?;
    let watchlist = state.watchlist.lock().await;
    let items = watchlist.filtered(filter);
    Ok(Json(json!({
        "filter": filter.as_str(),
        "count": items.len(),
        "items": items,
        "stats": watchlist.stats(),
    })))
}

async fn add_to_watchlist(
    State(state): State<AppState>,
    ApiJson(item): ApiJson<WatchlistItem>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_listable(&item)?;
    let added = state
        .watchlist
        .lock()
        .await
        .add(item)
        .await
        .map_err(ApiError::Internal)?;
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({"status": "success", "added": added, "in_watchlist": true})),
    ))
}

async fn toggle_watchlist(
    State(state): State<AppState>,
    ApiJson(item): ApiJson<WatchlistItem>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_listable(&item)?;
    let in_watchlist = state
        .watchlist
        .lock()
        .await
        .toggle(item)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({"in_watchlist": in_watchlist})))
}

async fn watchlist_membership(
    State(state): State<AppState>,
    ApiPath((media, id)): ApiPath<(String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let media = parse_media(&media)?;
    let in_watchlist = state.watchlist.lock().await.contains(id, media);
    Ok(Json(json!({"in_watchlist": in_watchlist})))
}

async fn remove_from_watchlist(
    State(state): State<AppState>,
    ApiPath((media, id)): ApiPath<(String, i32)>,
) -> Result<StatusCode, ApiError> {
    let media = parse_media(&media)?;
    let removed = state
        .watchlist
        .lock()
        .await
        .remove(id, media)
        .await
        .map_err(ApiError::Internal)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "{} {} is not in the watchlist",
            media, id
        )))
    }
}

async fn preferences(State(state): State<AppState>) -> impl IntoResponse {
    let theme = state.preferences.lock().await.theme();
    Json(json!({"theme": theme}))
}

#[derive(Deserialize)]
struct ThemeBody {
    theme: Theme,
}

async fn set_theme(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ThemeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let theme = state
        .preferences
        .lock()
        .await
        .set_theme(body.theme)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({"theme": theme})))
}

async fn toggle_theme(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let theme = state
        .preferences
        .lock()
        .await
        .toggle_theme()
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({"theme": theme})))
}

fn parse_media(raw: &str) -> Result<MediaType, ApiError> {
    raw.parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))
}

fn parse_filter(raw: Option<&str>) -> Result<MediaFilter, ApiError> {
    match raw {
        None => Ok(MediaFilter::All),
        Some(r) => r
            .parse()
            .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string())),
    }
}

fn ensure_listable(item: &WatchlistItem) -> Result<(), ApiError> {
    if item.media_type == MediaType::Person {
        return Err(ApiError::bad_request(
            "only movies and TV shows can be added to the watchlist",
        ));
    }
    Ok(())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match provided {
        Some(token)
            if token.len() == expected.len()
                && constant_time_eq(token.as_bytes(), expected.as_bytes()) =>
        {
            Ok(())
        }
        _ => {
            warn!("Rejecting watchlist change with invalid or missing token");
            Err(ApiError::Unauthorized)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("cf-connecting-ip")
        .or_else(|| headers.get("x-real-ip"))
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn current_window() -> u64 {
    (Utc::now().timestamp() / 60) as u64
}

/// Counts one request against `counter` unless `max` was already reached in `window`.
fn admit(counter: &mut WindowCounter, window: u64, max: u32) -> bool {
    if counter.window != window {
        counter.window = window;
        counter.count = 0;
    }
    if counter.count >= max {
        return false;
    }
    counter.count += 1;
    true
}

async fn check_rate_limit(state: &AppState, ip: &str) -> bool {
    let window = current_window();
    let mut guards = state.rate_limits.lock().await;
    if guards.len() > MAX_RATE_LIMIT_ENTRIES {
        guards.retain(|_, v| v.window == window);
    }
    let entry = guards
        .entry(ip.to_string())
        .or_insert(WindowCounter { window, count: 0 });
    admit(entry, window, PER_IP_LIMIT + PER_IP_BURST)
}

async fn check_global_rate_limit(state: &AppState) -> bool {
    let window = current_window();
    let mut guard = state.global_limit.lock().await;
    admit(&mut guard, window, GLOBAL_LIMIT + GLOBAL_BURST)
}
