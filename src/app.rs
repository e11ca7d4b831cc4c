use crate::catalog::{self, CatalogQuery};
use crate::genre_fallback::fallback_genres;
use crate::session::{self, LoginRequest};
use crate::storage::LocalStorage;
use crate::store::{Action, Store};
use crate::tmdb::{Movie, TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::{collections::HashMap, env, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap
const PER_IP_LIMIT: u32 = 60; // per minute
const PER_IP_BURST: u32 = 10;
const GLOBAL_LIMIT: u32 = 200; // per minute
const GLOBAL_BURST: u32 = 20;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub store: Arc<Store>,
    pub rate_limits: Arc<Mutex<HashMap<String, WindowCounter>>>,
    pub global_limit: Arc<Mutex<WindowCounter>>,
}

#[derive(Clone, Debug)]
pub struct WindowCounter {
    pub window: u64,
    pub count: u32,
}

pub async fn run_server() -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);

    let data_dir = env::var("CINESCOPE_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    info!("Mirroring favorites and session to {}", data_dir);
    let store = Arc::new(Store::open(LocalStorage::new(data_dir)));

    let state = AppState {
        tmdb,
        store,
        rate_limits: Arc::new(Mutex::new(HashMap::new())),
        global_limit: Arc::new(Mutex::new(WindowCounter {
            window: 0,
            count: 0,
        })),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 4170));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/catalog", get(get_catalog))
        .route("/trending", get(get_trending))
        .route("/genres", get(get_genres))
        .route("/movies/:id", get(get_movie))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/:id", delete(remove_favorite))
        .route("/session", get(get_session).post(login).delete(logout))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn get_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CatalogQuery>,
) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match catalog::browse(state.tmdb.as_ref(), &state.store, &query).await {
        Ok(outcome) => {
            let snapshot = state.store.snapshot().await;
            Json(json!({
                "view": outcome.view,
                "page": outcome.page,
                "total_pages": outcome.total_pages,
                "total_results": outcome.total_results,
                "movies": snapshot.movies,
                "last_searched": snapshot.last_searched,
            }))
            .into_response()
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, format!("{e:#}")),
    }
}

async fn get_trending(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match catalog::refresh_trending(state.tmdb.as_ref(), &state.store).await {
        Ok(movies) => Json(json!({ "movies": movies })).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, format!("{e:#}")),
    }
}

async fn get_genres(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match state.tmdb.fetch_genres().await {
        Ok(genres) => Json(json!({ "genres": genres })).into_response(),
        Err(e) => {
            warn!("Failed to fetch genres, using fallback: {:#}", e);
            Json(json!({ "genres": fallback_genres() })).into_response()
        }
    }
}

async fn get_movie(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match state.tmdb.fetch_movie(id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => {
            let message = format!("{e:#}");
            let status = if message.contains("TMDB 404") {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::BAD_GATEWAY
            };
            error_response(status, message)
        }
    }
}

async fn list_favorites(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    let favorites = state.store.snapshot().await.favorites;
    Json(json!({ "favorites": favorites })).into_response()
}

async fn add_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(movie): Json<Movie>,
) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    info!("Adding favorite '{}' ({})", movie.title, movie.id);
    state.store.dispatch(Action::AddFavorite(movie)).await;
    let favorites = state.store.snapshot().await.favorites;
    Json(json!({ "favorites": favorites })).into_response()
}

async fn remove_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    let known = state
        .store
        .snapshot()
        .await
        .favorites
        .iter()
        .any(|m| m.id == id);
    if !known {
        return error_response(StatusCode::NOT_FOUND, format!("no favorite with id {id}"));
    }

    state.store.dispatch(Action::RemoveFavorite(id)).await;
    let favorites = state.store.snapshot().await.favorites;
    Json(json!({ "favorites": favorites })).into_response()
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match session::fabricate_user(&request) {
        Ok(user) => {
            info!("Fabricated local session for '{}'", user.username);
            state.store.dispatch(Action::LoginUser(user.clone())).await;
            Json(json!({ "user": user })).into_response()
        }
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")),
    }
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    match state.store.snapshot().await.user {
        Some(user) => Json(json!({ "user": user })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "not logged in"),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(denied) = throttle(&state, &headers).await {
        return denied;
    }

    state.store.dispatch(Action::Logout).await;
    StatusCode::NO_CONTENT.into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    (status, Json(json!({ "error": message }))).into_response()
}

async fn throttle(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    let ip = extract_ip(headers);
    if !check_rate_limit(state, &ip).await || !check_global_rate_limit(state).await {
        warn!("Rate limit exceeded for {}", ip);
        return Some(error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded",
        ));
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
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

async fn check_rate_limit(state: &AppState, ip: &str) -> bool {
    let window = (Utc::now().timestamp() / 60) as u64;
    let mut guards = state.rate_limits.lock().await;
    if guards.len() > MAX_RATE_LIMIT_ENTRIES {
        guards.retain(|_, v| v.window == window);
    }
    let entry = guards
        .entry(ip.to_string())
        .or_insert(WindowCounter { window, count: 0 });
    if entry.window != window {
        entry.window = window;
        entry.count = 0;
    }
    if entry.count >= PER_IP_LIMIT + PER_IP_BURST {
        return false;
    }
    entry.count += 1;
    true
}

async fn check_global_rate_limit(state: &AppState) -> bool {
    let window = (Utc::now().timestamp() / 60) as u64;
    let mut guard = state.global_limit.lock().await;
    if guard.window != window {
        guard.window = window;
        guard.count = 0;
    }
    if guard.count >= GLOBAL_LIMIT + GLOBAL_BURST {
        return false;
    }
    guard.count += 1;
    true
}
