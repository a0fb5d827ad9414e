use crate::live::{LiveFeed, RefreshMode};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use scrobble_proto::feed::{artist_summary, visible, ArtistSummary};
use scrobble_proto::{FetchProgress, HttpTransport, Scrobble, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    live: Arc<LiveFeed<HttpTransport>>,
    page_size: usize,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

#[derive(Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    full: bool,
}

#[derive(Serialize)]
struct ApiFeed {
    handle: String,
    page: usize,
    has_more: bool,
    total: usize,
    scrobbles: Vec<Scrobble>,
}

#[derive(Serialize)]
struct ApiStatus {
    handle: String,
    rev: u64,
    scrobbles: usize,
    updated_at: Option<DateTime<Utc>>,
    refreshing: bool,
    progress: Option<FetchProgress>,
    last_error: Option<String>,
    last_notice: Option<String>,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

pub fn router(live: Arc<LiveFeed<HttpTransport>>, page_size: usize) -> Router {
    let app_state = HttpState { live, page_size };
    Router::new()
        .route("/api/feed", get(get_feed))
        .route("/api/artists", get(get_artists))
        .route("/api/status", get(get_status))
        .route("/api/refresh", post(refresh))
        .route("/api/user/:handle", get(get_user))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    live: Arc<LiveFeed<HttpTransport>>,
    page_size: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(live, page_size);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_feed(State(state): State<HttpState>, Query(q): Query<PageQuery>) -> Json<ApiFeed> {
    let snapshot = state.live.snapshot().await;
    let page = visible(&snapshot.scrobbles, q.page.unwrap_or(1), state.page_size);
    Json(ApiFeed {
        handle: snapshot.handle.clone(),
        page: page.page,
        has_more: page.has_more,
        total: page.total,
        scrobbles: page.scrobbles.to_vec(),
    })
}

async fn get_artists(State(state): State<HttpState>) -> Json<Vec<ArtistSummary>> {
    let snapshot = state.live.snapshot().await;
    Json(artist_summary(&snapshot.scrobbles))
}

async fn get_status(State(state): State<HttpState>) -> Json<ApiStatus> {
    let s = state.live.snapshot().await;
    Json(ApiStatus {
        scrobbles: s.scrobbles.len(),
        handle: s.handle,
        rev: s.rev,
        updated_at: s.updated_at,
        refreshing: s.refreshing,
        progress: s.progress,
        last_error: s.last_error,
        last_notice: s.last_notice,
    })
}

async fn refresh(State(state): State<HttpState>, Query(q): Query<RefreshQuery>) -> StatusCode {
    let mode = if q.full {
        RefreshMode::Full
    } else {
        RefreshMode::Incremental
    };
    if !state.live.spawn_refresh(mode) {
        return StatusCode::CONFLICT;
    }
    info!("HTTP API: refresh ({:?})", mode);
    StatusCode::ACCEPTED
}

async fn get_user(State(state): State<HttpState>, Path(handle): Path<String>) -> Response {
    let client = state.live.aggregator().client();
    match client.resolve_user(&handle).await {
        Ok(profile) => Json::<UserProfile>(profile).into_response(),
        Err(e) => {
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, Json(ApiError { error: e.to_string() })).into_response()
        }
    }
}
