use crate::{
    index::{CancelFlag, IndexStatus, RebuildOutcome},
    service::{
        AppError, AppService, ConnectionsResponse, InteractionResponse, PostDetailsResponse,
        RecommendResponse,
    },
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<AppService>,
    /// Cancels an in-flight rebuild when the daemon shuts down.
    rebuild_cancel: CancelFlag,
}

async fn start_app(service: Arc<AppService>, bind: String) {
    let rebuild_cancel = CancelFlag::new();
    let shared_state = Arc::new(SharedState {
        service,
        rebuild_cancel: rebuild_cancel.clone(),
    });

    async fn shutdown_signal(rebuild_cancel: CancelFlag) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                log::warn!("shutting down, cancelling any in-flight rebuild");
                rebuild_cancel.cancel();
            },
            _ = terminate => {
                rebuild_cancel.cancel();
            },
        }
    }

    let signal = shutdown_signal(rebuild_cancel);

    let app = Router::new()
        .route("/api/recommendations", get(recommendations))
        .route("/api/index/rebuild", post(rebuild_index))
        .route("/api/index/status", get(index_status))
        .route("/api/interactions/compute", post(compute_interaction))
        .route("/api/interactions", get(stored_interaction))
        .route("/api/connections/:user_id", get(connections))
        .route("/api/posts/:post_id", get(post_details))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&bind).await.unwrap();
    log::info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

pub fn start_daemon(service: Arc<AppService>, bind: String) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(service, bind).await });
}

// Wrapper so axum can turn `AppError` into a response.
#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::Validation(_) => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::UserNotFound | AppError::PostNotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Index(_) | AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationsRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn recommendations(
    State(state): State<Arc<SharedState>>,
    Query(payload): Query<RecommendationsRequest>,
) -> Result<Json<RecommendResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service
            .recommend(payload.email.as_deref().unwrap_or(""), payload.limit)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Default, Deserialize)]
struct RebuildRequest {
    /// Append new posts instead of rebuilding from scratch.
    #[serde(default)]
    incremental: bool,
}

async fn rebuild_index(
    State(state): State<Arc<SharedState>>,
    Query(payload): Query<RebuildRequest>,
) -> Result<Json<RebuildOutcome>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    let cancel = state.rebuild_cancel.clone();

    tokio::task::block_in_place(move || {
        service
            .rebuild_index(payload.incremental, &cancel)
            .map(Json)
            .map_err(Into::into)
    })
}

async fn index_status(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<IndexStatus>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || Ok(Json(service.index_status())))
}

#[derive(Debug, Deserialize)]
struct ComputeInteractionRequest {
    #[serde(default)]
    source_user_id: Option<String>,
    #[serde(default)]
    target_user_id: Option<String>,
}

async fn compute_interaction(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ComputeInteractionRequest>,
) -> Result<Json<InteractionResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service
            .compute_interaction(
                payload.source_user_id.as_deref().unwrap_or(""),
                payload.target_user_id.as_deref().unwrap_or(""),
            )
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct StoredInteractionRequest {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

async fn stored_interaction(
    State(state): State<Arc<SharedState>>,
    Query(payload): Query<StoredInteractionRequest>,
) -> Result<Json<InteractionResponse>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service
            .stored_interaction(
                payload.source.as_deref().unwrap_or(""),
                payload.target.as_deref().unwrap_or(""),
            )
            .map(Json)
            .map_err(Into::into)
    })
}

async fn connections(
    State(state): State<Arc<SharedState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ConnectionsResponse>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service.connections(&user_id).map(Json).map_err(Into::into)
    })
}

async fn post_details(
    State(state): State<Arc<SharedState>>,
    Path(post_id): Path<String>,
) -> Result<Json<PostDetailsResponse>, HttpError> {
    let service = state.service.clone();

    tokio::task::block_in_place(move || {
        service.post_details(&post_id).map(Json).map_err(Into::into)
    })
}
