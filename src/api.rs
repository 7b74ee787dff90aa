use crate::config::Settings;
use crate::metrics::get_metrics_collector;
use crate::model::{ChatRequest, ErrorBody};
use crate::pipeline::{ChatError, ChatPipeline};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ChatPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<ChatPipeline>) -> Self {
        Self { pipeline }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::QueryRequired => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    // An unreadable body is handled like an empty request.
    let request = match serde_json::from_slice::<ChatRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Ignoring malformed chat body: {}", e);
            ChatRequest::default()
        }
    };

    match state.pipeline.handle(request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.health())
}

async fn metrics() -> impl IntoResponse {
    Json(get_metrics_collector().snapshot())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let pipeline = ChatPipeline::from_settings(&settings).await?;
    let health = pipeline.health();
    tracing::info!(
        "Chat service ready (llm_configured={}, index_loaded={}, chunks={})",
        health.llm_configured,
        health.index_loaded,
        health.index_texts_count
    );

    let app = router(AppState::new(Arc::new(pipeline)));

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {addr}");
    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
