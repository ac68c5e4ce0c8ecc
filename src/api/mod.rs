// src/api/mod.rs — HTTP surface for layout generation

pub mod auth;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::core::pipeline::LayoutPipeline;
use crate::infra::config::ApiConfig;
use types::ErrorResponse;

/// Error half of every handler result.
pub type ApiFailure = (StatusCode, Json<ErrorResponse>);

/// Shared state for API handlers. Each request runs its own loop state;
/// only the pipeline's immutable collaborators are shared.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<LayoutPipeline>,
    pub token: Option<String>,
}

impl ApiState {
    pub fn new(pipeline: Arc<LayoutPipeline>) -> Self {
        Self {
            pipeline,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:8501"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://127.0.0.1:8501"),
        ])
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/layouts", post(handlers::generate_layout))
        .route("/api/v1/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn start_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down API server");
        })
        .await?;
    Ok(())
}
