// SPDX-License-Identifier: MIT
// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local-only by default (bind 127.0.0.1).
//
// Endpoints:
//   POST /api/v1/comparisons                       open a blind comparison
//   GET  /api/v1/comparisons/{id}                  session state
//   POST /api/v1/comparisons/{id}/vote             cast the outcome
//   POST /api/v1/comparisons/{id}/abandon          close without voting
//   GET  /api/v1/leaderboard                       ratings + 95% CI
//   GET  /api/v1/papers                            paper catalog
//   GET  /api/v1/reviewers                         reviewer catalog
//   POST /api/v1/reviewers                         register / update a reviewer
//   POST /api/v1/reviewers/{id}/deactivate         retire from pairing
//   GET  /api/v1/health

pub mod routes;

use anyhow::Result;
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::ArenaError;
use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health
        .route("/api/v1/health", get(routes::health::health))
        // Comparisons (sessions)
        .route(
            "/api/v1/comparisons",
            post(routes::comparisons::open_comparison),
        )
        .route(
            "/api/v1/comparisons/{id}",
            get(routes::comparisons::get_comparison),
        )
        .route(
            "/api/v1/comparisons/{id}/vote",
            post(routes::comparisons::cast_vote),
        )
        .route(
            "/api/v1/comparisons/{id}/abandon",
            post(routes::comparisons::abandon_comparison),
        )
        // Ratings
        .route(
            "/api/v1/leaderboard",
            get(routes::leaderboard::get_leaderboard),
        )
        // Registries
        .route("/api/v1/papers", get(routes::papers::list_papers))
        .route(
            "/api/v1/reviewers",
            get(routes::reviewers::list_reviewers).post(routes::reviewers::register_reviewer),
        )
        .route(
            "/api/v1/reviewers/{id}/deactivate",
            post(routes::reviewers::deactivate_reviewer),
        )
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Uniform JSON error body with the kind's HTTP status.
pub(crate) fn error_response(e: ArenaError) -> (StatusCode, Json<Value>) {
    (e.status_code(), Json(json!({ "error": e.to_string() })))
}
