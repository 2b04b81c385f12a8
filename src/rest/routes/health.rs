use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let votes = ctx.votes.count_votes().await.ok();
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "papers": ctx.papers.read().await.len(),
        "votes": votes,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
