// rest/routes/reviewers.rs — reviewer catalog and administrative mutations.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::registry::ReviewerInfo;
use crate::AppContext;

pub async fn list_reviewers(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let reviewers = ctx.reviewers.read().await;
    Json(json!({ "reviewers": reviewers.reviewers() }))
}

/// Register a new reviewer, or update display metadata of an existing one.
pub async fn register_reviewer(
    State(ctx): State<Arc<AppContext>>,
    Json(info): Json<ReviewerInfo>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if info.id.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "reviewer id must not be empty" })),
        ));
    }
    let mut reviewers = ctx.reviewers.write().await;
    let created = reviewers.get(&info.id).is_none();
    let id = info.id.clone();
    reviewers.register(info);
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "id": id, "created": created }))))
}

/// Retire a reviewer from future pairings. Its history and rating remain.
pub async fn deactivate_reviewer(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if ctx.reviewers.write().await.deactivate(&id) {
        Ok(Json(json!({ "id": id, "active": false })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown reviewer: {id}") })),
        ))
    }
}
