// rest/routes/leaderboard.rs — current ratings, highest first.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

pub async fn get_leaderboard(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let entries = ctx.ratings.leaderboard().await;
    let total_votes = ctx.votes.count_votes().await.ok();
    let reviewers = ctx.reviewers.read().await;
    let rows: Vec<Value> = entries
        .iter()
        .map(|e| {
            let info = reviewers.get(&e.reviewer);
            json!({
                "reviewer": e.reviewer,
                "shortName": info.map(|i| i.short_name.as_str()),
                "link": info.map(|i| i.link.as_str()),
                "active": info.map(|i| i.active).unwrap_or(true),
                "rating": e.rating,
                "comparisons": e.comparisons,
                "ciLower": e.ci_lower,
                "ciUpper": e.ci_upper,
            })
        })
        .collect();
    Json(json!({ "leaderboard": rows, "totalVotes": total_votes }))
}
