// rest/routes/comparisons.rs — blind comparison session routes.
//
// Reviewer identities stay hidden while a session is open; they are revealed
// in the vote response (and on terminal sessions) so the annotator can never
// see who wrote what before committing an outcome.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ArenaError;
use crate::rating::Outcome;
use crate::rest::error_response;
use crate::session::SessionState;
use crate::AppContext;

#[derive(Deserialize)]
pub struct OpenComparisonRequest {
    #[serde(rename = "annotatorId")]
    pub annotator_id: String,
}

pub async fn open_comparison(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<OpenComparisonRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if body.annotator_id.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "annotatorId must not be empty" })),
        ));
    }

    let papers = ctx.papers.read().await;
    let reviewers = ctx.reviewers.read().await;
    let pairing = ctx
        .pairing
        .select(&body.annotator_id, &papers, &reviewers)
        .await
        .map_err(error_response)?;

    let session = match ctx
        .sessions
        .open_session(
            &body.annotator_id,
            &pairing.paper_id,
            &pairing.reviewer_a,
            &pairing.reviewer_b,
        )
        .await
    {
        Ok(s) => s,
        // Tell the client which session blocks, so it can resume or abandon.
        Err(e @ ArenaError::SessionAlreadyOpen(_)) => {
            let open = ctx
                .sessions
                .open_session_for(&body.annotator_id)
                .await
                .map_err(error_response)?;
            return Err((
                e.status_code(),
                Json(json!({
                    "error": e.to_string(),
                    "sessionId": open.map(|s| s.session_id),
                })),
            ));
        }
        Err(e) => return Err(error_response(e)),
    };

    let paper = papers
        .get(&pairing.paper_id)
        .ok_or_else(|| error_response(ArenaError::NotFound(pairing.paper_id.clone())))?;

    Ok(Json(json!({
        "sessionId": session.session_id,
        "paperId": paper.paper_id,
        "title": paper.title,
        "pdfPath": paper.pdf_path,
        "reviewA": paper.review_for(&pairing.reviewer_a).unwrap_or_default(),
        "reviewB": paper.review_for(&pairing.reviewer_b).unwrap_or_default(),
        "openedAt": session.opened_at,
    })))
}

pub async fn get_comparison(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let session = ctx
        .sessions
        .get_session(&id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(ArenaError::NotFound(id)))?;

    let mut body = json!({
        "sessionId": session.session_id,
        "annotatorId": session.annotator_id,
        "paperId": session.paper_id,
        "state": session.state,
        "openedAt": session.opened_at,
        "closedAt": session.closed_at,
    });
    // Identities only after the session left the open state.
    if session.state != SessionState::Open {
        body["reviewerA"] = json!(session.reviewer_a);
        body["reviewerB"] = json!(session.reviewer_b);
    }
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct CastVoteRequest {
    /// "a_wins" | "b_wins" | "tie" | "both_bad".
    pub outcome: String,
    /// Client-supplied idempotency key; reuse it on retry after a timeout.
    #[serde(rename = "voteId")]
    pub vote_id: Option<String>,
}

pub async fn cast_vote(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<CastVoteRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let outcome: Outcome = body.outcome.parse().map_err(error_response)?;
    let vote = ctx
        .sessions
        .record_vote(&id, outcome, body.vote_id)
        .await
        .map_err(error_response)?;

    // Reveal identities and current ratings now that the vote is durable.
    let stats_a = ctx.ratings.stats(&vote.reviewer_a).await;
    let stats_b = ctx.ratings.stats(&vote.reviewer_b).await;
    Ok(Json(json!({
        "voteId": vote.vote_id,
        "sessionId": vote.session_id,
        "outcome": vote.outcome,
        "reviewerA": { "id": vote.reviewer_a, "rating": stats_a.map(|s| s.rating) },
        "reviewerB": { "id": vote.reviewer_b, "rating": stats_b.map(|s| s.rating) },
        "voteTime": vote.vote_time,
    })))
}

pub async fn abandon_comparison(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    ctx.sessions.abandon(&id).await.map_err(error_response)?;
    Ok(Json(json!({ "sessionId": id, "state": "abandoned" })))
}
