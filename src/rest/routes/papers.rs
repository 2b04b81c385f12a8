// rest/routes/papers.rs — paper catalog (metadata only, no review texts).

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

pub async fn list_papers(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let papers = ctx.papers.read().await;
    let list: Vec<Value> = papers
        .papers()
        .iter()
        .map(|p| {
            json!({
                "paperId": p.paper_id,
                "title": p.title,
                "pdfPath": p.pdf_path,
                "reviewerKinds": p.valid_reviewer_kinds(),
            })
        })
        .collect();
    Json(json!({ "papers": list }))
}
