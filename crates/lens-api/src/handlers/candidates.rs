use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use lens_common::aggregate::{build_candidates, bucket_counts, BucketCounts, CandidateFilter, CandidateRow};
use lens_common::Bucket;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize, Default)]
pub struct CandidateQuery {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CandidateListResponse {
    pub candidates: Vec<CandidateRow>,
    /// Always computed over the full eligible set, not the filtered page.
    pub counts: BucketCounts,
}

pub async fn list_candidates(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(query): Query<CandidateQuery>,
    auth: AuthUser,
) -> Result<Json<CandidateListResponse>, ApiError> {
    state
        .registry
        .get_project(&project_id, &auth.subject)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project not found: {project_id}")))?;

    let bucket = match query.bucket.as_deref() {
        None | Some("") => None,
        Some(code) => Some(
            Bucket::parse(code)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown bucket filter: {code}")))?,
        ),
    };

    let documents = state
        .registry
        .list_documents(&auth.subject, &project_id)
        .await?;
    let ratings = state.registry.list_ratings(&project_id).await?;

    let rows = build_candidates(&documents, &ratings);
    let counts = bucket_counts(&rows);

    let filter = CandidateFilter {
        bucket,
        search: query.search,
    };
    let candidates = rows.into_iter().filter(|row| filter.matches(row)).collect();

    Ok(Json(CandidateListResponse { candidates, counts }))
}
