use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use lens_common::Rating;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize, Default)]
pub struct RateRequest {
    /// Narrows matching to that position's requirement group; absent means
    /// every enabled group on the project applies.
    #[serde(default)]
    pub position_id: Option<String>,
}

pub async fn rate_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    auth: AuthUser,
    payload: Option<Json<RateRequest>>,
) -> Result<Json<Rating>, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();

    // Ownership is checked here so callers cannot probe other owners'
    // documents through the engine.
    state
        .registry
        .get_document(&id)
        .await?
        .filter(|document| document.owner == auth.subject)
        .ok_or_else(|| ApiError::NotFound(format!("document not found: {id}")))?;

    let rating = state.engine.rate(&id, payload.position_id.as_deref()).await?;
    Ok(Json(rating))
}

pub async fn get_rating(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Rating>, ApiError> {
    state
        .registry
        .get_document(&id)
        .await?
        .filter(|document| document.owner == auth.subject)
        .ok_or_else(|| ApiError::NotFound(format!("document not found: {id}")))?;

    let rating = state
        .registry
        .get_rating(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no rating for document: {id}")))?;
    Ok(Json(rating))
}
