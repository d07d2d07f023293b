use axum::{extract::State, Json};
use serde::Deserialize;

use lens_common::Position;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreatePositionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_skills: Vec<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

pub async fn create_position(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(payload): Json<CreatePositionRequest>,
) -> Result<Json<Position>, ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("position title must not be blank".into()));
    }

    let mut position = Position::new(title, payload.description.trim());
    position.key_skills = payload.key_skills;
    position.qualifications = payload.qualifications;

    state.registry.insert_position(&position).await?;
    Ok(Json(position))
}

pub async fn list_positions(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Position>>, ApiError> {
    let positions = state.registry.list_positions().await?;
    Ok(Json(positions))
}
