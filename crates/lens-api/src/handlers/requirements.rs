use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use lens_common::requirements::{build_requirement, get_or_create_group};
use lens_common::{Requirement, RequirementGroup, RequirementKind};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct GroupWithRequirements {
    pub group: RequirementGroup,
    pub requirements: Vec<Requirement>,
}

/// Requirements for a (project, position) pair. The group is created on
/// first access so the GUI always has a stable id to add requirements to.
pub async fn position_requirements(
    State(state): State<SharedState>,
    Path((project_id, position_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<Json<GroupWithRequirements>, ApiError> {
    let registry = state.registry.as_ref();

    registry
        .get_project(&project_id, &auth.subject)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project not found: {project_id}")))?;
    let position = registry
        .get_position(&position_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("position not found: {position_id}")))?;

    let group = get_or_create_group(registry, &project_id, &position, &auth.subject).await?;
    let requirements = registry.list_requirements(&group.id).await?;

    Ok(Json(GroupWithRequirements { group, requirements }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequirementRequest {
    pub group_id: String,
    pub kind: String,
    pub value: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

pub async fn create_requirement(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<CreateRequirementRequest>,
) -> Result<Json<Requirement>, ApiError> {
    let kind = RequirementKind::parse(&payload.kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown requirement kind: {}", payload.kind)))?;

    let group = state
        .registry
        .get_group(&payload.group_id)
        .await?
        .filter(|group| group.owner == auth.subject)
        .ok_or_else(|| ApiError::NotFound(format!("group not found: {}", payload.group_id)))?;

    let requirement = build_requirement(&group.id, kind, &payload.value, payload.required)?;
    state.registry.insert_requirement(&requirement).await?;

    Ok(Json(requirement))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequirementRequest {
    pub required: bool,
}

pub async fn update_requirement(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    auth: AuthUser,
    Json(payload): Json<UpdateRequirementRequest>,
) -> Result<Json<Requirement>, ApiError> {
    let requirement = state
        .registry
        .set_requirement_required(&id, &auth.subject, payload.required)
        .await?;
    Ok(Json(requirement))
}

pub async fn delete_requirement(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<StatusCode, ApiError> {
    state.registry.delete_requirement(&id, &auth.subject).await?;
    Ok(StatusCode::NO_CONTENT)
}
