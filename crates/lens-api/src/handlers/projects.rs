use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use lens_common::requirements::provision_default_group;
use lens_common::{Project, RequirementGroup};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    pub project: Project,
    pub default_group: RequirementGroup,
}

/// Every new project starts with an empty enabled requirement group, so
/// rating is possible as soon as requirements are added to it.
pub async fn create_project(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<Json<CreateProjectResponse>, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name must not be blank".into()));
    }

    let project = Project::new(name, &auth.subject);
    state.registry.insert_project(&project).await?;
    let default_group = provision_default_group(state.registry.as_ref(), &project).await?;

    info!(project_id = %project.id, "created project");

    Ok(Json(CreateProjectResponse {
        project,
        default_group,
    }))
}

pub async fn list_projects(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state.registry.list_projects(&auth.subject).await?;
    Ok(Json(projects))
}
