use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::{Registry, RegistryError};
use crate::schema::{Position, Project, Requirement, RequirementGroup, RequirementKind};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("requirement value must not be blank")]
    BlankValue,
}

/// Find the enabled group for (owner, project, position), creating
/// `"{title} Requirements"` on first use.
pub async fn get_or_create_group(
    registry: &dyn Registry,
    project_id: &str,
    position: &Position,
    owner: &str,
) -> Result<RequirementGroup, RegistryError> {
    if let Some(group) = registry
        .find_enabled_group(owner, project_id, Some(&position.id))
        .await?
    {
        return Ok(group);
    }

    let group = RequirementGroup::new(
        &format!("{} Requirements", position.title),
        project_id,
        Some(&position.id),
        owner,
    );
    registry.insert_group(&group).await?;
    info!(group_id = %group.id, position = %position.title, "created requirement group");
    Ok(group)
}

/// Create the empty project-scoped group every new project starts with.
/// Called explicitly from project creation, never as a hidden side effect.
pub async fn provision_default_group(
    registry: &dyn Registry,
    project: &Project,
) -> Result<RequirementGroup, RegistryError> {
    let group = RequirementGroup::new(
        &format!("{} Requirements", project.name),
        &project.id,
        None,
        &project.owner,
    );
    registry.insert_group(&group).await?;
    Ok(group)
}

/// Validate and build a requirement. Blank values are rejected; experience
/// values without a numeric years token are accepted with a warning since
/// the check falls back to plain text containment.
pub fn build_requirement(
    group_id: &str,
    kind: RequirementKind,
    value: &str,
    required: bool,
) -> Result<Requirement, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::BlankValue);
    }

    if kind == RequirementKind::Experience && !value.chars().any(|c| c.is_ascii_digit()) {
        warn!(value, "experience requirement has no numeric years token");
    }

    Ok(Requirement {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        kind,
        value: value.to_string(),
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    #[test]
    fn blank_values_are_rejected() {
        let err = build_requirement("g1", RequirementKind::Skill, "   ", true).unwrap_err();
        assert!(matches!(err, ValidationError::BlankValue));
    }

    #[test]
    fn experience_without_years_is_accepted() {
        let requirement =
            build_requirement("g1", RequirementKind::Experience, "backend work", false).unwrap();
        assert_eq!(requirement.value, "backend work");
        assert!(!requirement.required);
    }

    #[test]
    fn values_are_trimmed() {
        let requirement =
            build_requirement("g1", RequirementKind::Keyword, "  fintech  ", true).unwrap();
        assert_eq!(requirement.value, "fintech");
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_position() {
        let registry = MemoryRegistry::new();
        let position = Position::new("Backend Engineer", "builds services");

        let first = get_or_create_group(&registry, "p1", &position, "alice")
            .await
            .unwrap();
        let second = get_or_create_group(&registry, "p1", &position, "alice")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Backend Engineer Requirements");
    }

    #[tokio::test]
    async fn default_group_is_project_scoped() {
        let registry = MemoryRegistry::new();
        let project = Project::new("Q3 hiring", "alice");
        registry.insert_project(&project).await.unwrap();

        let group = provision_default_group(&registry, &project).await.unwrap();
        assert!(group.position_id.is_none());
        assert!(group.enabled);

        let found = registry
            .find_enabled_group("alice", &project.id, None)
            .await
            .unwrap();
        assert_eq!(found.map(|g| g.id), Some(group.id));
    }
}
