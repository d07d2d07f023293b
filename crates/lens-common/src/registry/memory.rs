use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Registry, RegistryError};
use crate::schema::{Document, Position, Project, Rating, Requirement, RequirementGroup};

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    positions: HashMap<String, Position>,
    documents: HashMap<String, Document>,
    groups: HashMap<String, RequirementGroup>,
    requirements: HashMap<String, Requirement>,
    ratings: HashMap<String, Rating>, // keyed by document_id
}

/// In-memory registry for tests and local runs. Tracks rating writes so
/// idempotence under concurrent calls is assertable.
#[derive(Default)]
pub struct MemoryRegistry {
    tables: Mutex<Tables>,
    rating_writes: AtomicU64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rating_writes(&self) -> u64 {
        self.rating_writes.load(Ordering::SeqCst)
    }
}

fn group_owner(tables: &Tables, group_id: &str) -> Option<String> {
    tables.groups.get(group_id).map(|g| g.owner.clone())
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn insert_project(&self, project: &Project) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.projects.contains_key(&project.id) {
            return Err(RegistryError::Conflict(format!(
                "project {} already exists",
                project.id
            )));
        }
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &str, owner: &str) -> Result<Option<Project>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .projects
            .get(id)
            .filter(|p| p.owner == owner)
            .cloned())
    }

    async fn list_projects(&self, owner: &str) -> Result<Vec<Project>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn adjust_document_count(
        &self,
        project_id: &str,
        delta: i64,
    ) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let project = tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| RegistryError::NotFound(format!("project {project_id}")))?;
        project.document_count = (project.document_count + delta).max(0);
        project.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_position(&self, position: &Position) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.positions.contains_key(&position.id) {
            return Err(RegistryError::Conflict(format!(
                "position {} already exists",
                position.id
            )));
        }
        tables
            .positions
            .insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.positions.get(id).cloned())
    }

    async fn list_positions(&self) -> Result<Vec<Position>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut positions: Vec<Position> = tables.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(positions)
    }

    async fn upsert_document(&self, document: &Document) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.documents.get(id).cloned())
    }

    async fn list_documents(
        &self,
        owner: &str,
        project_id: &str,
    ) -> Result<Vec<Document>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| d.owner == owner && d.project_id == project_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn insert_group(&self, group: &RequirementGroup) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.groups.contains_key(&group.id) {
            return Err(RegistryError::Conflict(format!(
                "group {} already exists",
                group.id
            )));
        }
        tables.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn get_group(&self, id: &str) -> Result<Option<RequirementGroup>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.groups.get(id).cloned())
    }

    async fn find_enabled_group(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Option<RequirementGroup>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .groups
            .values()
            .find(|g| {
                g.enabled
                    && g.owner == owner
                    && g.project_id == project_id
                    && g.position_id.as_deref() == position_id
            })
            .cloned())
    }

    async fn list_enabled_groups(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Vec<RequirementGroup>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut groups: Vec<RequirementGroup> = tables
            .groups
            .values()
            .filter(|g| {
                g.enabled
                    && g.owner == owner
                    && g.project_id == project_id
                    && position_id
                        .map(|p| g.position_id.as_deref() == Some(p))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(groups)
    }

    async fn insert_requirement(&self, requirement: &Requirement) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.groups.contains_key(&requirement.group_id) {
            return Err(RegistryError::NotFound(format!(
                "group {}",
                requirement.group_id
            )));
        }
        tables
            .requirements
            .insert(requirement.id.clone(), requirement.clone());
        Ok(())
    }

    async fn delete_requirement(&self, id: &str, owner: &str) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let group_id = tables
            .requirements
            .get(id)
            .map(|r| r.group_id.clone())
            .ok_or_else(|| RegistryError::NotFound(format!("requirement {id}")))?;
        match group_owner(&tables, &group_id) {
            Some(ref o) if o == owner => {
                tables.requirements.remove(id);
                Ok(())
            }
            _ => Err(RegistryError::NotFound(format!("requirement {id}"))),
        }
    }

    async fn set_requirement_required(
        &self,
        id: &str,
        owner: &str,
        required: bool,
    ) -> Result<Requirement, RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        let group_id = tables
            .requirements
            .get(id)
            .map(|r| r.group_id.clone())
            .ok_or_else(|| RegistryError::NotFound(format!("requirement {id}")))?;
        if group_owner(&tables, &group_id).as_deref() != Some(owner) {
            return Err(RegistryError::NotFound(format!("requirement {id}")));
        }
        let requirement = tables
            .requirements
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(format!("requirement {id}")))?;
        requirement.required = required;
        Ok(requirement.clone())
    }

    async fn list_requirements(&self, group_id: &str) -> Result<Vec<Requirement>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        let mut requirements: Vec<Requirement> = tables
            .requirements
            .values()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect();
        requirements.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(requirements)
    }

    async fn upsert_rating(&self, rating: &Rating) -> Result<(), RegistryError> {
        let mut tables = self.tables.lock().unwrap();
        self.rating_writes.fetch_add(1, Ordering::SeqCst);
        tables
            .ratings
            .insert(rating.document_id.clone(), rating.clone());
        Ok(())
    }

    async fn get_rating(&self, document_id: &str) -> Result<Option<Rating>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.ratings.get(document_id).cloned())
    }

    async fn list_ratings(&self, project_id: &str) -> Result<Vec<Rating>, RegistryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .ratings
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Bucket, RequirementKind};
    use chrono::Utc;

    #[tokio::test]
    async fn projects_are_scoped_by_owner() {
        let registry = MemoryRegistry::new();
        let project = Project::new("Q3 hiring", "alice");
        registry.insert_project(&project).await.unwrap();

        assert!(registry
            .get_project(&project.id, "alice")
            .await
            .unwrap()
            .is_some());
        assert!(registry
            .get_project(&project.id, "bob")
            .await
            .unwrap()
            .is_none());
        assert!(registry.list_projects("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn document_count_never_goes_negative() {
        let registry = MemoryRegistry::new();
        let project = Project::new("p", "alice");
        registry.insert_project(&project).await.unwrap();

        registry
            .adjust_document_count(&project.id, -5)
            .await
            .unwrap();
        let stored = registry
            .get_project(&project.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.document_count, 0);
    }

    #[tokio::test]
    async fn requirement_deletes_check_group_ownership() {
        let registry = MemoryRegistry::new();
        let group = RequirementGroup::new("Backend Requirements", "p1", None, "alice");
        registry.insert_group(&group).await.unwrap();

        let requirement = Requirement {
            id: "r1".into(),
            group_id: group.id.clone(),
            kind: RequirementKind::Skill,
            value: "Rust".into(),
            required: true,
        };
        registry.insert_requirement(&requirement).await.unwrap();

        let err = registry.delete_requirement("r1", "mallory").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        registry.delete_requirement("r1", "alice").await.unwrap();
        assert!(registry
            .list_requirements(&group.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn group_lookup_distinguishes_position_scope() {
        let registry = MemoryRegistry::new();
        let project_group = RequirementGroup::new("Default Requirements", "p1", None, "alice");
        let position_group =
            RequirementGroup::new("Backend Requirements", "p1", Some("pos1"), "alice");
        registry.insert_group(&project_group).await.unwrap();
        registry.insert_group(&position_group).await.unwrap();

        let found = registry
            .find_enabled_group("alice", "p1", Some("pos1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, position_group.id);

        let all = registry
            .list_enabled_groups("alice", "p1", None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn rating_upserts_are_counted() {
        let registry = MemoryRegistry::new();
        let rating = Rating {
            id: "rat1".into(),
            document_id: "d1".into(),
            project_id: "p1".into(),
            category: Bucket::B,
            rationale: "met 2 of 3".into(),
            rated_at: Utc::now(),
        };

        registry.upsert_rating(&rating).await.unwrap();
        registry.upsert_rating(&rating).await.unwrap();

        assert_eq!(registry.rating_writes(), 2);
        let stored = registry.get_rating("d1").await.unwrap().unwrap();
        assert_eq!(stored.id, "rat1");
    }
}
