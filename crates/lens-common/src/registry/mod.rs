pub mod memory;

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;

pub use memory::MemoryRegistry;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map registry row: {0}")]
    Mapping(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

use crate::schema::{Document, Position, Project, Rating, Requirement, RequirementGroup};

/// Repository over the relational store. One explicit surface keyed by owner
/// and project, so callers never hold their own caches of this data.
#[async_trait]
pub trait Registry: Send + Sync {
    // Projects
    async fn insert_project(&self, project: &Project) -> Result<(), RegistryError>;
    async fn get_project(&self, id: &str, owner: &str) -> Result<Option<Project>, RegistryError>;
    async fn list_projects(&self, owner: &str) -> Result<Vec<Project>, RegistryError>;
    /// Best-effort counter maintenance; callers treat failures as non-fatal.
    async fn adjust_document_count(&self, project_id: &str, delta: i64)
        -> Result<(), RegistryError>;

    // Positions (global, not project-owned)
    async fn insert_position(&self, position: &Position) -> Result<(), RegistryError>;
    async fn get_position(&self, id: &str) -> Result<Option<Position>, RegistryError>;
    async fn list_positions(&self) -> Result<Vec<Position>, RegistryError>;

    // Documents
    async fn upsert_document(&self, document: &Document) -> Result<(), RegistryError>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>, RegistryError>;
    async fn list_documents(
        &self,
        owner: &str,
        project_id: &str,
    ) -> Result<Vec<Document>, RegistryError>;

    // Requirement groups
    async fn insert_group(&self, group: &RequirementGroup) -> Result<(), RegistryError>;
    async fn get_group(&self, id: &str) -> Result<Option<RequirementGroup>, RegistryError>;
    async fn find_enabled_group(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Option<RequirementGroup>, RegistryError>;
    /// Enabled groups for the project; `position_id = None` returns all of
    /// them, `Some(id)` narrows to that position.
    async fn list_enabled_groups(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Vec<RequirementGroup>, RegistryError>;

    // Requirements
    async fn insert_requirement(&self, requirement: &Requirement) -> Result<(), RegistryError>;
    async fn delete_requirement(&self, id: &str, owner: &str) -> Result<(), RegistryError>;
    async fn set_requirement_required(
        &self,
        id: &str,
        owner: &str,
        required: bool,
    ) -> Result<Requirement, RegistryError>;
    async fn list_requirements(&self, group_id: &str) -> Result<Vec<Requirement>, RegistryError>;

    // Ratings
    async fn upsert_rating(&self, rating: &Rating) -> Result<(), RegistryError>;
    async fn get_rating(&self, document_id: &str) -> Result<Option<Rating>, RegistryError>;
    async fn list_ratings(&self, project_id: &str) -> Result<Vec<Rating>, RegistryError>;
}
