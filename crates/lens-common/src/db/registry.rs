use async_trait::async_trait;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::PgPool;
use crate::registry::{Registry, RegistryError};
use crate::schema::{
    Bucket, Document, DocumentStatus, ParsedPayload, Position, Project, Rating, Requirement,
    RequirementGroup, RequirementKind,
};

/// Postgres-backed registry. One prepared statement per operation; row
/// mapping goes through `try_get` so schema drift fails loudly.
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> Result<DocumentStatus, RegistryError> {
    DocumentStatus::parse(value)
        .ok_or_else(|| RegistryError::Mapping(format!("unknown document status: {value}")))
}

fn parse_kind(value: &str) -> Result<RequirementKind, RegistryError> {
    RequirementKind::parse(value)
        .ok_or_else(|| RegistryError::Mapping(format!("unknown requirement kind: {value}")))
}

fn parse_bucket(value: &str) -> Result<Bucket, RegistryError> {
    Bucket::parse(value)
        .ok_or_else(|| RegistryError::Mapping(format!("unknown rating category: {value}")))
}

fn row_to_project(row: &Row) -> Result<Project, RegistryError> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner: row.try_get("owner")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        document_count: row.try_get("document_count")?,
    })
}

fn row_to_position(row: &Row) -> Result<Position, RegistryError> {
    Ok(Position {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        key_skills: row.try_get::<_, Json<Vec<String>>>("key_skills")?.0,
        qualifications: row.try_get::<_, Json<Vec<String>>>("qualifications")?.0,
    })
}

fn row_to_document(row: &Row) -> Result<Document, RegistryError> {
    Ok(Document {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        size: row
            .try_get::<_, i64>("size")
            .map_err(RegistryError::from)
            .and_then(|v| {
                u64::try_from(v).map_err(|e| RegistryError::Mapping(e.to_string()))
            })?,
        mime_type: row.try_get("mime_type")?,
        status: parse_status(row.try_get::<_, String>("status")?.as_str())?,
        progress: row
            .try_get::<_, i16>("progress")
            .map_err(RegistryError::from)
            .and_then(|v| {
                u8::try_from(v).map_err(|e| RegistryError::Mapping(e.to_string()))
            })?,
        project_id: row.try_get("project_id")?,
        owner: row.try_get("owner")?,
        uploaded_at: row.try_get("uploaded_at")?,
        storage_path: row.try_get("storage_path")?,
        storage_url: row.try_get("storage_url")?,
        error: row.try_get("error")?,
        parsed: row
            .try_get::<_, Option<Json<ParsedPayload>>>("parsed")?
            .map(|json| json.0),
    })
}

fn row_to_group(row: &Row) -> Result<RequirementGroup, RegistryError> {
    Ok(RequirementGroup {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        project_id: row.try_get("project_id")?,
        position_id: row.try_get("position_id")?,
        owner: row.try_get("owner")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_requirement(row: &Row) -> Result<Requirement, RegistryError> {
    Ok(Requirement {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        kind: parse_kind(row.try_get::<_, String>("kind")?.as_str())?,
        value: row.try_get("value")?,
        required: row.try_get("required")?,
    })
}

fn row_to_rating(row: &Row) -> Result<Rating, RegistryError> {
    Ok(Rating {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        project_id: row.try_get("project_id")?,
        category: parse_bucket(row.try_get::<_, String>("category")?.as_str())?,
        rationale: row.try_get("rationale")?,
        rated_at: row.try_get("rated_at")?,
    })
}

#[async_trait]
impl Registry for PgRegistry {
    #[instrument(skip(self, project))]
    async fn insert_project(&self, project: &Project) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.projects (id, name, owner, created_at, updated_at, document_count)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &project.id,
                    &project.name,
                    &project.owner,
                    &project.created_at,
                    &project.updated_at,
                    &project.document_count,
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_project(&self, id: &str, owner: &str) -> Result<Option<Project>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM lens.projects WHERE id = $1 AND owner = $2",
                &[&id, &owner],
            )
            .await?;
        row.map(|r| row_to_project(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, owner: &str) -> Result<Vec<Project>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM lens.projects WHERE owner = $1 ORDER BY created_at DESC",
                &[&owner],
            )
            .await?;
        rows.iter().map(row_to_project).collect()
    }

    #[instrument(skip(self))]
    async fn adjust_document_count(
        &self,
        project_id: &str,
        delta: i64,
    ) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE lens.projects
                 SET document_count = GREATEST(document_count + $2, 0), updated_at = NOW()
                 WHERE id = $1",
                &[&project_id, &delta],
            )
            .await?;
        if updated == 0 {
            return Err(RegistryError::NotFound(format!("project {project_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, position))]
    async fn insert_position(&self, position: &Position) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.positions (id, title, description, key_skills, qualifications)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &position.id,
                    &position.title,
                    &position.description,
                    &Json(&position.key_skills),
                    &Json(&position.qualifications),
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_position(&self, id: &str) -> Result<Option<Position>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM lens.positions WHERE id = $1", &[&id])
            .await?;
        row.map(|r| row_to_position(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_positions(&self) -> Result<Vec<Position>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT * FROM lens.positions ORDER BY title", &[])
            .await?;
        rows.iter().map(row_to_position).collect()
    }

    #[instrument(skip(self, document))]
    async fn upsert_document(&self, document: &Document) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.documents (
                    id, name, size, mime_type, status, progress, project_id, owner,
                    uploaded_at, storage_path, storage_url, error, parsed
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    progress = EXCLUDED.progress,
                    storage_path = EXCLUDED.storage_path,
                    storage_url = EXCLUDED.storage_url,
                    error = EXCLUDED.error,
                    parsed = EXCLUDED.parsed",
            )
            .await?;
        let size = i64::try_from(document.size)
            .map_err(|e| RegistryError::Mapping(e.to_string()))?;
        client
            .execute(
                &stmt,
                &[
                    &document.id,
                    &document.name,
                    &size,
                    &document.mime_type,
                    &document.status.as_str(),
                    &i16::from(document.progress),
                    &document.project_id,
                    &document.owner,
                    &document.uploaded_at,
                    &document.storage_path,
                    &document.storage_url,
                    &document.error,
                    &document.parsed.as_ref().map(Json),
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_document(&self, id: &str) -> Result<Option<Document>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM lens.documents WHERE id = $1", &[&id])
            .await?;
        row.map(|r| row_to_document(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_documents(
        &self,
        owner: &str,
        project_id: &str,
    ) -> Result<Vec<Document>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM lens.documents
                 WHERE owner = $1 AND project_id = $2
                 ORDER BY uploaded_at DESC",
                &[&owner, &project_id],
            )
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    #[instrument(skip(self, group))]
    async fn insert_group(&self, group: &RequirementGroup) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.requirement_groups (
                    id, name, project_id, position_id, owner, enabled, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &group.id,
                    &group.name,
                    &group.project_id,
                    &group.position_id,
                    &group.owner,
                    &group.enabled,
                    &group.created_at,
                    &group.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_group(&self, id: &str) -> Result<Option<RequirementGroup>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM lens.requirement_groups WHERE id = $1", &[&id])
            .await?;
        row.map(|r| row_to_group(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn find_enabled_group(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Option<RequirementGroup>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM lens.requirement_groups
                 WHERE owner = $1 AND project_id = $2
                   AND position_id IS NOT DISTINCT FROM $3
                   AND enabled
                 ORDER BY created_at
                 LIMIT 1",
                &[&owner, &project_id, &position_id],
            )
            .await?;
        row.map(|r| row_to_group(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_enabled_groups(
        &self,
        owner: &str,
        project_id: &str,
        position_id: Option<&str>,
    ) -> Result<Vec<RequirementGroup>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM lens.requirement_groups
                 WHERE owner = $1 AND project_id = $2
                   AND ($3::TEXT IS NULL OR position_id = $3)
                   AND enabled
                 ORDER BY created_at",
                &[&owner, &project_id, &position_id],
            )
            .await?;
        rows.iter().map(row_to_group).collect()
    }

    #[instrument(skip(self, requirement))]
    async fn insert_requirement(&self, requirement: &Requirement) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.requirements (id, group_id, kind, value, required)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &requirement.id,
                    &requirement.group_id,
                    &requirement.kind.as_str(),
                    &requirement.value,
                    &requirement.required,
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_requirement(&self, id: &str, owner: &str) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM lens.requirements r
                 USING lens.requirement_groups g
                 WHERE r.id = $1 AND r.group_id = g.id AND g.owner = $2",
                &[&id, &owner],
            )
            .await?;
        if deleted == 0 {
            return Err(RegistryError::NotFound(format!("requirement {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_requirement_required(
        &self,
        id: &str,
        owner: &str,
        required: bool,
    ) -> Result<Requirement, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE lens.requirements r
                 SET required = $3
                 FROM lens.requirement_groups g
                 WHERE r.id = $1 AND r.group_id = g.id AND g.owner = $2
                 RETURNING r.id, r.group_id, r.kind, r.value, r.required",
                &[&id, &owner, &required],
            )
            .await?;
        match row {
            Some(row) => row_to_requirement(&row),
            None => Err(RegistryError::NotFound(format!("requirement {id}"))),
        }
    }

    #[instrument(skip(self))]
    async fn list_requirements(&self, group_id: &str) -> Result<Vec<Requirement>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM lens.requirements WHERE group_id = $1 ORDER BY id",
                &[&group_id],
            )
            .await?;
        rows.iter().map(row_to_requirement).collect()
    }

    #[instrument(skip(self, rating))]
    async fn upsert_rating(&self, rating: &Rating) -> Result<(), RegistryError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare(
                "INSERT INTO lens.ratings (id, document_id, project_id, category, rationale, rated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (document_id) DO UPDATE SET
                    category = EXCLUDED.category,
                    rationale = EXCLUDED.rationale,
                    rated_at = EXCLUDED.rated_at",
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &rating.id,
                    &rating.document_id,
                    &rating.project_id,
                    &rating.category.as_str(),
                    &rating.rationale,
                    &rating.rated_at,
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_rating(&self, document_id: &str) -> Result<Option<Rating>, RegistryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM lens.ratings WHERE document_id = $1",
                &[&document_id],
            )
            .await?;
        row.map(|r| row_to_rating(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_ratings(&self, project_id: &str) -> Result<Vec<Rating>, RegistryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM lens.ratings WHERE project_id = $1",
                &[&project_id],
            )
            .await?;
        rows.iter().map(row_to_rating).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_rejects_unknown_values() {
        assert!(parse_status("processing").is_ok());
        let err = parse_status("broken").unwrap_err();
        assert!(format!("{err}").contains("unknown document status"));
    }

    #[test]
    fn parse_kind_covers_every_variant() {
        for kind in ["skill", "experience", "education", "location", "keyword"] {
            assert!(parse_kind(kind).is_ok());
        }
        assert!(parse_kind("salary").is_err());
    }

    #[test]
    fn parse_bucket_accepts_stored_form() {
        assert!(matches!(parse_bucket("A"), Ok(Bucket::A)));
        assert!(parse_bucket("F").is_err());
    }
}
