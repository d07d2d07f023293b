use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "core intake tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS lens.projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    document_count BIGINT NOT NULL DEFAULT 0 CHECK (document_count >= 0)
);
CREATE INDEX IF NOT EXISTS idx_projects_owner ON lens.projects(owner, created_at DESC);

CREATE TABLE IF NOT EXISTS lens.positions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    key_skills JSONB NOT NULL DEFAULT '[]',
    qualifications JSONB NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS lens.documents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    size BIGINT NOT NULL CHECK (size >= 0),
    mime_type TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('uploading', 'processing', 'completed', 'failed')),
    progress SMALLINT NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
    project_id TEXT NOT NULL REFERENCES lens.projects(id),
    owner TEXT NOT NULL,
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    storage_path TEXT,
    storage_url TEXT,
    error TEXT,
    parsed JSONB
);
CREATE INDEX IF NOT EXISTS idx_documents_owner_project
    ON lens.documents(owner, project_id, uploaded_at DESC);
"#,
    },
    Migration {
        id: 2,
        description: "requirement groups and requirements",
        sql: r#"
CREATE TABLE IF NOT EXISTS lens.requirement_groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    project_id TEXT NOT NULL REFERENCES lens.projects(id),
    position_id TEXT REFERENCES lens.positions(id),
    owner TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_requirement_groups_scope
    ON lens.requirement_groups(owner, project_id, position_id) WHERE enabled;

CREATE TABLE IF NOT EXISTS lens.requirements (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES lens.requirement_groups(id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('skill', 'experience', 'education', 'location', 'keyword')),
    value TEXT NOT NULL CHECK (length(trim(value)) > 0),
    required BOOLEAN NOT NULL DEFAULT TRUE
);
CREATE INDEX IF NOT EXISTS idx_requirements_group ON lens.requirements(group_id);
"#,
    },
    Migration {
        id: 3,
        description: "candidate ratings, one row per document",
        sql: r#"
CREATE TABLE IF NOT EXISTS lens.ratings (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL UNIQUE REFERENCES lens.documents(id),
    project_id TEXT NOT NULL REFERENCES lens.projects(id),
    category TEXT NOT NULL CHECK (category IN ('A', 'B', 'C', 'D')),
    rationale TEXT NOT NULL DEFAULT '',
    rated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_ratings_project ON lens.ratings(project_id);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS lens;
             CREATE TABLE IF NOT EXISTS lens.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM lens.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO lens.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
