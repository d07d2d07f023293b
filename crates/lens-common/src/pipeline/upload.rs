use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::queue::ProcessingQueue;
use crate::extraction::PROGRESS_DOWNLOADED;
use crate::registry::{Registry, RegistryError};
use crate::schema::{Document, DocumentStatus};
use crate::storage::{BlobError, BlobStore};
use crate::sync::{ChangeEvent, EventBus, Op};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("no such project: {0}")]
    NoProject(String),
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Accepts a batch of files for a project: a registry row per file, bytes to
/// the blob store, then hand-off to the processing queue.
pub struct UploadPipeline {
    registry: Arc<dyn Registry>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<ProcessingQueue>,
    bus: Arc<EventBus>,
}

impl UploadPipeline {
    pub fn new(
        registry: Arc<dyn Registry>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<ProcessingQueue>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            blobs,
            queue,
            bus,
        }
    }

    /// Preconditions are checked before any write. Per-file blob failures
    /// mark only that document failed; the rest of the batch continues.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn submit(
        &self,
        files: Vec<UploadFile>,
        project_id: &str,
        owner: &str,
    ) -> Result<Vec<Document>, UploadError> {
        if owner.trim().is_empty() {
            return Err(UploadError::NotAuthenticated);
        }
        if self.registry.get_project(project_id, owner).await?.is_none() {
            return Err(UploadError::NoProject(project_id.to_string()));
        }

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let mut document = Document::new(
                &file.name,
                file.bytes.len() as u64,
                &file.mime_type,
                project_id,
                owner,
            );
            self.registry.upsert_document(&document).await?;
            self.bus.publish(ChangeEvent::document(Op::Insert, &document));

            let path = format!("{project_id}/{}/{}", document.id, file.name);
            match self.blobs.put(&path, &file.bytes).await {
                Ok(url) => {
                    document.storage_path = Some(path);
                    document.storage_url = Some(url);
                    document.status = DocumentStatus::Processing;
                    document.progress = PROGRESS_DOWNLOADED;
                    self.registry.upsert_document(&document).await?;
                    self.bus.publish(ChangeEvent::document(Op::Update, &document));

                    if let Err(err) = self
                        .registry
                        .adjust_document_count(project_id, 1)
                        .await
                    {
                        warn!(project_id, error = %err, "document count bump failed");
                    }

                    self.queue.enqueue(&document.id);
                    info!(document_id = %document.id, name = %document.name, "document accepted");
                }
                Err(err) => {
                    // Terminal for this document; nothing is enqueued.
                    document.status = DocumentStatus::Failed;
                    document.error = Some(format!("upload failed: {err}"));
                    self.registry.upsert_document(&document).await?;
                    self.bus.publish(ChangeEvent::document(Op::Update, &document));
                    warn!(document_id = %document.id, error = %err, "blob write failed");
                }
            }

            documents.push(document);
        }

        Ok(documents)
    }
}
