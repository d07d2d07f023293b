use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};

use crate::extraction::{Extractor, PROGRESS_DONE, PROGRESS_DOWNLOADED};
use crate::registry::{Registry, RegistryError};
use crate::schema::{Document, DocumentStatus};
use crate::storage::BlobStore;
use crate::sync::{ChangeEvent, EventBus, Op};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    // pending plus in-flight; membership is the single-flight guard
    tracked: HashSet<String>,
}

/// In-process FIFO over document ids. A document id stays in the tracked set
/// from enqueue until its processing attempt finishes, so duplicate enqueues
/// while a document is pending or in flight are suppressed atomically.
#[derive(Default)]
pub struct ProcessingQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id is already pending or in flight.
    pub fn enqueue(&self, document_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.tracked.insert(document_id.to_string()) {
            return false;
        }
        state.pending.push_back(document_id.to_string());
        drop(state);
        self.notify.notify_one();
        true
    }

    pub fn tracked_len(&self) -> usize {
        self.state.lock().unwrap().tracked.len()
    }

    pub fn is_tracked(&self, document_id: &str) -> bool {
        self.state.lock().unwrap().tracked.contains(document_id)
    }

    fn pop(&self) -> Option<String> {
        self.state.lock().unwrap().pending.pop_front()
    }

    fn finish(&self, document_id: &str) {
        self.state.lock().unwrap().tracked.remove(document_id);
    }

    /// Sequential drain loop: one document at a time, in arrival order.
    /// Runs until the task is dropped.
    pub async fn run(&self, worker: &ProcessingWorker) {
        loop {
            match self.pop() {
                Some(document_id) => {
                    if let Err(err) = worker.process(&document_id).await {
                        error!(%document_id, error = %err, "processing attempt failed");
                    }
                    self.finish(&document_id);
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Process until the queue is empty. Test helper mirroring one pass of
    /// the drain loop.
    pub async fn drain_pending(&self, worker: &ProcessingWorker) {
        while let Some(document_id) = self.pop() {
            if let Err(err) = worker.process(&document_id).await {
                error!(%document_id, error = %err, "processing attempt failed");
            }
            self.finish(&document_id);
        }
    }
}

/// One processing step: download, extract, then write the terminal state.
pub struct ProcessingWorker {
    registry: Arc<dyn Registry>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn Extractor>,
    bus: Arc<EventBus>,
}

impl ProcessingWorker {
    pub fn new(
        registry: Arc<dyn Registry>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn Extractor>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            blobs,
            extractor,
            bus,
        }
    }

    pub async fn process(&self, document_id: &str) -> Result<(), RegistryError> {
        let Some(mut document) = self.registry.get_document(document_id).await? else {
            warn!(document_id, "queued document no longer exists");
            return Ok(());
        };

        if document.status != DocumentStatus::Processing {
            warn!(
                document_id,
                status = document.status.as_str(),
                "skipping document not in processing state"
            );
            return Ok(());
        }

        let Some(path) = document.storage_path.clone() else {
            self.fail(&mut document, "document has no stored bytes").await?;
            return Ok(());
        };

        let bytes = match self.blobs.get(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.fail(&mut document, &format!("download failed: {err}"))
                    .await?;
                return Ok(());
            }
        };

        self.advance_progress(&mut document, PROGRESS_DOWNLOADED)
            .await?;

        // Milestones arrive through a sync callback while extract is awaited.
        // A watch channel carries them to a writer task; send_if_modified
        // keeps observed progress monotonic.
        let (tx, mut rx) = watch::channel(document.progress);
        let writer = {
            let registry = Arc::clone(&self.registry);
            let bus = Arc::clone(&self.bus);
            let mut snapshot = document.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let progress = *rx.borrow_and_update();
                    if progress > snapshot.progress && progress < PROGRESS_DONE {
                        snapshot.progress = progress;
                        if registry.upsert_document(&snapshot).await.is_ok() {
                            bus.publish(ChangeEvent::document(Op::Update, &snapshot));
                        }
                    }
                }
                snapshot.progress
            })
        };

        let report = move |progress: u8| {
            tx.send_if_modified(|current| {
                if progress > *current {
                    *current = progress;
                    true
                } else {
                    false
                }
            });
        };
        let outcome = self
            .extractor
            .extract(&bytes, &document.mime_type, &report)
            .await;
        drop(report);
        // Fold the writer's last persisted milestone back into the local copy
        // so the terminal write cannot move progress backwards.
        if let Ok(persisted) = writer.await {
            document.progress = document.progress.max(persisted);
        }

        match outcome {
            Ok(parsed) => {
                document.parsed = Some(parsed);
                document.status = DocumentStatus::Completed;
                document.progress = PROGRESS_DONE;
                document.error = None;
                self.registry.upsert_document(&document).await?;
                self.bus.publish(ChangeEvent::document(Op::Update, &document));
                info!(document_id, "document processed");
            }
            Err(err) => {
                self.fail(&mut document, &err.to_string()).await?;
            }
        }

        Ok(())
    }

    async fn advance_progress(
        &self,
        document: &mut Document,
        progress: u8,
    ) -> Result<(), RegistryError> {
        if progress <= document.progress {
            return Ok(());
        }
        document.progress = progress;
        self.registry.upsert_document(document).await?;
        self.bus.publish(ChangeEvent::document(Op::Update, document));
        Ok(())
    }

    /// Terminal failure: error recorded, progress frozen where it was.
    /// Recovery is a fresh upload under a new document id.
    async fn fail(&self, document: &mut Document, message: &str) -> Result<(), RegistryError> {
        warn!(document_id = %document.id, message, "document failed");
        document.status = DocumentStatus::Failed;
        document.error = Some(message.to_string());
        self.registry.upsert_document(document).await?;
        self.bus.publish(ChangeEvent::document(Op::Update, document));
        Ok(())
    }
}
