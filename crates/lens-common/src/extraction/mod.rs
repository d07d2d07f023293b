pub mod parser;

use async_trait::async_trait;
use thiserror::Error;

use crate::schema::ParsedPayload;

pub use parser::RuleBasedExtractor;

/// Progress milestones reported while a document is being processed.
/// The queue clamps these so observed progress never decreases.
pub const PROGRESS_DOWNLOADED: u8 = 30;
pub const PROGRESS_PARSING: u8 = 50;
pub const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("document is empty")]
    EmptyDocument,
    #[error("document is not valid utf-8")]
    InvalidEncoding,
}

pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Extraction worker seam. Implementations parse raw document bytes into a
/// structured payload, reporting milestones through the callback.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<ParsedPayload, ExtractionError>;
}
