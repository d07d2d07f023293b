pub mod queue;
pub mod upload;

pub use queue::{ProcessingQueue, ProcessingWorker};
pub use upload::{UploadError, UploadFile, UploadPipeline};
