pub mod aggregate;
pub mod db;
pub mod extraction;
pub mod logging;
pub mod matching;
pub mod pipeline;
pub mod registry;
pub mod requirements;
pub mod schema;
pub mod storage;
pub mod sync;

pub use registry::{MemoryRegistry, Registry, RegistryError};
pub use schema::{
    Bucket, Document, DocumentStatus, ParsedPayload, Position, Project, Rating, Requirement,
    RequirementGroup, RequirementKind,
};
