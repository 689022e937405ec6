//! Batch synchronization pipeline
//!
//! Loader → reference cache → upsert resolver → executor → reporter, one
//! round per stage, sequenced by the [`Orchestrator`].

pub mod cache;
pub mod executor;
pub mod journal;
pub mod loader;
pub mod mapping;
pub mod orchestrator;
pub mod outcome;
pub mod record;
pub mod report;
pub mod resolver;

pub use cache::ReferenceCache;
pub use loader::RecordReader;
pub use mapping::MappingError;
pub use orchestrator::{Orchestrator, PipelineOptions, RunReport, StageError, StageStatus};
pub use resolver::{Rejected, prepare_task};
