//! formicary: file and work-item pipelines.
//!
//! Jobs appear in [`nest`]s, flow through [`tunnel`]s made of ordered and
//! unordered stages, can be correlated by name, and can be packed into
//! portable archives with [`pack::Packer`].

pub mod config;
pub mod environment;
pub mod error;
pub mod glob;
pub mod job;
pub mod nest;
pub mod pack;
pub mod tunnel;

pub use config::Options;
pub use environment::{Environment, LogLevel, LogRecord, LogSink};
pub use error::StageError;
pub use job::{Job, JobKind};
pub use nest::{FolderNest, MemoryNest, Nest, NestRef};
pub use pack::{PackStage, Packer, Ticket, UnpackStage};
pub use tunnel::{SyncStage, Tunnel, TunnelState};
