//! Offline-first synchronization engine for field operations.
//!
//! Writes are recorded as durable intents in a local operation log and
//! drained against the remote system of record whenever connectivity is
//! verified. Reads are served from a local mirror of remote collections.

pub mod application;
pub mod domain;
pub mod engine;
pub mod infrastructure;
pub mod shared;

pub use application::ports::{
    AttachmentUpload, LocalStore, PhotoEncoder, ReachabilityProbe, RemoteApply, RemoteError,
    RemoteReader, RemoteWrite,
};
pub use application::services::AttachmentDeletion;
pub use domain::entities::{
    AgentLocation, AttachmentRecord, CachedEntity, CapturedFile, ConflictAdvisory, DrainReport,
    FieldPatch, JobStatusChange, NetworkState, OperationPayload, PendingOperation, PhotoReference,
    RemoteRecord, SyncStatus,
};
pub use domain::value_objects::{
    AttachmentId, Collection, EntityId, OperationId, OperationType, PhotoPhase,
};
pub use engine::{RemoteEndpoints, SyncEngine};
pub use shared::{AppConfig, AppError, Result};
