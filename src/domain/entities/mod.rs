pub mod attachment;
pub mod cached_entity;
pub mod conflict;
pub mod drain_report;
pub mod network_state;
pub mod operation_payload;
pub mod pending_operation;
pub mod sync_status;

pub use attachment::{AttachmentRecord, CapturedFile, EncodedPhoto};
pub use cached_entity::{CachedEntity, RemoteRecord};
pub use conflict::{ConflictAdvisory, ConflictCheck};
pub use drain_report::DrainReport;
pub use network_state::NetworkState;
pub use operation_payload::{
    AgentLocation, FieldPatch, JobStatusChange, OperationPayload, PhotoReference,
};
pub use pending_operation::{OperationDraft, PendingOperation};
pub use sync_status::{QueueCounts, SyncStatus};
