pub mod attachment_service;
pub mod conflict_detector;
pub mod drain_control;
pub mod network_monitor;
pub mod operation_queue;
pub mod read_model_cache;
pub mod status_publisher;
pub mod sync_dispatcher;

pub use attachment_service::{AttachmentDeletion, AttachmentService};
pub use conflict_detector::ConflictDetector;
pub use drain_control::{DrainGate, DrainHold, DrainTrigger};
pub use network_monitor::NetworkMonitor;
pub use operation_queue::OperationQueue;
pub use read_model_cache::ReadModelCache;
pub use status_publisher::StatusPublisher;
pub use sync_dispatcher::SyncDispatcher;
