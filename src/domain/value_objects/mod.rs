pub mod attachment_id;
pub mod collection;
pub mod entity_id;
pub mod operation_id;
pub mod operation_type;
pub mod photo_phase;

pub use attachment_id::AttachmentId;
pub use collection::Collection;
pub use entity_id::EntityId;
pub use operation_id::OperationId;
pub use operation_type::OperationType;
pub use photo_phase::PhotoPhase;
