pub mod local_store;
pub mod photo_encoder;
pub mod reachability;
pub mod remote;

pub use local_store::{EntityPredicate, LocalStore};
pub use photo_encoder::PhotoEncoder;
pub use reachability::ReachabilityProbe;
pub use remote::{AttachmentUpload, RemoteApply, RemoteError, RemoteReader, RemoteWrite};
