use crate::domain::entities::{CapturedFile, EncodedPhoto};
use crate::shared::error::AppError;

/// CPU-bound compression and transport encoding of a captured photo.
pub trait PhotoEncoder: Send + Sync {
    fn encode(&self, file: &CapturedFile) -> Result<EncodedPhoto, AppError>;
}
