use crate::application::ports::PhotoEncoder;
use crate::domain::entities::{CapturedFile, EncodedPhoto};
use crate::shared::config::AttachmentConfig;
use crate::shared::error::AppError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView};
use sha2::{Digest, Sha256};

const OUTPUT_MIME: &str = "image/jpeg";
const QUALITY_STEP: u8 = 10;
const SHRINK_FACTOR: f64 = 0.75;
const MIN_DIMENSION: u32 = 64;

/// Re-encodes captured photos as bounded JPEGs and base64-encodes them for
/// storage and transport.
#[derive(Debug, Clone)]
pub struct JpegPhotoEncoder {
    config: AttachmentConfig,
}

impl JpegPhotoEncoder {
    pub fn new(config: AttachmentConfig) -> Self {
        Self { config }
    }

    fn check_input(&self, file: &CapturedFile) -> Result<(), AppError> {
        let content_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !self
            .config
            .accepted_content_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&content_type))
        {
            return Err(AppError::Validation(format!(
                "{} is not an accepted image type ({})",
                file.file_name, file.content_type
            )));
        }
        if file.bytes.is_empty() {
            return Err(AppError::Validation(format!("{} is empty", file.file_name)));
        }
        if file.bytes.len() > self.config.max_input_bytes {
            return Err(AppError::Validation(format!(
                "{} is {} bytes, limit is {}",
                file.file_name,
                file.bytes.len(),
                self.config.max_input_bytes
            )));
        }
        Ok(())
    }

    fn fit(&self, image: DynamicImage, bound: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        if width <= bound && height <= bound {
            image
        } else {
            image.resize(bound, bound, FilterType::Triangle)
        }
    }

    fn compress(&self, image: &DynamicImage) -> Result<(Vec<u8>, u32, u32), AppError> {
        let mut bound = self.config.max_dimension;
        loop {
            let candidate = self.fit(image.clone(), bound);
            let (width, height) = candidate.dimensions();
            let rgb = candidate.to_rgb8();

            let mut quality = self.config.initial_quality;
            loop {
                let mut buffer = Vec::new();
                JpegEncoder::new_with_quality(&mut buffer, quality).encode(
                    rgb.as_raw(),
                    width,
                    height,
                    ColorType::Rgb8,
                )?;
                if buffer.len() <= self.config.max_encoded_bytes {
                    return Ok((buffer, width, height));
                }
                if quality <= self.config.min_quality {
                    break;
                }
                quality = quality
                    .saturating_sub(QUALITY_STEP)
                    .max(self.config.min_quality);
            }

            let current = width.max(height);
            if current <= MIN_DIMENSION {
                return Err(AppError::Validation(format!(
                    "photo cannot be compressed below {} bytes",
                    self.config.max_encoded_bytes
                )));
            }
            bound = ((f64::from(current) * SHRINK_FACTOR) as u32).max(MIN_DIMENSION);
        }
    }
}

impl PhotoEncoder for JpegPhotoEncoder {
    fn encode(&self, file: &CapturedFile) -> Result<EncodedPhoto, AppError> {
        self.check_input(file)?;

        let image = image::load_from_memory(&file.bytes)?;
        let (jpeg, width, height) = self.compress(&image)?;

        Ok(EncodedPhoto {
            encoded: STANDARD.encode(&jpeg),
            mime_type: OUTPUT_MIME.to_string(),
            byte_size: jpeg.len() as u64,
            width,
            height,
            sha256: format!("{:x}", Sha256::digest(&jpeg)),
        })
    }
}
