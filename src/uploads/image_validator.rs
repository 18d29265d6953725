//! Payment slip image validation.
//!
//! Checks run cheapest first: declared metadata, magic bytes, then an actual
//! decode. Nothing is uploaded unless every check passes.

use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::config::UploadConfig;
use crate::uploads::UploadedFile;

const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("file content does not match declared {declared} signature")]
    BadSignature { declared: String },

    #[error("image too small: {detail}")]
    TooSmall { detail: String },

    #[error("image too large: {detail}")]
    TooLarge { detail: String },

    #[error("image could not be decoded: {message}")]
    ProcessingFailed { message: String },

    #[error("image format mismatch: {detail}")]
    FormatMismatch { detail: String },
}

/// Image types accepted for payment slips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipFormat {
    Jpeg,
    Png,
}

impl SlipFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(SlipFormat::Jpeg),
            "image/png" => Some(SlipFormat::Png),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(SlipFormat::Jpeg),
            "png" => Some(SlipFormat::Png),
            _ => None,
        }
    }

    pub fn signature(&self) -> &'static [u8] {
        match self {
            SlipFormat::Jpeg => JPEG_SIGNATURE,
            SlipFormat::Png => PNG_SIGNATURE,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SlipFormat::Jpeg => "image/jpeg",
            SlipFormat::Png => "image/png",
        }
    }

    /// Canonical extension used for stored objects
    pub fn extension(&self) -> &'static str {
        match self {
            SlipFormat::Jpeg => "jpg",
            SlipFormat::Png => "png",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            SlipFormat::Jpeg => ImageFormat::Jpeg,
            SlipFormat::Png => ImageFormat::Png,
        }
    }
}

/// What a successful validation learned about the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedImage {
    pub format: SlipFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    config: UploadConfig,
}

impl ImageValidator {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, file: &UploadedFile) -> Result<ValidatedImage, ImageError> {
        let format = self.check_metadata(file)?;
        check_signature(&file.bytes, format)?;
        let (width, height) = self.check_decoded(&file.bytes, format)?;

        debug!(
            file_name = %file.file_name,
            width,
            height,
            format = format.mime_type(),
            "payment slip image validated"
        );

        Ok(ValidatedImage {
            format,
            width,
            height,
        })
    }

    /// Size, MIME type and extension
    fn check_metadata(&self, file: &UploadedFile) -> Result<SlipFormat, ImageError> {
        if file.bytes.is_empty() {
            return Err(ImageError::TooSmall {
                detail: "file is empty".to_string(),
            });
        }
        if file.bytes.len() > self.config.max_file_bytes {
            return Err(ImageError::TooLarge {
                detail: format!(
                    "{} bytes exceeds the {} byte limit",
                    file.bytes.len(),
                    self.config.max_file_bytes
                ),
            });
        }

        let mime = file.content_type.trim().to_lowercase();
        let mime_format = self
            .config
            .allowed_mime_types
            .contains(&mime)
            .then(|| SlipFormat::from_mime(&mime))
            .flatten()
            .ok_or_else(|| ImageError::FormatMismatch {
                detail: format!("content type '{}' is not allowed", file.content_type),
            })?;

        let ext = file.extension().unwrap_or_default();
        let ext_format = self
            .config
            .allowed_extensions
            .contains(&ext)
            .then(|| SlipFormat::from_extension(&ext))
            .flatten()
            .ok_or_else(|| ImageError::FormatMismatch {
                detail: format!("file extension of '{}' is not allowed", file.file_name),
            })?;

        if mime_format != ext_format {
            return Err(ImageError::FormatMismatch {
                detail: format!(
                    "content type '{}' does not match extension '{}'",
                    mime, ext
                ),
            });
        }

        Ok(mime_format)
    }

    fn check_decoded(&self, bytes: &[u8], declared: SlipFormat) -> Result<(u32, u32), ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::ProcessingFailed {
                message: e.to_string(),
            })?;

        match reader.format() {
            Some(format) if format == declared.image_format() => {}
            Some(format) => {
                return Err(ImageError::FormatMismatch {
                    detail: format!(
                        "decoded {:?} but declared {}",
                        format,
                        declared.mime_type()
                    ),
                })
            }
            None => {
                return Err(ImageError::ProcessingFailed {
                    message: "unrecognized image data".to_string(),
                })
            }
        }

        let (width, height) =
            reader
                .into_dimensions()
                .map_err(|e| ImageError::ProcessingFailed {
                    message: e.to_string(),
                })?;

        let (min, max) = (self.config.min_dimension, self.config.max_dimension);
        if width < min || height < min {
            return Err(ImageError::TooSmall {
                detail: format!("{}x{} is below the {}px minimum", width, height, min),
            });
        }
        if width > max || height > max {
            return Err(ImageError::TooLarge {
                detail: format!("{}x{} exceeds the {}px maximum", width, height, max),
            });
        }

        // Header parsed; make sure the pixel data is intact too.
        image::load_from_memory_with_format(bytes, declared.image_format()).map_err(|e| {
            ImageError::ProcessingFailed {
                message: e.to_string(),
            }
        })?;

        Ok((width, height))
    }
}

fn check_signature(bytes: &[u8], declared: SlipFormat) -> Result<(), ImageError> {
    if bytes.starts_with(declared.signature()) {
        Ok(())
    } else {
        Err(ImageError::BadSignature {
            declared: declared.mime_type().to_string(),
        })
    }
}
