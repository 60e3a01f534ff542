//! Image capture session
//!
//! Holds the one image a user is about to submit. A new capture replaces
//! the previous image wholesale; resetting releases both the image and any
//! result shown for it.

use std::fmt;
use std::path::Path;

use image::ImageFormat;
use thiserror::Error;
use tracing::debug;

use super::result::ScanResult;

/// MIME type sent when the payload format cannot be sniffed
pub const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

/// Where a captured image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Camera,
    File,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Camera => write!(f, "camera"),
            ImageSource::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a recognised image file")]
    NotAnImage(String),

    #[error("{0} is empty")]
    Empty(String),
}

/// Raw bytes of one photographed or selected image
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    source: ImageSource,
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("len", &self.bytes.len())
            .field("source", &self.source)
            .finish()
    }
}

impl CapturedImage {
    pub fn new(bytes: impl Into<Vec<u8>>, source: ImageSource) -> Self {
        Self {
            bytes: bytes.into(),
            source,
        }
    }

    /// Load an image file, rejecting anything that does not look like an image
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty(path.display().to_string()));
        }
        let format = image::guess_format(&bytes)
            .map_err(|_| CaptureError::NotAnImage(path.display().to_string()))?;

        debug!(path = %path.display(), ?format, bytes = bytes.len(), "Loaded image file");
        Ok(Self::new(bytes, ImageSource::File))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    /// MIME type of the payload, sniffed from its leading bytes
    pub fn content_type(&self) -> &'static str {
        image::guess_format(&self.bytes)
            .map(|format: ImageFormat| format.to_mime_type())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
    }

    /// Binary upload payload
    pub fn to_payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// The capture step of the scan workflow
#[derive(Debug, Default)]
pub struct CaptureSession {
    image: Option<CapturedImage>,
    result: Option<ScanResult>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a new image, discarding the previous image and its result
    pub fn capture(&mut self, bytes: impl Into<Vec<u8>>, source: ImageSource) -> &CapturedImage {
        self.result = None;
        self.image.insert(CapturedImage::new(bytes, source))
    }

    /// Hold an already loaded image
    pub fn hold(&mut self, image: CapturedImage) -> &CapturedImage {
        self.result = None;
        self.image.insert(image)
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    /// Whether the held image may be submitted
    pub fn can_submit(&self) -> bool {
        self.image.as_ref().is_some_and(|image| !image.is_empty())
    }

    /// Display a result for the held image
    pub fn show_result(&mut self, result: ScanResult) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.result.as_ref()
    }

    /// Release the held image and any displayed result
    pub fn reset(&mut self) {
        self.image = None;
        self.result = None;
    }
}
