use std::path::Path;

use crate::error::UploadError;

/// Trait for models that can be driven by the [`DetectionEngine`](crate::DetectionEngine).
///
/// A model owns whatever it needs to answer a request (a network client, a
/// credential) and is moved onto the engine's worker thread.
pub trait InferenceModel {
    /// The request type that the model accepts.
    type Request;
    /// The response type that the model produces.
    type Response;
    /// The error type that a single inference can fail with.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one inference. Blocks until the model answers or fails.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Extracts lightweight metadata from a request before it is consumed.
///
/// The engine keeps the metadata next to the response so callers can report
/// what was analyzed without holding on to the image bytes.
pub trait RequestMetadata {
    type Metadata: Send + 'static;

    fn metadata(&self) -> Self::Metadata;
}

/// File extensions the detector accepts, compared case-insensitively.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Raw bytes of one uploaded still image.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
        }
    }

    /// Builds a payload from an uploaded file, checking only its name and size.
    ///
    /// The bytes are not decoded; a file named `.png` holding anything else is
    /// accepted here and left for the remote model to reject.
    pub fn from_upload(
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, UploadError> {
        let file_name = file_name.into();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or(UploadError::MissingExtension)?;

        if !ACCEPTED_EXTENSIONS
            .iter()
            .any(|accepted| extension.eq_ignore_ascii_case(accepted))
        {
            return Err(UploadError::UnsupportedFormat(extension.to_string()));
        }

        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        Ok(Self {
            bytes,
            file_name: Some(file_name),
        })
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What the engine remembers about an [`ImagePayload`] once it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub file_name: Option<String>,
    pub size_bytes: usize,
}

impl RequestMetadata for ImagePayload {
    type Metadata = UploadInfo;

    fn metadata(&self) -> Self::Metadata {
        UploadInfo {
            file_name: self.file_name.clone(),
            size_bytes: self.bytes.len(),
        }
    }
}
