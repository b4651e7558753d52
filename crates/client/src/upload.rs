//! Reference image upload.
//!
//! [`AssetUploader`] validates an asset locally (size and format) and
//! only then sends it as a single-field multipart request.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use image::ImageFormat;

use crate::http::{ApiRequest, ClientError, FilePart, HttpTransport, Outcome, TransportError};
use crate::messages::{decode, UploadResponse};

/// Upload endpoint path.
pub const UPLOAD_PATH: &str = "/api/upload-image";

/// Multipart field name the backend reads the file from.
const FILE_FIELD: &str = "file";

/// An asset held in memory, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl LocalAsset {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an asset from disk, naming it after the file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            CoreError::Validation(format!("cannot read {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Uploads assets and returns their addressable URL.
#[derive(Clone)]
pub struct AssetUploader {
    transport: Arc<dyn HttpTransport>,
    max_bytes: u64,
    timeout: Duration,
}

impl AssetUploader {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            max_bytes: config.max_upload_bytes,
            timeout: config.upload_timeout(),
        }
    }

    /// Local checks run before any network call. Returns the MIME type
    /// to send the asset with.
    pub fn check(&self, asset: &LocalAsset) -> Result<&'static str, CoreError> {
        if asset.len() > self.max_bytes {
            return Err(CoreError::Validation(format!(
                "asset is {} bytes, limit is {} bytes",
                asset.len(),
                self.max_bytes
            )));
        }

        match image::guess_format(&asset.bytes) {
            Ok(ImageFormat::Png) => Ok("image/png"),
            Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
            _ => Err(CoreError::Validation(
                "only JPEG and PNG images are accepted".into(),
            )),
        }
    }

    /// Upload `asset` and return the URL the backend stored it under.
    ///
    /// Failures are returned as-is; re-selecting an asset is up to the
    /// caller.
    pub async fn upload(&self, asset: LocalAsset) -> Outcome<String> {
        let mime = self.check(&asset)?;
        let size = asset.len();

        let part = FilePart {
            field: FILE_FIELD.to_string(),
            file_name: asset.file_name,
            mime: mime.to_string(),
            bytes: asset.bytes,
        };
        let request = ApiRequest::post_file(UPLOAD_PATH, part, self.timeout)?;

        let payload = self.transport.call(request).await?;
        let response: UploadResponse = decode(payload)?;

        let UploadResponse { image_url, message } = response;
        let url = image_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| TransportError::MalformedBody("upload response has no image_url".into()))?;

        tracing::info!(
            size,
            image_url = %url,
            backend_message = message.as_deref().unwrap_or_default(),
            "Asset uploaded",
        );
        Ok(url)
    }
}
