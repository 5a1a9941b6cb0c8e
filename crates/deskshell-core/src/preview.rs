//! File previews: plain text, base64 media, or text pulled out of Word documents.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::docx;
use crate::error::BridgeError;

/// Largest binary or document file we are willing to load (50 MiB)
pub const MAX_PREVIEW_BYTES: u64 = 50 * 1024 * 1024;

const DOCUMENT_EXTENSIONS: &[&str] = &["docx", "doc"];

/// Fixed MIME type for every extension previewed as raw bytes
pub fn binary_mime_type(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "tiff" | "tif" => "image/tiff",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "mov" => "video/quicktime",
        "m4v" => "video/x-m4v",
        _ => return None,
    };
    Some(mime)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilePreview {
    Text {
        content: String,
    },
    Binary {
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// base64 of the file's bytes
        data: String,
    },
}

/// Which branch a file goes down, decided from its extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewMode {
    Document,
    Binary(&'static str),
    Text,
}

fn preview_mode(path: &Path) -> PreviewMode {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        PreviewMode::Document
    } else if let Some(mime) = binary_mime_type(&ext) {
        PreviewMode::Binary(mime)
    } else {
        PreviewMode::Text
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PreviewLoader {
    max_bytes: u64,
}

impl Default for PreviewLoader {
    fn default() -> Self {
        Self {
            max_bytes: MAX_PREVIEW_BYTES,
        }
    }
}

impl PreviewLoader {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Build the preview for `path`.
    ///
    /// Documents and media are size-checked before any bytes are read. Plain text is
    /// read whole with no cap.
    pub async fn load(&self, path: &Path) -> Result<FilePreview, BridgeError> {
        let mode = preview_mode(path);
        debug!("preview {} as {:?}", path.display(), mode);

        match mode {
            PreviewMode::Document => {
                let bytes = self.read_capped(path).await?;
                let content = tokio::task::spawn_blocking(move || docx::extract_text(&bytes))
                    .await
                    .map_err(|e| BridgeError::ReadError(format!("extraction task failed: {}", e)))??;
                Ok(FilePreview::Text { content })
            }
            PreviewMode::Binary(mime) => {
                let bytes = self.read_capped(path).await?;
                let data = tokio::task::spawn_blocking(move || STANDARD.encode(&bytes))
                    .await
                    .map_err(|e| BridgeError::ReadError(format!("encoding task failed: {}", e)))?;
                Ok(FilePreview::Binary {
                    mime_type: mime.to_string(),
                    data,
                })
            }
            PreviewMode::Text => {
                let bytes = fs::read(path).await.map_err(|e| read_error(path, &e))?;
                let content = match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                };
                Ok(FilePreview::Text { content })
            }
        }
    }

    async fn read_capped(&self, path: &Path) -> Result<Vec<u8>, BridgeError> {
        let meta = fs::metadata(path).await.map_err(|e| read_error(path, &e))?;
        if meta.len() > self.max_bytes {
            return Err(BridgeError::FileTooLarge {
                size: meta.len(),
                limit: self.max_bytes,
            });
        }
        fs::read(path).await.map_err(|e| read_error(path, &e))
    }
}

fn read_error(path: &Path, err: &std::io::Error) -> BridgeError {
    BridgeError::ReadError(format!("failed to read {}: {}", path.display(), err))
}
