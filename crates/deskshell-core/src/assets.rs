//! The `app://` scheme: serves the pre-built UI bundle and nothing outside it.

use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::BridgeError;

pub const SCHEME: &str = "app";
pub const INDEX_FILE: &str = "index.html";

const CSP_PRODUCTION: &str = "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data: blob:; media-src 'self' blob: data:; frame-src 'self' data: blob:; connect-src 'self'; font-src 'self'; base-uri 'self'";

// Dev server needs inline/eval scripts for hot reload and a socket back to localhost
const CSP_DEVELOPMENT: &str = "default-src 'self'; script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; img-src 'self' data: blob:; media-src 'self' blob: data:; frame-src 'self' data: blob:; connect-src 'self' ws: wss: http://localhost:* https://localhost:*; font-src 'self'; base-uri 'self'";

pub fn content_security_policy(dev: bool) -> &'static str {
    if dev {
        CSP_DEVELOPMENT
    } else {
        CSP_PRODUCTION
    }
}

pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// One served file, ready for the UI's scheme handler
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub content_type: String,
    pub csp: String,
    /// base64 of the file's bytes
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct AssetBundle {
    root: PathBuf,
    dev: bool,
}

impl AssetBundle {
    pub fn new(root: impl Into<PathBuf>, dev: bool) -> Self {
        Self {
            root: root.into(),
            dev,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a built bundle is present at all
    pub fn has_index(&self) -> bool {
        self.root.join(INDEX_FILE).is_file()
    }

    /// URL the window starts on when loading from the bundle
    pub fn start_url() -> String {
        format!("{}://bundle/{}", SCHEME, INDEX_FILE)
    }

    /// Map a request path (`/assets/app.js`, `app://bundle/x.css?v=1`) onto a file inside
    /// the bundle. Never leaves the bundle root, lexically or through symlinks.
    pub async fn locate(&self, request: &str) -> Result<PathBuf, BridgeError> {
        let relative = request_to_relative(request)?;
        let mut candidate = self.root.join(&relative);

        if fs::metadata(&candidate).await.map(|m| m.is_dir()).unwrap_or(false) {
            candidate.push(INDEX_FILE);
        }

        let canonical_root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| BridgeError::from_io(&e, &self.root.to_string_lossy()))?;
        let canonical = fs::canonicalize(&candidate)
            .await
            .map_err(|_| BridgeError::NotFound(request.to_string()))?;

        if !canonical.starts_with(&canonical_root) {
            warn!("asset {} escapes the bundle via {}", request, canonical.display());
            return Err(BridgeError::Forbidden(request.to_string()));
        }
        Ok(canonical)
    }

    pub async fn load(&self, request: &str) -> Result<Asset, BridgeError> {
        let path = self.locate(request).await?;
        let bytes = fs::read(&path)
            .await
            .map_err(|e| BridgeError::ReadError(format!("failed to read asset {}: {}", request, e)))?;
        debug!("serving asset {} ({} bytes)", path.display(), bytes.len());

        Ok(Asset {
            content_type: content_type(&path).to_string(),
            csp: content_security_policy(self.dev).to_string(),
            data: STANDARD.encode(&bytes),
        })
    }
}

/// Strip scheme/host/query, percent-decode, and refuse anything but plain names
fn request_to_relative(request: &str) -> Result<PathBuf, BridgeError> {
    let mut rest = request;
    let scheme_prefix = format!("{}://", SCHEME);
    if let Some(after) = rest.strip_prefix(scheme_prefix.as_str()) {
        // drop the host part
        rest = after.find('/').map(|i| &after[i..]).unwrap_or("");
    }
    let rest = rest.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode(rest)?;

    let mut relative = PathBuf::new();
    for part in decoded.split(['/', '\\']) {
        if part.is_empty() {
            continue;
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => relative.push(name),
            (Some(Component::CurDir), None) => {}
            _ => return Err(BridgeError::Forbidden(request.to_string())),
        }
    }
    Ok(relative)
}

fn percent_decode(input: &str) -> Result<String, BridgeError> {
    percent_encoding::percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| BridgeError::BadRequest(format!("non-UTF-8 path {}", input)))
}
