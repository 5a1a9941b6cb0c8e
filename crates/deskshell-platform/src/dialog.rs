use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait FolderPicker: Send + Sync {
    /// Show a native "choose folder" prompt, starting at `default_path` when given.
    ///
    /// Returns `Ok(None)` when the user dismisses the prompt.
    async fn pick_folder(&self, default_path: Option<&Path>) -> Result<Option<PathBuf>>;
}
