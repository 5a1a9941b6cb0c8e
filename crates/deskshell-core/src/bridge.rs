//! The privileged side of the UI boundary.
//!
//! [`Bridge`] keeps no per-session state: every operation takes plain values, touches the
//! filesystem or process table, and returns plain values. One instance is shared by all
//! connections.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use deskshell_platform::dialog::FolderPicker;
use deskshell_platform::shell::Shell;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::exec::CommandExecutor;
use crate::preview::{FilePreview, PreviewLoader};
use crate::resolve;
use crate::tree::{self, TreeNode};

/// A folder picked by the user together with its first level of entries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedFolder {
    pub folder_path: String,
    pub tree: Vec<TreeNode>,
}

pub struct Bridge {
    home: PathBuf,
    picker: Box<dyn FolderPicker>,
    executor: CommandExecutor,
    previews: PreviewLoader,
}

impl Bridge {
    pub fn new(home: PathBuf, picker: Box<dyn FolderPicker>, shell: Arc<dyn Shell>) -> Self {
        Self {
            executor: CommandExecutor::new(shell, home.clone()),
            home,
            picker,
            previews: PreviewLoader::default(),
        }
    }

    pub fn with_command_timeout(mut self, limit: Option<Duration>) -> Self {
        self.executor = self.executor.with_timeout(limit);
        self
    }

    pub fn with_preview_limit(mut self, max_bytes: u64) -> Self {
        self.previews = PreviewLoader::new(max_bytes);
        self
    }

    /// Ask the user for a folder and list it. `None` when the prompt was dismissed.
    pub async fn choose_folder(
        &self,
        default_path: Option<&str>,
    ) -> Result<Option<OpenedFolder>, BridgeError> {
        let start = default_path.filter(|p| !p.is_empty()).map(Path::new);
        let chosen = self
            .picker
            .pick_folder(start)
            .await
            .map_err(|e| BridgeError::Dialog(format!("{:#}", e)))?;

        let Some(folder) = chosen else {
            return Ok(None);
        };

        let tree = tree::list_children(&folder).await?;
        info!("opened folder {} ({} entries)", folder.display(), tree.len());
        Ok(Some(OpenedFolder {
            folder_path: folder.to_string_lossy().to_string(),
            tree,
        }))
    }

    /// Children of a folder node the UI is expanding
    pub async fn list_children(&self, dir: &str) -> Result<Vec<TreeNode>, BridgeError> {
        let dir = absolute_path(dir)?;
        tree::list_children(dir).await
    }

    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    /// `cd` target for the terminal
    pub async fn resolve_path(&self, cwd: &str, segment: &str) -> Result<PathBuf, BridgeError> {
        check_text("cwd", cwd)?;
        check_text("segment", segment)?;
        resolve::resolve(cwd, segment, &self.home).await
    }

    pub async fn run_command(&self, command: &str, cwd: &str) -> Result<String, BridgeError> {
        check_text("command", command)?;
        check_text("cwd", cwd)?;
        self.executor.run(command, cwd).await
    }

    pub async fn read_file(&self, path: &str) -> Result<FilePreview, BridgeError> {
        let path = absolute_path(path)?;
        let result = self.previews.load(path).await;
        if let Err(e) = &result {
            warn!("preview of {} failed: {}", path.display(), e);
        }
        result
    }
}

/// Paths from the UI must be absolute; relative ones would silently depend on the host's
/// own working directory.
fn absolute_path(raw: &str) -> Result<&Path, BridgeError> {
    check_text("path", raw)?;
    let path = Path::new(raw);
    if raw.is_empty() || !path.is_absolute() {
        return Err(BridgeError::BadRequest(format!(
            "expected an absolute path, got {:?}",
            raw
        )));
    }
    Ok(path)
}

fn check_text(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.contains('\0') {
        return Err(BridgeError::BadRequest(format!("{} contains a NUL byte", field)));
    }
    Ok(())
}
