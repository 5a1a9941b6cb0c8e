//! Native folder prompt via the desktop's dialog helpers (zenity, then kdialog).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use deskshell_platform::dialog::FolderPicker;
use tokio::process::Command;
use tracing::{debug, info};

const DIALOG_TITLE: &str = "Open Folder";

/// Outcome of one helper invocation
enum Attempt {
    Chosen(PathBuf),
    Cancelled,
    Unavailable,
}

pub struct DialogFolderPicker {
    helpers: Vec<Helper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    Zenity,
    Kdialog,
}

impl DialogFolderPicker {
    pub fn new() -> Self {
        Self {
            helpers: vec![Helper::Zenity, Helper::Kdialog],
        }
    }

    fn build(helper: Helper, default_path: Option<&Path>) -> Command {
        match helper {
            Helper::Zenity => {
                let mut cmd = Command::new("zenity");
                cmd.arg("--file-selection")
                    .arg("--directory")
                    .arg(format!("--title={}", DIALOG_TITLE));
                if let Some(p) = default_path {
                    // zenity opens *inside* a directory only with a trailing separator
                    let mut start = p.to_string_lossy().to_string();
                    if !start.ends_with('/') {
                        start.push('/');
                    }
                    cmd.arg(format!("--filename={}", start));
                }
                cmd
            }
            Helper::Kdialog => {
                let mut cmd = Command::new("kdialog");
                cmd.arg("--title").arg(DIALOG_TITLE).arg("--getexistingdirectory");
                if let Some(p) = default_path {
                    cmd.arg(p);
                }
                cmd
            }
        }
    }

    async fn run(helper: Helper, default_path: Option<&Path>) -> Result<Attempt> {
        let mut cmd = Self::build(helper, default_path);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{:?} not installed", helper);
                return Ok(Attempt::Unavailable);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to launch {:?}", helper)),
        };

        // Both helpers exit 1 on cancel
        match output.status.code() {
            Some(0) => {
                let chosen = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
                if chosen.is_empty() {
                    Ok(Attempt::Cancelled)
                } else {
                    Ok(Attempt::Chosen(PathBuf::from(chosen)))
                }
            }
            Some(1) => Ok(Attempt::Cancelled),
            _ => bail!(
                "{:?} failed ({}): {}",
                helper,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }
}

impl Default for DialogFolderPicker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FolderPicker for DialogFolderPicker {
    async fn pick_folder(&self, default_path: Option<&Path>) -> Result<Option<PathBuf>> {
        for helper in &self.helpers {
            match Self::run(*helper, default_path).await? {
                Attempt::Chosen(path) => {
                    info!("folder chosen: {}", path.display());
                    return Ok(Some(path));
                }
                Attempt::Cancelled => {
                    info!("folder prompt cancelled");
                    return Ok(None);
                }
                Attempt::Unavailable => continue,
            }
        }
        bail!("no folder dialog available (install zenity or kdialog)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_zenity_start_dir_gets_trailing_slash() {
        let cmd = DialogFolderPicker::build(Helper::Zenity, Some(Path::new("/home/me/src")));
        assert!(args(&cmd).contains(&"--filename=/home/me/src/".to_string()));
        assert!(args(&cmd).contains(&"--directory".to_string()));
    }

    #[test]
    fn test_kdialog_without_default() {
        let cmd = DialogFolderPicker::build(Helper::Kdialog, None);
        assert_eq!(args(&cmd).last().map(String::as_str), Some("--getexistingdirectory"));
    }

    #[tokio::test]
    async fn test_no_helpers_is_an_error() {
        let picker = DialogFolderPicker { helpers: vec![] };
        assert!(picker.pick_folder(None).await.is_err());
    }
}
