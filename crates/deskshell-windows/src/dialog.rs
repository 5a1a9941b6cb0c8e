//! Native folder prompt through PowerShell's `FolderBrowserDialog`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use deskshell_platform::dialog::FolderPicker;
use tokio::process::Command;
use tracing::info;

pub struct DialogFolderPicker;

impl DialogFolderPicker {
    pub fn new() -> Self {
        Self
    }

    fn script(default_path: Option<&Path>) -> String {
        let selected = default_path
            .map(|p| {
                format!(
                    "$d.SelectedPath = '{}';",
                    p.to_string_lossy().replace('\'', "''")
                )
            })
            .unwrap_or_default();
        format!(
            "Add-Type -AssemblyName System.Windows.Forms;\
             $d = New-Object System.Windows.Forms.FolderBrowserDialog;\
             $d.Description = 'Open Folder';{}\
             if ($d.ShowDialog() -eq [System.Windows.Forms.DialogResult]::OK) \
             {{ [Console]::Out.Write($d.SelectedPath) }}",
            selected
        )
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
        let output = Command::new("powershell.exe")
            .args(["-NoProfile", "-STA", "-NonInteractive", "-Command"])
            .arg(Self::script(default_path))
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to launch powershell")?;

        if !output.status.success() {
            bail!(
                "folder dialog failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let chosen = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if chosen.is_empty() {
            info!("folder prompt cancelled");
            return Ok(None);
        }
        info!("folder chosen: {}", chosen);
        Ok(Some(PathBuf::from(chosen)))
    }
}
