use std::os::windows::process::CommandExt;
use std::process::Command;

use anyhow::{bail, Result};
use deskshell_platform::shell::Shell;
use tracing::debug;

/// Don't flash a console window for every command
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Runs commands through `cmd.exe /C`
pub struct CmdShell {
    path: String,
}

impl CmdShell {
    pub fn new() -> Self {
        Self {
            path: Self::detect_shell(),
        }
    }

    fn detect_shell() -> String {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
}

impl Default for CmdShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for CmdShell {
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.arg("/C").raw_arg(command);
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        debug!("killing process tree {}", pid);
        // taskkill /T takes the children cmd.exe spawned along with it
        let status = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .creation_flags(CREATE_NO_WINDOW)
            .status()?;
        // 128: process already gone
        if !status.success() && status.code() != Some(128) {
            bail!("taskkill failed for pid {}: {}", pid, status);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.path
    }
}
