use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use deskshell_platform::shell::Shell;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Runs commands through a POSIX `sh -c`, each in its own process group so a
/// stuck pipeline can be torn down as a whole.
pub struct PosixShell {
    path: String,
}

impl PosixShell {
    pub fn new() -> Self {
        Self {
            path: Self::detect_shell(),
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn detect_shell() -> String {
        for path in &["/bin/sh", "/usr/bin/sh"] {
            if Path::new(path).exists() {
                return path.to_string();
            }
        }
        "sh".to_string()
    }
}

impl Default for PosixShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for PosixShell {
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-c").arg(command);
        cmd.process_group(0);
        cmd
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let pgid = i32::try_from(pid).context("pid out of range")?;
        if pgid <= 1 {
            anyhow::bail!("refusing to signal process group {}", pgid);
        }
        debug!("killing process group {}", pgid);
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("failed to kill process group {}: {}", pgid, e)),
        }
    }

    fn name(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_passes_string_verbatim() {
        let shell = PosixShell::with_path("/bin/sh");
        let cmd = shell.command("echo 'a b' | wc -c");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(cmd.get_program(), "/bin/sh");
        assert_eq!(args, vec!["-c".to_string(), "echo 'a b' | wc -c".to_string()]);
    }

    #[test]
    fn test_terminate_missing_group_is_ok() {
        let shell = PosixShell::new();
        // pid 0x3ffffff0 is far above any default pid_max
        assert!(shell.terminate(0x3fff_fff0).is_ok());
    }
}
