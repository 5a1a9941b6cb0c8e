use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use deskshell_platform::shell::Shell;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::resolve::HOME_PLACEHOLDER;

/// Runs one shell command to completion and hands back its stdout.
///
/// The command string goes to the shell untouched: this is a terminal, the operator
/// trusts what they type.
pub struct CommandExecutor {
    shell: Arc<dyn Shell>,
    home: PathBuf,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(shell: Arc<dyn Shell>, home: PathBuf) -> Self {
        Self {
            shell,
            home,
            timeout: None,
        }
    }

    /// Kill commands that run longer than `limit`. Off unless configured.
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub async fn run(&self, command: &str, cwd: &str) -> Result<String, BridgeError> {
        let workdir = if cwd == HOME_PLACEHOLDER {
            self.home.clone()
        } else {
            PathBuf::from(cwd)
        };

        info!("run command in {}: {}", workdir.display(), command);

        let mut cmd = tokio::process::Command::from(self.shell.command(command));
        cmd.current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BridgeError::CommandFailed {
            message: format!("spawn {} in {}: {}", self.shell.name(), workdir.display(), e),
        })?;
        let pid = child.id();

        // Drain both pipes on their own tasks so the wait below can give up without
        // dropping the child
        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let waited = match self.timeout {
            None => Some(child.wait().await),
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        };

        let Some(status) = waited else {
            // The shell is still alive here, so the whole tree under it can be found
            if let Some(pid) = pid {
                if let Err(e) = self.shell.terminate(pid) {
                    warn!("failed to stop timed out command: {:#}", e);
                }
            }
            if let Err(e) = child.kill().await {
                debug!("shell already gone after terminate: {}", e);
            }
            let limit = self.timeout.unwrap_or_default();
            return Err(BridgeError::CommandFailed {
                message: format!("Command timed out after {:?}: {}", limit, command),
            });
        };

        let status = status.map_err(|e| BridgeError::CommandFailed {
            message: format!("Command failed: {}: {}", command, e),
        })?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            debug!("command finished, {} bytes of output", stdout.len());
            return Ok(String::from_utf8_lossy(&stdout).into_owned());
        }

        debug!("command failed: {}", status);
        let stderr = String::from_utf8_lossy(&stderr);
        let message = if stderr.is_empty() {
            format!("Command failed: {}\n", command)
        } else {
            stderr.into_owned()
        };
        Err(BridgeError::CommandFailed { message })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!("failed to read command output: {}", e);
        }
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;

    struct TestShell;

    impl Shell for TestShell {
        fn command(&self, command: &str) -> std::process::Command {
            let mut cmd = std::process::Command::new("/bin/sh");
            cmd.arg("-c").arg(command).process_group(0);
            cmd
        }

        fn terminate(&self, _pid: u32) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "/bin/sh"
        }
    }

    fn executor(home: PathBuf) -> CommandExecutor {
        CommandExecutor::new(Arc::new(TestShell), home)
    }

    #[tokio::test]
    async fn test_echo() {
        let dir = tempfile::tempdir().unwrap();
        let out = executor(dir.path().to_path_buf())
            .run("echo hello", &dir.path().to_string_lossy())
            .await
            .unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn test_exit_status_without_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = executor(dir.path().to_path_buf())
            .run("exit 1", &dir.path().to_string_lossy())
            .await
            .unwrap_err();
        match err {
            BridgeError::CommandFailed { message } => {
                assert!(!message.is_empty());
                assert!(message.contains("exit 1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stderr_becomes_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let err = executor(dir.path().to_path_buf())
            .run("echo out; echo oops >&2; exit 3", &dir.path().to_string_lossy())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::CommandFailed {
                message: "oops\n".into()
            }
        );
    }

    #[tokio::test]
    async fn test_runs_in_cwd_and_home_placeholder() {
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("marker-work"), "").unwrap();
        std::fs::write(home.path().join("marker-home"), "").unwrap();
        let exec = executor(home.path().to_path_buf());

        let out = exec.run("ls", &work.path().to_string_lossy()).await.unwrap();
        assert!(out.contains("marker-work"));

        let out = exec.run("ls", "~").await.unwrap();
        assert!(out.contains("marker-home"));
    }

    #[tokio::test]
    async fn test_missing_cwd_fails_at_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = executor(dir.path().to_path_buf())
            .run("echo hi", &missing.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path().to_path_buf())
            .with_timeout(Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let err = exec
            .run("sleep 5", &dir.path().to_string_lossy())
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(err.to_string().contains("timed out"));
    }

    /// Notes whether the process was still running when asked to stop it
    #[cfg(target_os = "linux")]
    struct RecordingShell {
        alive_at_terminate: std::sync::Mutex<Vec<bool>>,
    }

    #[cfg(target_os = "linux")]
    impl Shell for RecordingShell {
        fn command(&self, command: &str) -> std::process::Command {
            TestShell.command(command)
        }

        fn terminate(&self, pid: u32) -> anyhow::Result<()> {
            // third field of /proc/<pid>/stat is the state; Z means already dead
            let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap_or_default();
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            let alive = matches!(state, Some(s) if s != 'Z');
            self.alive_at_terminate.lock().unwrap().push(alive);
            Ok(())
        }

        fn name(&self) -> &str {
            "/bin/sh"
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_terminates_before_the_shell_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(RecordingShell {
            alive_at_terminate: std::sync::Mutex::new(Vec::new()),
        });
        let exec = CommandExecutor::new(shell.clone(), dir.path().to_path_buf())
            .with_timeout(Some(Duration::from_millis(200)));

        let err = exec
            .run("sleep 5; echo done", &dir.path().to_string_lossy())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(*shell.alive_at_terminate.lock().unwrap(), vec![true]);
    }
}
