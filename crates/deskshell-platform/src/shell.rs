use anyhow::Result;

pub trait Shell: Send + Sync {
    /// Build the process that hands `command` to the host shell verbatim
    fn command(&self, command: &str) -> std::process::Command;

    /// Forcefully stop a command spawned from [`Shell::command`], including
    /// anything it started
    fn terminate(&self, pid: u32) -> Result<()>;

    /// Human-readable shell path, for logs
    fn name(&self) -> &str;
}
