use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use deskshell_core::bridge::Bridge;
use deskshell_core::config::HostConfig;
use deskshell_core::error::BridgeError;
use deskshell_core::protocol::Reply;
use deskshell_core::resolve;
use deskshell_core::session::AppSession;
use deskshell_platform::dialog::FolderPicker;
use deskshell_platform::shell::Shell;

#[derive(Parser, Debug)]
#[command(name = "deskshell")]
#[command(about = "Desktop file explorer and terminal host")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "DESKSHELL_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DESKSHELL_LOG_LEVEL", global = true)]
    log_level: String,

    /// Bridge listen address (loopback only), e.g. 127.0.0.1:7420
    #[arg(long)]
    listen: Option<String>,

    /// Load the UI from the dev server instead of the bundle
    #[arg(long)]
    dev: bool,

    /// Command line that opens a UI window, e.g. "deskshell-webview --kiosk"
    #[arg(long)]
    ui_command: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the entries of a folder
    Ls { dir: String },
    /// Resolve a cd target
    Cd { cwd: String, segment: String },
    /// Load a file preview
    Read { file: String },
    /// Run a shell command and print its stdout
    Exec {
        cwd: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Print the home directory
    Home,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config_path
        .map(PathBuf::from)
        .unwrap_or_else(HostConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        HostConfig::load(&config_path)?
    } else {
        HostConfig::default()
    };

    // CLI args override config file
    if let Some(addr) = cli.listen {
        config.listen_addr = addr;
    }
    if cli.dev {
        config.dev = true;
    }
    if let Some(line) = cli.ui_command {
        config.ui_command = line.split_whitespace().map(str::to_string).collect();
    }

    let bridge = build_bridge(&config)?;

    match cli.command {
        Some(command) => run_oneshot(&bridge, command).await,
        None => {
            info!(
                "deskshell v{} starting (os={}, arch={})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH,
            );
            run_host(config, Arc::new(bridge)).await
        }
    }
}

async fn run_host(config: HostConfig, bridge: Arc<Bridge>) -> Result<()> {
    let mut session = tokio::select! {
        session = AppSession::start(&config, bridge) => session?,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C before the UI was ready");
            return Ok(());
        }
    };

    if config.ui_command.is_empty() {
        info!("no ui_command configured, running headless");
        let info = serde_json::json!({
            "bridgeUrl": session.bridge_url(),
            "token": session.token(),
            "startUrl": session.start_url(),
        });
        println!("{}", info);
    } else {
        session.open_window(&config)?;
    }

    info!("host running, press Ctrl+C to stop");

    tokio::select! {
        closed = session.wait_all_closed() => {
            closed?;
            info!("all windows closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Run one bridge operation and print its reply envelope
async fn run_oneshot(bridge: &Bridge, command: Commands) -> Result<()> {
    let reply = match command {
        Commands::Ls { dir } => envelope(bridge.list_children(&dir).await)?,
        Commands::Cd { cwd, segment } => envelope(
            bridge
                .resolve_path(&cwd, &segment)
                .await
                .map(|p| p.to_string_lossy().to_string()),
        )?,
        Commands::Read { file } => envelope(bridge.read_file(&file).await)?,
        Commands::Exec { cwd, command } => {
            envelope(bridge.run_command(&command.join(" "), &cwd).await)?
        }
        Commands::Home => envelope(Ok(bridge.home_dir().to_string_lossy().to_string()))?,
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);
    if !reply.ok {
        std::process::exit(1);
    }
    Ok(())
}

fn envelope<T: Serialize>(result: Result<T, BridgeError>) -> Result<Reply> {
    match result {
        Ok(value) => Ok(Reply::ok(&value)?),
        Err(e) => Ok(Reply::err(&e)),
    }
}

fn build_bridge(config: &HostConfig) -> Result<Bridge> {
    let home = resolve::home_dir().context("failed to locate home directory")?;
    let bridge = Bridge::new(home, create_platform_picker()?, create_platform_shell()?)
        .with_command_timeout(config.command_timeout())
        .with_preview_limit(config.max_preview_bytes);
    Ok(bridge)
}

#[cfg(unix)]
fn create_platform_picker() -> Result<Box<dyn FolderPicker>> {
    Ok(Box::new(deskshell_linux::dialog::DialogFolderPicker::new()))
}

#[cfg(target_os = "windows")]
fn create_platform_picker() -> Result<Box<dyn FolderPicker>> {
    Ok(Box::new(deskshell_windows::dialog::DialogFolderPicker::new()))
}

#[cfg(not(any(unix, target_os = "windows")))]
fn create_platform_picker() -> Result<Box<dyn FolderPicker>> {
    anyhow::bail!("folder picker not supported on this platform")
}

#[cfg(unix)]
fn create_platform_shell() -> Result<Arc<dyn Shell>> {
    Ok(Arc::new(deskshell_linux::shell::PosixShell::new()))
}

#[cfg(target_os = "windows")]
fn create_platform_shell() -> Result<Arc<dyn Shell>> {
    Ok(Arc::new(deskshell_windows::shell::CmdShell::new()))
}

#[cfg(not(any(unix, target_os = "windows")))]
fn create_platform_shell() -> Result<Arc<dyn Shell>> {
    anyhow::bail!("shell not supported on this platform")
}
