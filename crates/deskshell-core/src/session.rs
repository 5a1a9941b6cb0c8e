//! Lifetime of one running shell: the bridge listener, its token, and the UI windows.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::assets::AssetBundle;
use crate::bridge::Bridge;
use crate::config::HostConfig;
use crate::connection::BridgeServer;
use crate::devserver::{self, DEV_POLL_INTERVAL};
use crate::dispatch::RequestHandler;

pub const ENV_BRIDGE_URL: &str = "DESKSHELL_BRIDGE_URL";
pub const ENV_TOKEN: &str = "DESKSHELL_TOKEN";
pub const ENV_START_URL: &str = "DESKSHELL_START_URL";
pub const ENV_WINDOW_WIDTH: &str = "DESKSHELL_WINDOW_WIDTH";
pub const ENV_WINDOW_HEIGHT: &str = "DESKSHELL_WINDOW_HEIGHT";

pub struct AppSession {
    token: String,
    bridge_url: String,
    start_url: String,
    dev: bool,
    server_task: JoinHandle<()>,
    windows: Vec<Child>,
}

impl AppSession {
    /// Bind the bridge and work out what the window should load. In dev mode (or with no
    /// built bundle) this waits for the dev server to answer first.
    pub async fn start(config: &HostConfig, bridge: Arc<Bridge>) -> Result<Self> {
        let bundle_dir = config.bundle_dir();
        let mut dev = config.is_dev();
        if !dev && !AssetBundle::new(&bundle_dir, false).has_index() {
            warn!(
                "no UI bundle at {}, falling back to the dev server",
                bundle_dir.display()
            );
            dev = true;
        }

        let token = uuid::Uuid::new_v4().to_string();
        let assets = AssetBundle::new(bundle_dir, dev);
        let handler = Arc::new(RequestHandler::new(bridge, assets));
        let server = BridgeServer::bind(
            &config.listen_addr,
            token.clone(),
            handler,
            config.heartbeat_interval(),
        )
        .await?;
        let bridge_url = server.url()?;
        info!("bridge listening on {}", bridge_url);

        let server_task = tokio::spawn(server.run());

        let start_url = if dev {
            devserver::wait_for_dev_server(&config.dev_url, DEV_POLL_INTERVAL).await;
            config.dev_url.clone()
        } else {
            AssetBundle::start_url()
        };

        Ok(Self {
            token,
            bridge_url,
            start_url,
            dev,
            server_task,
            windows: Vec::new(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Launch one UI window process pointed at this session
    pub fn open_window(&mut self, config: &HostConfig) -> Result<()> {
        let Some((program, args)) = config.ui_command.split_first() else {
            bail!("no ui_command configured");
        };

        let child = Command::new(program)
            .args(args)
            .env(ENV_BRIDGE_URL, &self.bridge_url)
            .env(ENV_TOKEN, &self.token)
            .env(ENV_START_URL, &self.start_url)
            .env(ENV_WINDOW_WIDTH, config.window_width.to_string())
            .env(ENV_WINDOW_HEIGHT, config.window_height.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch UI window {}", program))?;

        info!(
            "opened window (pid {}) on {}",
            child.id().unwrap_or_default(),
            self.start_url
        );
        self.windows.push(child);
        Ok(())
    }

    /// Resolves once every launched window has exited. Never resolves when headless.
    pub async fn wait_all_closed(&mut self) -> Result<()> {
        if self.windows.is_empty() {
            std::future::pending::<()>().await;
        }
        for child in &mut self.windows {
            let status = child.wait().await.context("failed to wait for UI window")?;
            info!("window closed ({})", status);
        }
        self.windows.clear();
        Ok(())
    }

    /// Close remaining windows and stop accepting connections
    pub async fn shutdown(mut self) {
        for child in &mut self.windows {
            if let Err(e) = child.kill().await {
                warn!("failed to close window: {}", e);
            }
        }
        self.server_task.abort();
        info!("session closed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::tests::{bridge, FakePicker};
    use std::path::Path;
    use tokio::time::{timeout, Duration};

    fn config_with_bundle(dir: &Path) -> HostConfig {
        let out = dir.join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("index.html"), "<html></html>").unwrap();
        HostConfig {
            bundle_dir: Some(out),
            ..HostConfig::default()
        }
    }

    #[tokio::test]
    async fn test_window_gets_connection_env() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("env.txt");
        let mut config = config_with_bundle(dir.path());
        config.ui_command = vec![
            "sh".into(),
            "-c".into(),
            format!(
                "echo \"$DESKSHELL_BRIDGE_URL $DESKSHELL_TOKEN $DESKSHELL_START_URL $DESKSHELL_WINDOW_WIDTH\" > {}",
                dump.display()
            ),
        ];

        let b = Arc::new(bridge(dir.path(), FakePicker::answering(None)));
        let mut session = AppSession::start(&config, b).await.unwrap();
        assert!(!session.is_dev());
        assert_eq!(session.start_url(), "app://bundle/index.html");

        session.open_window(&config).unwrap();
        assert_eq!(session.window_count(), 1);
        timeout(Duration::from_secs(10), session.wait_all_closed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.window_count(), 0);

        let seen = std::fs::read_to_string(&dump).unwrap();
        let parts: Vec<&str> = seen.split_whitespace().collect();
        assert_eq!(parts[0], session.bridge_url());
        assert!(parts[0].starts_with("ws://127.0.0.1:"));
        assert_eq!(parts[1], session.token());
        assert_eq!(parts[2], "app://bundle/index.html");
        assert_eq!(parts[3], "1400");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_tokens_differ_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_bundle(dir.path());
        let b = Arc::new(bridge(dir.path(), FakePicker::answering(None)));
        let one = AppSession::start(&config, b.clone()).await.unwrap();
        let two = AppSession::start(&config, b).await.unwrap();
        assert_ne!(one.token(), two.token());
        assert_ne!(one.bridge_url(), two.bridge_url());
    }

    #[tokio::test]
    async fn test_headless_never_closes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_bundle(dir.path());
        let b = Arc::new(bridge(dir.path(), FakePicker::answering(None)));
        let mut session = AppSession::start(&config, b).await.unwrap();

        assert!(session.open_window(&config).is_err());
        assert!(timeout(Duration::from_millis(100), session.wait_all_closed())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_ui_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_bundle(dir.path());
        config.ui_command = vec!["/nonexistent/deskshell-window".into()];
        let b = Arc::new(bridge(dir.path(), FakePicker::answering(None)));
        let mut session = AppSession::start(&config, b).await.unwrap();
        assert!(session.open_window(&config).is_err());
    }
}
