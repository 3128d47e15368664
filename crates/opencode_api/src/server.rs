//! Shared sidecar server process, one per application.
//!
//! Tabs each own an independent conversation session, but they all talk to
//! this single server. Start/stop are serialized under one async lock and are
//! idempotent; an externally started server is attached to instead of spawned.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::client::OpencodeClient;
use crate::config::OpencodeConfig;
use crate::error::OpencodeApiError;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct ServerState {
    /// `None` while attached to an externally started server.
    child: Option<Child>,
    running: bool,
}

/// Manages the shared OpenCode server lifecycle.
#[derive(Debug)]
pub struct SidecarServer {
    client: OpencodeClient,
    state: Mutex<ServerState>,
}

impl SidecarServer {
    pub fn new(config: OpencodeConfig) -> Result<Self, OpencodeApiError> {
        Ok(Self {
            client: OpencodeClient::new(config)?,
            state: Mutex::new(ServerState::default()),
        })
    }

    pub fn config(&self) -> &OpencodeConfig {
        self.client.config()
    }

    /// Whether the server can be used at all: either one is already
    /// reachable, or the serve command exists on this machine.
    pub async fn is_available(&self) -> bool {
        if self.client.health().await {
            log::info!("OpenCode server is already running");
            return true;
        }
        self.check_command_installed().await
    }

    /// Brings the server up. Returns true when it is reachable, whether we
    /// spawned it, attached to an external instance, or it was already up.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;

        if state.running && child_alive(&mut state.child) {
            log::debug!("server already running");
            return true;
        }
        state.running = false;

        if self.client.health().await {
            log::info!(
                "attached to existing OpenCode server at {}",
                self.config().server_url()
            );
            state.child = None;
            state.running = true;
            return true;
        }

        log::info!("starting OpenCode server...");
        let config = self.config();
        let spawned = Command::new(&config.command)
            .arg("serve")
            .arg("--port")
            .arg(config.port.to_string())
            .arg("--hostname")
            .arg(&config.hostname)
            .args(&config.extra_args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                log::error!("failed to spawn server: {error}");
                return false;
            }
        };

        if !self.wait_until_healthy(&mut child).await {
            log::error!("server failed to become ready");
            stop_child(&mut Some(child)).await;
            return false;
        }

        state.child = Some(child);
        state.running = true;
        log::info!(
            "OpenCode server started successfully at {}",
            self.config().server_url()
        );
        true
    }

    /// Stops a server we spawned. Attached external servers are left alone.
    /// Safe to call repeatedly.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.running = false;
        stop_child(&mut state.child).await;
    }

    pub async fn is_running(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.running {
            return false;
        }
        if !child_alive(&mut state.child) {
            log::warn!("server process terminated unexpectedly");
            state.running = false;
            return false;
        }
        true
    }

    /// Health probe against a server believed to be running.
    pub async fn health_check(&self) -> bool {
        if !self.is_running().await {
            return false;
        }
        self.client.health().await
    }

    async fn wait_until_healthy(&self, child: &mut Child) -> bool {
        let deadline = tokio::time::Instant::now() + self.config().startup_timeout;
        let mut attempt = 0u32;
        while tokio::time::Instant::now() < deadline {
            attempt += 1;
            log::debug!("health check attempt {attempt}...");
            if self.client.health().await {
                return true;
            }
            if matches!(child.try_wait(), Ok(Some(_))) {
                log::error!("server process exited during startup");
                return false;
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
        log::error!(
            "server failed to start within {}s timeout",
            self.config().startup_timeout.as_secs()
        );
        false
    }

    async fn check_command_installed(&self) -> bool {
        let probe = Command::new(&self.config().command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, probe).await {
            Ok(Ok(status)) if status.success() => {
                log::debug!("'{}' is installed", self.config().command);
                true
            }
            Ok(Ok(status)) => {
                log::warn!("'{}' version check exited with {status}", self.config().command);
                false
            }
            Ok(Err(error)) => {
                log::warn!("'{}' not found: {error}", self.config().command);
                false
            }
            Err(_) => {
                log::warn!("'{}' version check timed out", self.config().command);
                false
            }
        }
    }
}

fn child_alive(child: &mut Option<Child>) -> bool {
    match child {
        // Attached to an external server; nothing to poll.
        None => true,
        Some(child) => matches!(child.try_wait(), Ok(None)),
    }
}

async fn stop_child(child: &mut Option<Child>) {
    if let Some(mut process) = child.take() {
        if let Err(error) = process.start_kill() {
            log::debug!("server process already gone: {error}");
        }
        let _ = process.wait().await;
    }
}
