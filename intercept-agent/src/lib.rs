//! Interception Agent
//!
//! Standalone executable that drives a Chromium browser over the DevTools
//! protocol and exposes the response interception controller over HTTP.

use chromiumoxide::{Browser, BrowserConfig};
use clap::Parser;
use futures::StreamExt;
use intercept_core::{actor, CaptureConfig, ControllerHandle, InterceptConfig, InterceptController, RequestLog};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod cdp;
pub mod editor_queue;
pub mod error;
pub mod logging;
pub mod replay;
pub mod server;

#[cfg(test)]
mod config_test;

pub use error::{AgentError, AgentResult};
pub use logging::{init_logging, LoggingConfig};

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address the message boundary listens on
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Port the message boundary listens on
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// DevTools websocket URL of a running browser; a browser is launched when absent
    #[arg(long)]
    pub browser_ws: Option<String>,

    /// Show the launched browser window
    #[arg(long)]
    pub headed: Option<bool>,

    /// Tabs that may intercept at the same time
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Paused responses allowed per tab session
    #[arg(long)]
    pub max_interceptions: Option<u32>,

    /// Largest edited body accepted, in bytes
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Recompress edited bodies with their original encoding
    #[arg(long)]
    pub recompress_bodies: Option<bool>,

    /// Keep a passive log of completed requests
    #[arg(long)]
    pub capture: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    pub log_json: Option<bool>,

    /// Also write logs to this file, rotated daily
    #[arg(long)]
    pub log_file: Option<String>,
}

/// Browser connection and HTTP boundary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub listen_port: u16,
    pub browser_ws_url: Option<String>,
    pub headless: bool,
    pub replay_timeout_secs: u64,
    /// Editors that may wait for a surface at the same time
    pub max_open_editors: usize,
    /// Interval of orphan purging and request log cleanup
    pub maintenance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9230,
            browser_ws_url: None,
            headless: true,
            replay_timeout_secs: 30,
            max_open_editors: 50,
            maintenance_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub intercept: InterceptConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), String> {
        let intercept = &self.intercept;
        if intercept.max_sessions == 0 {
            return Err("intercept.max_sessions must be greater than 0".to_string());
        }
        if intercept.max_patterns == 0 || intercept.max_pattern_length == 0 {
            return Err("intercept pattern limits must be greater than 0".to_string());
        }
        if intercept.max_interceptions == 0 {
            return Err("intercept.max_interceptions must be greater than 0".to_string());
        }
        if intercept.max_body_size == 0 {
            return Err("intercept.max_body_size must be greater than 0".to_string());
        }
        if intercept.channel_capacity == 0 {
            return Err("intercept.channel_capacity must be greater than 0".to_string());
        }
        if self.capture.enabled && (self.capture.max_requests_in_memory == 0 || self.capture.batch_cleanup_size == 0) {
            return Err("capture limits must be greater than 0".to_string());
        }
        if self.server.replay_timeout_secs == 0 || self.server.maintenance_interval_secs == 0 {
            return Err("server intervals must be greater than 0".to_string());
        }
        if self.server.max_open_editors == 0 {
            return Err("server.max_open_editors must be greater than 0".to_string());
        }
        self.logging.validate()
    }

    pub fn listen_socket(&self) -> AgentResult<SocketAddr> {
        let raw = format!("{}:{}", self.server.listen_addr, self.server.listen_port);
        raw.parse()
            .map_err(|e| AgentError::Config(format!("Invalid listen address {}: {}", raw, e)))
    }
}

/// Load configuration from defaults, then the JSON file, then `INTERCEPT_*`
/// environment variables, then command line flags. Later sources win.
pub fn load_agent_config(args: &Args) -> AgentResult<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                AgentError::Config(format!("Failed to read config file {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                AgentError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            })?
        }
        None => AgentConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    apply_cli_overrides(&mut config, args);

    config
        .validate()
        .map_err(|e| AgentError::Config(format!("Configuration validation failed: {}", e)))?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AgentConfig) -> AgentResult<()> {
    if let Some(value) = env_override::<String>("INTERCEPT_LISTEN_ADDR")? {
        config.server.listen_addr = value;
    }
    if let Some(value) = env_override("INTERCEPT_LISTEN_PORT")? {
        config.server.listen_port = value;
    }
    if let Some(value) = env_override::<String>("INTERCEPT_BROWSER_WS")? {
        config.server.browser_ws_url = Some(value);
    }
    if let Some(value) = env_override("INTERCEPT_MAX_SESSIONS")? {
        config.intercept.max_sessions = value;
    }
    if let Some(value) = env_override("INTERCEPT_MAX_INTERCEPTIONS")? {
        config.intercept.max_interceptions = value;
    }
    if let Some(value) = env_override("INTERCEPT_MAX_BODY_SIZE")? {
        config.intercept.max_body_size = value;
    }
    if let Some(value) = env_override("INTERCEPT_RECOMPRESS_BODIES")? {
        config.intercept.recompress_bodies = value;
    }
    if let Some(value) = env_override("INTERCEPT_CAPTURE_ENABLED")? {
        config.capture.enabled = value;
    }
    if let Some(value) = env_override::<String>("INTERCEPT_LOG_LEVEL")? {
        config.logging.level = value;
    }
    if let Some(value) = env_override("INTERCEPT_LOG_JSON")? {
        config.logging.json_format = value;
    }
    if let Some(value) = env_override::<String>("INTERCEPT_LOG_FILE")? {
        config.logging.log_file = Some(value);
    }
    Ok(())
}

fn env_override<T>(name: &str) -> AgentResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AgentError::Config(format!("Invalid {} value '{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

fn apply_cli_overrides(config: &mut AgentConfig, args: &Args) {
    if let Some(value) = &args.listen_addr {
        config.server.listen_addr = value.clone();
    }
    if let Some(value) = args.listen_port {
        config.server.listen_port = value;
    }
    if let Some(value) = &args.browser_ws {
        config.server.browser_ws_url = Some(value.clone());
    }
    if let Some(headed) = args.headed {
        config.server.headless = !headed;
    }
    if let Some(value) = args.max_sessions {
        config.intercept.max_sessions = value;
    }
    if let Some(value) = args.max_interceptions {
        config.intercept.max_interceptions = value;
    }
    if let Some(value) = args.max_body_size {
        config.intercept.max_body_size = value;
    }
    if let Some(value) = args.recompress_bodies {
        config.intercept.recompress_bodies = value;
    }
    if let Some(value) = args.capture {
        config.capture.enabled = value;
    }
    if let Some(value) = &args.log_level {
        config.logging.level = value.clone();
    }
    if let Some(value) = args.log_json {
        config.logging.json_format = value;
    }
    if let Some(value) = &args.log_file {
        config.logging.log_file = Some(value.clone());
    }
}

/// A running agent: browser, controller task and background workers
pub struct Agent {
    config: AgentConfig,
    host: Arc<cdp::CdpHost>,
    controller: ControllerHandle,
    controller_task: JoinHandle<()>,
    state: server::AppState,
    workers: Vec<JoinHandle<()>>,
}

impl Agent {
    pub async fn start(config: AgentConfig) -> AgentResult<Self> {
        info!("Starting Interception Agent...");

        let (browser, owns_browser) = open_browser(&config.server).await?;
        let log = Arc::new(RwLock::new(RequestLog::new(config.capture.clone())));
        let (events_tx, mut events_rx) = mpsc::channel(config.intercept.channel_capacity.max(1));
        let host = Arc::new(cdp::CdpHost::new(browser, owns_browser, log.clone(), events_tx));
        let editors = Arc::new(editor_queue::QueuedEditorLauncher::new(config.server.max_open_editors));

        let controller = InterceptController::new(host.clone(), editors.clone(), config.intercept.clone());
        let (handle, controller_task) = actor::spawn(controller);

        let mut workers = Vec::new();

        // Host events reach the controller in arrival order
        let forward = handle.clone();
        workers.push(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if forward.notify(event).await.is_err() {
                    break;
                }
            }
        }));

        workers.push(host.watch_targets().await?);
        let tabs = host.discover_tabs().await?;
        info!("Registered {} existing tab(s)", tabs.len());

        let maintenance = handle.clone();
        let maintenance_log = log.clone();
        let period = Duration::from_secs(config.server.maintenance_interval_secs);
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if maintenance.purge_orphans().await.is_err() {
                    break;
                }
                maintenance_log.write().await.cleanup_at(chrono::Utc::now());
            }
        }));

        let replayer = replay::Replayer::new(Duration::from_secs(config.server.replay_timeout_secs))?;
        let state = server::AppState {
            controller: handle.clone(),
            tabs: host.clone(),
            editors,
            log,
            replayer: Arc::new(replayer),
        };

        Ok(Self {
            config,
            host,
            controller: handle,
            controller_task,
            state,
            workers,
        })
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    /// Serve the message boundary until `shutdown` resolves
    pub async fn serve(&self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> AgentResult<()> {
        let addr = self.config.listen_socket()?;
        server::serve(addr, self.state.clone(), shutdown).await
    }

    /// Resume every paused response, then release the browser
    pub async fn shutdown(self) {
        info!("Stopping Interception Agent...");
        if let Err(e) = self.controller.shutdown().await {
            warn!("Controller already stopped: {}", e);
        }
        if let Err(e) = self.controller_task.await {
            warn!("Controller task ended abnormally: {}", e);
        }
        for worker in self.workers {
            worker.abort();
        }
        self.host.close().await;
    }
}

async fn open_browser(config: &ServerConfig) -> AgentResult<(Browser, bool)> {
    let (browser, mut handler, owns_browser) = match &config.browser_ws_url {
        Some(url) => {
            info!("Connecting to browser at {}", url);
            let (browser, handler) = Browser::connect(url.clone()).await?;
            (browser, handler, false)
        }
        None => {
            let mut builder = BrowserConfig::builder();
            if !config.headless {
                builder = builder.with_head();
            }
            let browser_config = builder
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .build()
                .map_err(AgentError::Browser)?;
            let (browser, handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| AgentError::Browser(format!("Failed to launch browser: {}", e)))?;
            info!("Browser launched (headless: {})", config.headless);
            (browser, handler, true)
        }
    };

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("Browser event error: {:?}", e);
            }
        }
    });

    Ok((browser, owns_browser))
}
