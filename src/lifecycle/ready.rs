use std::time::Duration;

use anyhow::{bail, Context, Result};
use backon::{ConstantBuilder, Retryable};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use crate::config::model::{parse_duration, ReadinessConfig};
use crate::ui::logs::LogLine;

use super::supervisor::{wait_for_exit, ProcessExit};

/// How a freshly spawned process is judged to be accepting connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub timeout: Duration,
    pub health_probe: bool,
    pub health_path: String,
    pub health_grace: Duration,
    pub health_interval: Duration,
    /// Lowercased substrings; stdout output containing any of them means ready.
    pub patterns: Vec<String>,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            health_probe: true,
            health_path: "/api/status".to_string(),
            health_grace: Duration::from_secs(1),
            health_interval: Duration::from_millis(500),
            patterns: crate::config::model::default_ready_patterns(),
        }
    }
}

impl ReadinessSettings {
    pub fn from_config(cfg: &ReadinessConfig) -> Result<Self> {
        Ok(Self {
            timeout: parse_duration("readiness.timeout", &cfg.timeout)?,
            health_probe: cfg.health_probe,
            health_path: cfg.health_path.clone(),
            health_grace: parse_duration("readiness.health_grace", &cfg.health_grace)?,
            health_interval: parse_duration("readiness.health_interval", &cfg.health_interval)?,
            patterns: cfg.patterns.iter().map(|p| p.to_lowercase()).collect(),
        })
    }

    fn health_url(&self, backend_port: u16) -> String {
        format!("http://127.0.0.1:{}{}", backend_port, self.health_path)
    }

    fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.patterns.iter().any(|p| text.contains(p.as_str()))
    }
}

/// The signal that declared the process ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadySignal {
    LogPattern { line: String },
    HealthCheck,
}

/// Why readiness was never reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    Exited(ProcessExit),
    TimedOut(Duration),
}

/// Race the log-pattern watch, the health poller and the process exit under
/// `settings.timeout`. Whichever resolves first wins; the rest are dropped.
pub async fn wait_until_ready(
    settings: &ReadinessSettings,
    backend_port: u16,
    lines: broadcast::Receiver<LogLine>,
    exit: watch::Receiver<Option<ProcessExit>>,
) -> std::result::Result<ReadySignal, NotReady> {
    let race = async {
        tokio::select! {
            line = watch_for_pattern(settings, lines) => Ok(ReadySignal::LogPattern { line }),
            () = poll_health(settings, backend_port) => Ok(ReadySignal::HealthCheck),
            exit = wait_for_exit(exit) => Err(NotReady::Exited(exit)),
        }
    };

    match tokio::time::timeout(settings.timeout, race).await {
        Ok(outcome) => outcome,
        Err(_) => Err(NotReady::TimedOut(settings.timeout)),
    }
}

/// Resolve with the first stdout chunk matching a ready pattern. Never
/// resolves if the stream closes without a match.
async fn watch_for_pattern(
    settings: &ReadinessSettings,
    mut lines: broadcast::Receiver<LogLine>,
) -> String {
    if settings.patterns.is_empty() {
        return std::future::pending().await;
    }
    loop {
        match lines.recv().await {
            Ok(line) if !line.is_stderr && settings.matches(&line.text) => {
                debug!(project = %line.project, line = %line.text, "ready pattern matched");
                return line.text;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                trace!(skipped = n, "readiness log watcher lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return std::future::pending().await;
            }
        }
    }
}

/// Poll the health route at a fixed interval after the grace delay.
/// Resolves on the first 2xx; never resolves when probing is disabled.
async fn poll_health(settings: &ReadinessSettings, backend_port: u16) {
    if !settings.health_probe {
        return std::future::pending().await;
    }
    tokio::time::sleep(settings.health_grace).await;

    let url = settings.health_url(backend_port);
    let client = match reqwest::Client::builder()
        .timeout(settings.health_interval.max(Duration::from_secs(1)))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "health probe client unavailable, relying on log patterns");
            return std::future::pending().await;
        }
    };

    let probed = (|| async { probe_once(&client, &url).await })
        .retry(
            ConstantBuilder::default()
                .with_delay(settings.health_interval)
                .with_max_times(usize::MAX),
        )
        .notify(|err: &anyhow::Error, dur: Duration| {
            trace!(url = %url, "health probe failed: {}, retrying in {:?}", err, dur);
        })
        .await;

    if probed.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn probe_once(client: &reqwest::Client, url: &str) -> Result<()> {
    let response = client.get(url).send().await.context("health probe")?;
    if !response.status().is_success() {
        bail!("health probe returned status {}", response.status());
    }
    Ok(())
}
