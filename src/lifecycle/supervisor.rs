use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::model::SpawnConfig;
use crate::platform;
use crate::ui::buffer::LogBuffer;
use crate::ui::logs::LogLine;

use super::error::{describe_exit, InstanceError};
use super::ports::PortPair;
use super::ready::{wait_until_ready, NotReady, ReadinessSettings, ReadySignal};

// ---------------------------------------------------------------------------
// SpawnSettings
// ---------------------------------------------------------------------------

/// How instance processes are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSettings {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub port_env: String,
    pub frontend_port_env: String,
    pub project_path_env: String,
    pub env: BTreeMap<String, String>,
    pub capture_lines: usize,
}

impl SpawnSettings {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            port_env: "PORT".to_string(),
            frontend_port_env: "FRONTEND_PORT".to_string(),
            project_path_env: "PROJECT_PATH".to_string(),
            env: BTreeMap::new(),
            capture_lines: 200,
        }
    }

    /// Build from the `[spawn]` table; `working_dir` is resolved against the
    /// directory holding the config file.
    pub fn from_config(cfg: &SpawnConfig, config_dir: &Path) -> Self {
        let working_dir = cfg.working_dir.as_ref().map(|dir| {
            let expanded = PathBuf::from(platform::expand_home(dir));
            if expanded.is_absolute() {
                expanded
            } else {
                config_dir.join(expanded)
            }
        });
        Self {
            command: cfg.command.clone(),
            working_dir,
            port_env: cfg.port_env.clone(),
            frontend_port_env: cfg.frontend_port_env.clone(),
            project_path_env: cfg.project_path_env.clone(),
            env: cfg.env.clone(),
            capture_lines: cfg.capture_lines,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessExit
// ---------------------------------------------------------------------------

/// How a supervised process ended. Published exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub error: Option<String>,
}

impl ProcessExit {
    fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            error: None,
        }
    }

    fn wait_failed(error: impl Into<String>) -> Self {
        Self {
            code: None,
            error: Some(error.into()),
        }
    }

    /// A non-zero exit code or a failed wait. Signal deaths are not failures.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || matches!(self.code, Some(code) if code != 0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_exit(self.code, self.error.as_deref()))
    }
}

/// Wait until the process behind `exit` has been reaped.
pub async fn wait_for_exit(mut exit: watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    let published = exit.wait_for(Option::is_some).await.map(|e| (*e).clone());
    match published {
        Ok(Some(exit)) => exit,
        _ => ProcessExit::wait_failed("process reaper ended without reporting an exit"),
    }
}

// ---------------------------------------------------------------------------
// OutputCapture
// ---------------------------------------------------------------------------

/// Shared ring buffer of a process's most recent output lines.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    buf: Arc<Mutex<LogBuffer>>,
}

impl OutputCapture {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(LogBuffer::new(capacity))),
        }
    }

    pub fn push(&self, line: LogLine) {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).all()
    }
}

// ---------------------------------------------------------------------------
// SupervisedProcess
// ---------------------------------------------------------------------------

/// A running instance process plus the channels observing it.
///
/// The child itself is owned by a reaper task which publishes its
/// [`ProcessExit`] on a watch channel; everything else observes that.
pub struct SupervisedProcess {
    project_id: String,
    pid: u32,
    exit: watch::Receiver<Option<ProcessExit>>,
    output: OutputCapture,
    ready_lines: Option<broadcast::Receiver<LogLine>>,
    pumps: Vec<JoinHandle<()>>,
}

/// Start the instance process for `project_id` through the platform shell.
///
/// Ports and the project path are injected via the configured environment
/// variables; the rest of the parent environment is inherited.
pub fn start(
    project_id: &str,
    project_path: &Path,
    ports: PortPair,
    settings: &SpawnSettings,
    log_tx: broadcast::Sender<LogLine>,
) -> Result<SupervisedProcess, InstanceError> {
    info!(
        project = %project_id,
        backend_port = ports.backend,
        frontend_port = ports.frontend,
        "spawning: {} {:?}",
        platform::shell_name(),
        settings.command,
    );

    let mut cmd = platform::shell_command(&settings.command);
    if let Some(ref dir) = settings.working_dir {
        cmd.current_dir(dir);
    }
    cmd.envs(&settings.env);
    cmd.env(&settings.port_env, ports.backend.to_string());
    cmd.env(&settings.frontend_port_env, ports.frontend.to_string());
    cmd.env(&settings.project_path_env, project_path);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    platform::configure_process_group(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| InstanceError::ProcessSpawnFailed {
        project: project_id.to_string(),
        reason: e.to_string(),
    })?;

    let Some(pid) = child.id() else {
        return Err(InstanceError::ProcessSpawnFailed {
            project: project_id.to_string(),
            reason: "process exited before its pid could be read".to_string(),
        });
    };
    debug!(project = %project_id, pid, "child spawned");

    let output = OutputCapture::new(settings.capture_lines);
    let (lines_tx, ready_lines) = broadcast::channel(256);

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump_output(
            stdout,
            project_id.to_string(),
            false,
            Some(lines_tx),
            log_tx.clone(),
            output.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_output(
            stderr,
            project_id.to_string(),
            true,
            None,
            log_tx,
            output.clone(),
        )));
    }

    let (exit_tx, exit) = watch::channel(None);
    let reaper_project = project_id.to_string();
    tokio::spawn(async move {
        let exit = match child.wait().await {
            Ok(status) => ProcessExit::from_status(status),
            Err(e) => {
                warn!(project = %reaper_project, pid, error = %e, "wait() failed");
                ProcessExit::wait_failed(e.to_string())
            }
        };
        info!(project = %reaper_project, pid, "process exited ({})", exit);
        let _ = exit_tx.send(Some(exit));
    });

    Ok(SupervisedProcess {
        project_id: project_id.to_string(),
        pid,
        exit,
        output,
        ready_lines: Some(ready_lines),
        pumps,
    })
}

/// Longest unterminated line kept before it is flushed as a line anyway.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Read raw chunks from `reader`. When `ready_tx` is set, every chunk is
/// published there together with the unterminated text before it, so
/// output without a trailing newline can still signal readiness. Complete
/// lines go to the capture buffer and the shared log channel.
async fn pump_output<R>(
    mut reader: R,
    project: String,
    is_stderr: bool,
    ready_tx: Option<broadcast::Sender<LogLine>>,
    log_tx: broadcast::Sender<LogLine>,
    output: OutputCapture,
) where
    R: AsyncRead + Unpin,
{
    let emit = |raw: &[u8]| {
        let text = String::from_utf8_lossy(raw)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        let line = LogLine::new(&project, text, is_stderr);
        output.push(line.clone());
        let _ = log_tx.send(line);
    };

    let mut chunk = vec![0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                if let Some(ready_tx) = &ready_tx {
                    let text = String::from_utf8_lossy(&pending).into_owned();
                    let _ = ready_tx.send(LogLine::new(&project, text, is_stderr));
                }
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    emit(&line[..]);
                }
                if pending.len() > MAX_PENDING_LINE {
                    emit(&pending[..]);
                    pending.clear();
                }
            }
            Err(e) => {
                let stream = if is_stderr { "stderr" } else { "stdout" };
                warn!(project = %project, error = %e, "{} read error", stream);
                break;
            }
        }
    }
    if !pending.is_empty() {
        emit(&pending[..]);
    }
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit.clone()
    }

    pub fn output(&self) -> OutputCapture {
        self.output.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Run the readiness race against this process's stdout, health route
    /// and exit.
    pub async fn wait_ready(
        &mut self,
        settings: &ReadinessSettings,
        backend_port: u16,
    ) -> Result<ReadySignal, NotReady> {
        let lines = match self.ready_lines.take() {
            Some(rx) => rx,
            None => broadcast::channel(1).1,
        };
        wait_until_ready(settings, backend_port, lines, self.exit_watch()).await
    }

    /// Give the output pumps up to `limit` to hit EOF so late lines land in
    /// the capture buffer.
    pub async fn drain_output(&mut self, limit: Duration) {
        let pumps = std::mem::take(&mut self.pumps);
        if pumps.is_empty() {
            return;
        }
        if tokio::time::timeout(limit, futures_util::future::join_all(pumps))
            .await
            .is_err()
        {
            debug!(project = %self.project_id, "output pumps still open after exit");
        }
    }

    /// Graceful-then-forceful termination of the process tree.
    pub async fn terminate(&self, grace: Duration) {
        terminate_pid(self.pid, grace, self.exit_watch()).await
    }
}

/// How long to wait for the reaper after a forced kill.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Terminate `pid`, treating the publication on `exit` as proof it is gone.
/// Returns once the process has been reaped or `KILL_SETTLE` has passed
/// after escalation.
pub async fn terminate_pid(
    pid: u32,
    grace: Duration,
    exit: watch::Receiver<Option<ProcessExit>>,
) {
    let graceful = exit.clone();
    platform::terminate(pid, grace, async move {
        wait_for_exit(graceful).await;
    })
    .await;

    if tokio::time::timeout(KILL_SETTLE, wait_for_exit(exit))
        .await
        .is_err()
    {
        warn!(pid, "process still not reaped after forced kill");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn settings(command: &str) -> SpawnSettings {
        SpawnSettings::new(command)
    }

    fn ports() -> PortPair {
        PortPair {
            backend: 4100,
            frontend: 5100,
        }
    }

    async fn run_to_exit(command: &str) -> (ProcessExit, Vec<LogLine>) {
        let (log_tx, _) = broadcast::channel(64);
        let mut proc = start("proj-a", Path::new("/tmp/a"), ports(), &settings(command), log_tx)
            .unwrap();
        let exit = wait_for_exit(proc.exit_watch()).await;
        proc.drain_output(Duration::from_secs(2)).await;
        (exit, proc.output().snapshot())
    }

    #[tokio::test]
    async fn injects_ports_and_path() {
        let (exit, lines) =
            run_to_exit(r#"echo "port=$PORT fe=$FRONTEND_PORT path=$PROJECT_PATH""#).await;
        assert_eq!(exit.code, Some(0));
        assert!(!exit.is_failure());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "port=4100 fe=5100 path=/tmp/a");
        assert_eq!(lines[0].project, "proj-a");
    }

    #[tokio::test]
    async fn custom_env_names_and_extras() {
        let mut s = settings(r#"echo "$APP_PORT $MODE""#);
        s.port_env = "APP_PORT".to_string();
        s.env.insert("MODE".to_string(), "test".to_string());
        let (log_tx, _) = broadcast::channel(8);
        let mut proc = start("proj-a", Path::new("/tmp/a"), ports(), &s, log_tx).unwrap();
        wait_for_exit(proc.exit_watch()).await;
        proc.drain_output(Duration::from_secs(2)).await;
        assert_eq!(proc.output().snapshot()[0].text, "4100 test");
    }

    #[tokio::test]
    async fn publishes_exit_code_and_stderr() {
        let (exit, lines) = run_to_exit("echo boom >&2; exit 3").await;
        assert_eq!(exit.code, Some(3));
        assert!(exit.is_failure());
        assert_eq!(exit.to_string(), "exit code 3");
        assert!(lines[0].is_stderr);
        assert_eq!(lines[0].text, "boom");
    }

    #[tokio::test]
    async fn capture_keeps_only_recent_lines() {
        let mut s = settings("for i in 1 2 3 4 5; do echo line$i; done");
        s.capture_lines = 2;
        let (log_tx, mut log_rx) = broadcast::channel(16);
        let mut proc = start("proj-a", Path::new("/tmp/a"), ports(), &s, log_tx).unwrap();
        wait_for_exit(proc.exit_watch()).await;
        proc.drain_output(Duration::from_secs(2)).await;

        let captured: Vec<String> = proc.output().snapshot().into_iter().map(|l| l.text).collect();
        assert_eq!(captured, vec!["line4", "line5"]);
        // The shared log channel still sees every line.
        assert_eq!(log_rx.recv().await.unwrap().text, "line1");
    }

    #[tokio::test]
    async fn bad_working_dir_fails_to_spawn() {
        let mut s = settings("true");
        s.working_dir = Some(PathBuf::from("/nonexistent/projdeck/dir"));
        let (log_tx, _) = broadcast::channel(1);
        let err = start("proj-a", Path::new("/tmp/a"), ports(), &s, log_tx)
            .err()
            .unwrap();
        assert!(matches!(err, InstanceError::ProcessSpawnFailed { .. }));
    }

    #[tokio::test]
    async fn ready_then_terminate() {
        let (log_tx, _) = broadcast::channel(16);
        let mut proc = start(
            "proj-a",
            Path::new("/tmp/a"),
            ports(),
            &settings("echo 'server running on port 4100'; sleep 30"),
            log_tx,
        )
        .unwrap();

        let readiness = ReadinessSettings {
            health_probe: false,
            timeout: Duration::from_secs(5),
            ..ReadinessSettings::default()
        };
        let signal = proc.wait_ready(&readiness, 4100).await.unwrap();
        assert!(matches!(signal, ReadySignal::LogPattern { .. }));
        assert!(!proc.has_exited());

        proc.terminate(Duration::from_secs(2)).await;
        let exit = wait_for_exit(proc.exit_watch()).await;
        assert!(!platform::is_process_alive(proc.pid()));
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn ready_on_output_without_newline() {
        let (log_tx, _) = broadcast::channel(16);
        let mut proc = start(
            "proj-a",
            Path::new("/tmp/a"),
            ports(),
            &settings(r#"printf 'server running on port %s' "$PORT"; sleep 30"#),
            log_tx,
        )
        .unwrap();

        let readiness = ReadinessSettings {
            health_probe: false,
            timeout: Duration::from_secs(3),
            ..ReadinessSettings::default()
        };
        match proc.wait_ready(&readiness, 4100).await.unwrap() {
            ReadySignal::LogPattern { line } => assert_eq!(line, "server running on port 4100"),
            other => panic!("unexpected signal: {:?}", other),
        }

        proc.terminate(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn pattern_split_across_writes_still_matches() {
        let (log_tx, _) = broadcast::channel(16);
        let mut proc = start(
            "proj-a",
            Path::new("/tmp/a"),
            ports(),
            &settings("printf 'server '; sleep 0.2; printf 'running'; sleep 30"),
            log_tx,
        )
        .unwrap();

        let readiness = ReadinessSettings {
            health_probe: false,
            timeout: Duration::from_secs(3),
            ..ReadinessSettings::default()
        };
        assert!(proc.wait_ready(&readiness, 4100).await.is_ok());
        proc.terminate(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn unterminated_tail_is_captured_at_eof() {
        let (exit, lines) = run_to_exit("echo first; printf 'no newline'").await;
        assert_eq!(exit.code, Some(0));
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "no newline"]);
    }

    #[test]
    fn from_config_resolves_working_dir() {
        let cfg: SpawnConfig = toml::from_str(
            r#"
            command = "node server.js"
            working_dir = "dashboard"
            "#,
        )
        .unwrap();
        let s = SpawnSettings::from_config(&cfg, Path::new("/srv/deck"));
        assert_eq!(s.working_dir, Some(PathBuf::from("/srv/deck/dashboard")));
        assert_eq!(s.port_env, "PORT");
        assert_eq!(s.capture_lines, 200);
    }
}
