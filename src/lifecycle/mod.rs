pub mod error;
pub mod events;
pub mod ports;
pub mod ready;
pub mod state;
pub mod supervisor;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::model::{parse_duration, ProjdeckConfig};
use crate::template::TemplateInitializer;
use crate::ui::logs::LogLine;

pub use error::InstanceError;
pub use events::LifecycleEvent;
pub use ports::{PortAllocator, PortPair, PortRange};
pub use ready::ReadinessSettings;
pub use state::{InstanceInfo, InstanceState};
pub use supervisor::{OutputCapture, ProcessExit, SpawnSettings};

use ready::NotReady;
use supervisor::{terminate_pid, wait_for_exit, SupervisedProcess};

/// How long to wait for output pumps to reach EOF after a process exits.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// ManagerSettings
// ---------------------------------------------------------------------------

/// Everything the manager needs from the config, with durations parsed.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub spawn: SpawnSettings,
    pub ports: PortRange,
    pub readiness: ReadinessSettings,
    pub termination_grace: Duration,
    pub auto_init: bool,
}

impl ManagerSettings {
    pub fn from_config(config: &ProjdeckConfig, config_dir: &Path) -> Result<Self> {
        Ok(Self {
            spawn: SpawnSettings::from_config(&config.spawn, config_dir),
            ports: PortRange::from_config(&config.ports),
            readiness: ReadinessSettings::from_config(&config.readiness)?,
            termination_grace: parse_duration("termination.grace", &config.termination.grace)?,
            auto_init: config.spawn.auto_init,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type SpawnOutcome = Result<InstanceInfo, InstanceError>;
type SharedOutcome = Shared<BoxFuture<'static, SpawnOutcome>>;

/// A spawn in flight. Every caller for the same project awaits `outcome`.
struct PendingAttempt {
    phase: InstanceState,
    outcome: SharedOutcome,
}

struct InstanceRecord {
    info: InstanceInfo,
    exit: watch::Receiver<Option<ProcessExit>>,
    output: OutputCapture,
    stop_requested: bool,
    /// Flips to `true` once the monitor has finished cleanup.
    retired: watch::Receiver<bool>,
}

#[derive(Default)]
struct Registry {
    instances: HashMap<String, InstanceRecord>,
    pending: HashMap<String, PendingAttempt>,
}

struct ManagerInner {
    settings: ManagerSettings,
    ports: PortAllocator,
    registry: Mutex<Registry>,
    events: broadcast::Sender<LifecycleEvent>,
    log_tx: broadcast::Sender<LogLine>,
    templates: Option<Arc<dyn TemplateInitializer>>,
    tracker: TaskTracker,
}

// ---------------------------------------------------------------------------
// InstanceManager
// ---------------------------------------------------------------------------

/// Owns every running dashboard instance: one process and one port pair per
/// project.
///
/// Concurrent `spawn_instance` calls for the same project share a single
/// attempt. Each attempt runs on its own task, so it settles (and cleans up
/// after itself) even if every caller goes away.
#[derive(Clone)]
pub struct InstanceManager {
    inner: Arc<ManagerInner>,
}

impl InstanceManager {
    pub fn new(
        settings: ManagerSettings,
        templates: Option<Arc<dyn TemplateInitializer>>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (log_tx, _) = broadcast::channel(1024);
        let ports = PortAllocator::new(settings.ports.clone());
        Self {
            inner: Arc::new(ManagerInner {
                settings,
                ports,
                registry: Mutex::new(Registry::default()),
                events,
                log_tx,
                templates,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Start (or join the pending start of) the instance for `project_id`.
    pub async fn spawn_instance(
        &self,
        project_id: &str,
        project_path: &Path,
    ) -> Result<InstanceInfo, InstanceError> {
        let outcome = {
            let mut registry = self.inner.registry();
            if registry.instances.contains_key(project_id) {
                return Err(InstanceError::AlreadyRunning {
                    project: project_id.to_string(),
                });
            }
            match registry.pending.get(project_id) {
                Some(attempt) => {
                    debug!(project = %project_id, "joining pending spawn attempt");
                    attempt.outcome.clone()
                }
                None => {
                    let outcome = self.begin_attempt(project_id, project_path);
                    registry.pending.insert(
                        project_id.to_string(),
                        PendingAttempt {
                            phase: InstanceState::Allocating,
                            outcome: outcome.clone(),
                        },
                    );
                    outcome
                }
            }
        };
        outcome.await
    }

    fn begin_attempt(&self, project_id: &str, project_path: &Path) -> SharedOutcome {
        let (tx, rx) = oneshot::channel();
        let abandoned = project_id.to_string();
        let outcome = rx
            .map(move |result| {
                result.unwrap_or_else(|_| {
                    Err(InstanceError::AttemptAbandoned { project: abandoned })
                })
            })
            .boxed()
            .shared();

        let inner = Arc::clone(&self.inner);
        let project_id = project_id.to_string();
        let project_path = project_path.to_path_buf();
        self.inner.tracker.spawn(async move {
            let result = inner.run_attempt(&project_id, project_path).await;
            let _ = tx.send(result);
        });
        outcome
    }

    /// Stop the instance for `project_id` and wait until it has been cleaned
    /// up. A second call while a stop is in progress waits for the same
    /// cleanup.
    pub async fn stop_instance(&self, project_id: &str) -> Result<(), InstanceError> {
        let (pid, exit, mut retired, in_progress) = {
            let mut registry = self.inner.registry();
            let Some(record) = registry.instances.get_mut(project_id) else {
                return Err(InstanceError::NotRunning {
                    project: project_id.to_string(),
                });
            };
            let in_progress = record.stop_requested;
            record.stop_requested = true;
            if record.info.state == InstanceState::Running {
                record.info.state = InstanceState::Stopping;
            }
            (
                record.info.pid,
                record.exit.clone(),
                record.retired.clone(),
                in_progress,
            )
        };

        if in_progress {
            debug!(project = %project_id, pid, "stop already in progress, waiting");
        } else {
            info!(project = %project_id, pid, "stopping instance");
            terminate_pid(pid, self.inner.settings.termination_grace, exit).await;
        }

        let _ = retired.wait_for(|done| *done).await;
        Ok(())
    }

    /// Stop every registered instance concurrently. Failures are logged and
    /// never block the others.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.inner.registry().instances.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "stopping all instances");
        let results = join_all(ids.iter().map(|id| self.stop_instance(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(project = %id, error = %e, "failed to stop instance");
            }
        }
    }

    /// Stop everything, including instances whose spawn is still in flight,
    /// and wait for all background tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.tracker.close();
        self.stop_all().await;

        let pending: Vec<SharedOutcome> = self
            .inner
            .registry()
            .pending
            .values()
            .map(|attempt| attempt.outcome.clone())
            .collect();
        if !pending.is_empty() {
            info!(count = pending.len(), "waiting for in-flight spawns to settle");
            join_all(pending).await;
            self.stop_all().await;
        }

        self.inner.tracker.wait().await;
    }

    /// Public descriptors of every registered instance, ordered by project.
    pub fn list_instances(&self) -> Vec<InstanceInfo> {
        let registry = self.inner.registry();
        let mut instances: Vec<InstanceInfo> =
            registry.instances.values().map(|r| r.info.clone()).collect();
        instances.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        instances
    }

    pub fn is_running(&self, project_id: &str) -> bool {
        self.inner.registry().instances.contains_key(project_id)
    }

    pub fn get_instance(&self, project_id: &str) -> Option<InstanceInfo> {
        self.inner
            .registry()
            .instances
            .get(project_id)
            .map(|r| r.info.clone())
    }

    /// `Idle` when the project is unknown to the manager.
    pub fn instance_state(&self, project_id: &str) -> InstanceState {
        let registry = self.inner.registry();
        if let Some(record) = registry.instances.get(project_id) {
            return record.info.state;
        }
        registry
            .pending
            .get(project_id)
            .map(|attempt| attempt.phase)
            .unwrap_or(InstanceState::Idle)
    }

    /// Captured output of a registered instance.
    pub fn output(&self, project_id: &str) -> Option<Vec<LogLine>> {
        self.inner
            .registry()
            .instances
            .get(project_id)
            .map(|r| r.output.snapshot())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Every output line of every instance process, as it is read.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogLine> {
        self.inner.log_tx.subscribe()
    }

    pub fn allocated_ports(&self) -> Vec<PortPair> {
        self.inner.ports.allocated()
    }
}

impl ManagerInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LifecycleEvent) {
        debug!(project = %event.project_id(), event = event.kind(), "lifecycle event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, project_id: &str, phase: InstanceState) {
        if let Some(attempt) = self.registry().pending.get_mut(project_id) {
            attempt.phase = phase;
        }
    }

    fn fail(&self, project_id: &str, err: InstanceError) -> SpawnOutcome {
        self.registry().pending.remove(project_id);
        warn!(project = %project_id, "spawn failed: {}", err.summary());
        Err(err)
    }

    async fn run_attempt(self: &Arc<Self>, project_id: &str, project_path: PathBuf) -> SpawnOutcome {
        if let Err(e) = self.initialize(project_id, &project_path).await {
            return self.fail(project_id, e);
        }

        let ports = match self.ports.allocate().await {
            Ok(ports) => ports,
            Err(e) => return self.fail(project_id, e),
        };
        self.set_phase(project_id, InstanceState::Spawning);

        let mut process = match supervisor::start(
            project_id,
            &project_path,
            ports,
            &self.settings.spawn,
            self.log_tx.clone(),
        ) {
            Ok(process) => process,
            Err(e) => {
                self.ports.release(ports.backend, ports.frontend);
                return self.fail(project_id, e);
            }
        };

        match process.wait_ready(&self.settings.readiness, ports.backend).await {
            Ok(signal) => {
                debug!(project = %project_id, pid = process.pid(), ?signal, "instance ready");
            }
            Err(not_ready) => {
                let crashed = matches!(&not_ready, NotReady::Exited(exit) if exit.is_failure());
                let err = self.abort(project_id, &mut process, not_ready).await;
                self.ports.release(ports.backend, ports.frontend);
                if let (true, InstanceError::ProcessExited { code, output, .. }) = (crashed, &err) {
                    error!(project = %project_id, pid = process.pid(), "{}", err.summary());
                    self.emit(LifecycleEvent::Crashed {
                        project_id: project_id.to_string(),
                        exit_code: *code,
                        error: err.summary(),
                        output: output.clone(),
                    });
                }
                return self.fail(project_id, err);
            }
        }

        let info = InstanceInfo {
            project_id: project_id.to_string(),
            backend_port: ports.backend,
            frontend_port: ports.frontend,
            pid: process.pid(),
            started_at: Utc::now(),
            state: InstanceState::Running,
        };
        let (retired_tx, retired) = watch::channel(false);
        {
            let mut registry = self.registry();
            registry.pending.remove(project_id);
            registry.instances.insert(
                project_id.to_string(),
                InstanceRecord {
                    info: info.clone(),
                    exit: process.exit_watch(),
                    output: process.output(),
                    stop_requested: false,
                    retired,
                },
            );
        }
        info!(
            project = %project_id,
            pid = info.pid,
            backend_port = info.backend_port,
            frontend_port = info.frontend_port,
            "instance running"
        );
        self.emit(LifecycleEvent::Spawned {
            instance: info.clone(),
        });

        let inner = Arc::clone(self);
        self.tracker
            .spawn(async move { inner.monitor(process, ports, retired_tx).await });

        Ok(info)
    }

    /// Run the template initializer, if enabled. Emits `initialized` when it
    /// created anything.
    async fn initialize(&self, project_id: &str, project_path: &Path) -> Result<(), InstanceError> {
        let Some(templates) = self.templates.as_ref().filter(|_| self.settings.auto_init) else {
            return Ok(());
        };

        let templates = Arc::clone(templates);
        let id = project_id.to_string();
        let path = project_path.to_path_buf();
        let created = tokio::task::spawn_blocking(move || templates.ensure(&id, &path))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| format!("{:#}", e)));

        match created {
            Ok(files) if files.is_empty() => Ok(()),
            Ok(files) => {
                info!(project = %project_id, count = files.len(), "project files initialized");
                self.emit(LifecycleEvent::Initialized {
                    project_id: project_id.to_string(),
                    files,
                });
                Ok(())
            }
            Err(reason) => Err(InstanceError::TemplateInitFailed {
                project: project_id.to_string(),
                reason,
            }),
        }
    }

    /// Tear down a process that never became ready and describe why.
    async fn abort(
        &self,
        project_id: &str,
        process: &mut SupervisedProcess,
        not_ready: NotReady,
    ) -> InstanceError {
        match not_ready {
            NotReady::Exited(exit) => {
                // The shell is gone but its group may not be.
                crate::platform::kill_group(process.pid()).await;
                process.drain_output(OUTPUT_DRAIN).await;
                InstanceError::ProcessExited {
                    project: project_id.to_string(),
                    code: exit.code,
                    error: exit.error,
                    output: process.output().snapshot(),
                }
            }
            NotReady::TimedOut(timeout) => {
                process.terminate(self.settings.termination_grace).await;
                process.drain_output(OUTPUT_DRAIN).await;
                InstanceError::ReadinessTimeout {
                    project: project_id.to_string(),
                    timeout,
                    output: process.output().snapshot(),
                }
            }
        }
    }

    /// Observe a registered instance until its process exits, then release
    /// everything it held exactly once.
    async fn monitor(
        self: Arc<Self>,
        mut process: SupervisedProcess,
        ports: PortPair,
        retired: watch::Sender<bool>,
    ) {
        let exit = wait_for_exit(process.exit_watch()).await;
        let project_id = process.project_id().to_string();

        // Terminated instances leave the registry right away.
        let stop_requested = self
            .registry()
            .instances
            .remove(&project_id)
            .is_some_and(|record| record.stop_requested);
        self.ports.release(ports.backend, ports.frontend);

        // Descendants may still hold the pipes open.
        process.drain_output(OUTPUT_DRAIN).await;

        if !stop_requested && exit.is_failure() {
            let output = process.output().snapshot();
            let crash = InstanceError::ProcessCrashed {
                project: project_id.clone(),
                code: exit.code,
                error: exit.error.clone(),
                output: output.clone(),
            };
            error!(project = %project_id, pid = process.pid(), "{}", crash);
            self.emit(LifecycleEvent::Crashed {
                project_id,
                exit_code: exit.code,
                error: crash.summary(),
                output,
            });
        } else {
            info!(project = %project_id, pid = process.pid(), "instance stopped ({})", exit);
            self.emit(LifecycleEvent::Stopped {
                project_id,
                exit_code: exit.code,
            });
        }

        let _ = retired.send(true);
    }
}
