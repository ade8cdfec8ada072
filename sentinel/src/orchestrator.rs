//! C7 Session Orchestrator — per-target lifecycle state machine.
//!
//! ```text
//! INIT -> TRACER_SPAWNED -> SANDBOX_READY -> EMULATOR_RUNNING -> DRAIN -> CLEANED
//! ```
//!
//! A failure at any step releases everything acquired so far in reverse
//! order (§4.7). The `KillOnDrop` guard mirrors codex's `exec.rs`: if the
//! orchestrator task itself is aborted mid-session, the spawned subprocesses
//! don't outlive it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, RwLock};

use crate::config::EngineConfig;
use crate::containment::{self, CgroupHandle, WatchdogOutcome};
use crate::errors::SentinelError;
use crate::events;
use crate::router::Router;
use crate::sink::ReportSink;
use crate::verdict::Aggregator;

const TRACER_READY_GRACE: Duration = Duration::from_secs(1);
const DRAIN_GRACE: Duration = Duration::from_secs(1);
const TRACER_READY_MARKER: &str = "Attaching";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    TracerSpawned,
    SandboxReady,
    EmulatorRunning,
    Drain,
    Cleaned,
}

/// Kills a held child on drop, so an aborted orchestrator task never leaves
/// an orphaned tracer or emulator behind.
struct KillOnDrop {
    child: Option<Child>,
}

impl KillOnDrop {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn as_mut(&mut self) -> &mut Child {
        self.child.as_mut().expect("child present")
    }

    fn take(mut self) -> Child {
        self.child.take().expect("child present")
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

pub struct SessionOutcome {
    pub state: SessionState,
    pub watchdog_outcome: WatchdogOutcome,
}

/// Runs one target binary through the full lifecycle.
pub struct Orchestrator<'a> {
    cfg: &'a EngineConfig,
    router: Arc<Router>,
    sink: &'a mut ReportSink,
    emulator_command: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        cfg: &'a EngineConfig,
        router: Arc<Router>,
        sink: &'a mut ReportSink,
        emulator_command: Vec<String>,
    ) -> Self {
        Self { cfg, router, sink, emulator_command }
    }

    pub async fn run_target(&mut self, target: &Path) -> Result<SessionOutcome, SentinelError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut state = SessionState::Init;
        info!("[ORCHESTRATOR] session {} starting for target {}", session_id, target.display());

        let tracer_result = self.spawn_tracer(target).await;
        let mut tracer = match tracer_result {
            Ok(t) => {
                state = SessionState::TracerSpawned;
                t
            }
            Err(e) => {
                error!("[ORCHESTRATOR] failed to spawn tracer: {}", e);
                return Err(SentinelError::TracerFailure(e.to_string()));
            }
        };

        let cgroup = match containment::acquire(&session_id, self.cfg).await {
            Ok(handle) => {
                state = SessionState::SandboxReady;
                Some(handle)
            }
            Err(e) if self.cfg.require_cgroup => {
                drop(tracer);
                return Err(e);
            }
            Err(_) => {
                warn!("[ORCHESTRATOR] proceeding without cgroup containment");
                None
            }
        };

        let watchdog_outcome = Arc::new(RwLock::new(WatchdogOutcome::Idle));
        let watchdog_handle = cgroup.as_ref().map(|h| {
            let handle = Arc::new(h.clone());
            let ceiling = self.cfg.watchdog_pids_max;
            let outcome = Arc::clone(&watchdog_outcome);
            tokio::spawn(containment::run_watchdog(handle, ceiling, outcome))
        });

        let emulator_result = self.spawn_emulator(target, self.cfg.fork_max).await;
        let mut emulator = match emulator_result {
            Ok(e) => {
                state = SessionState::EmulatorRunning;
                e
            }
            Err(e) => {
                if let Some(handle) = &cgroup {
                    let _ = containment::cleanup(handle).await;
                }
                drop(tracer);
                return Err(SentinelError::TracerFailure(e.to_string()));
            }
        };

        if let Some(handle) = &cgroup {
            if let Some(pid) = emulator.as_mut().id() {
                if let Err(e) = handle.enroll(pid).await {
                    warn!("[ORCHESTRATOR] cgroup enrollment failed: {}", e);
                }
            }
        }

        let (tx, mut rx) = mpsc::channel(64);
        let stdout = tracer.as_mut().stdout.take();
        let parser_handle = stdout.map(|stdout| tokio::spawn(events::parser::run(stdout, tx)));

        let target_name = target.display().to_string();
        let mut aggregator = Aggregator::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.cfg.session_timeout_secs);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            let verdicts = self.router.dispatch(event).await;
                            let (report, high_risk) = aggregator.aggregate(&target_name, verdicts);
                            if let Some(report) = report {
                                self.sink.write(&report.render()).await;
                            }
                            for verdict in high_risk {
                                self.handle_high_risk(verdict.pid, cgroup.as_ref(), &mut aggregator).await;
                            }
                            self.maybe_emergency_sweep(&mut aggregator).await;
                        }
                        None => break,
                    }
                }
                status = emulator.as_mut().wait() => {
                    match status {
                        Ok(status) => info!("[ORCHESTRATOR] emulator exited: {}", status),
                        Err(e) => warn!("[ORCHESTRATOR] error waiting on emulator: {}", e),
                    }
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("[ORCHESTRATOR] session {} exceeded {}s timeout", session_id, self.cfg.session_timeout_secs);
                    break;
                }
            }
        }

        state = SessionState::Drain;
        tokio::time::sleep(DRAIN_GRACE).await;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            let verdicts = self.router.dispatch(event).await;
            let (report, _) = aggregator.aggregate(&target_name, verdicts);
            if let Some(report) = report {
                self.sink.write(&report.render()).await;
            }
        }
        if let Some(handle) = parser_handle {
            handle.abort();
        }

        let _ = emulator.as_mut().start_kill();
        let _ = tracer.as_mut().start_kill();
        if let Some(w) = watchdog_handle {
            w.abort();
        }
        if let Some(handle) = &cgroup {
            if let Err(e) = containment::cleanup(handle).await {
                error!("[ORCHESTRATOR] cleanup failed: {}", e);
            }
        }
        let _ = emulator.take();
        let _ = tracer.take();

        state = SessionState::Cleaned;
        let outcome = *watchdog_outcome.read().await;
        info!("[ORCHESTRATOR] session {} reached {:?}", session_id, state);
        Ok(SessionOutcome { state, watchdog_outcome: outcome })
    }

    async fn handle_high_risk(
        &self,
        pid: i64,
        cgroup: Option<&CgroupHandle>,
        aggregator: &mut Aggregator,
    ) {
        let result = match cgroup {
            Some(handle) => containment::terminate(handle).await,
            None => containment::kill_process_group(pid as i32),
        };
        if let Err(e) = result {
            warn!("[ORCHESTRATOR] containment action failed for pid {}: {}", pid, e);
            aggregator.record_hidden_failure(pid);
        }
    }

    /// Surfaces `hidden_failures` to the operator and, on explicit consent,
    /// sweeps every PID the session has ever seen via
    /// [`containment::emergency_sweep`] (`wrapper.py:214-232`). Asked at most
    /// once per session, and only once a normal containment attempt has
    /// already failed to reach a PID.
    async fn maybe_emergency_sweep(&self, aggregator: &mut Aggregator) {
        if aggregator.hidden_failures.is_empty() || aggregator.isolation_asked {
            return;
        }
        aggregator.isolation_asked = true;

        let failed: Vec<String> = aggregator.hidden_failures.iter().map(|p| p.to_string()).collect();
        warn!("[ORCHESTRATOR] could not terminate PIDs: {}", failed.join(", "));
        eprintln!("\nWARNING: could not terminate PIDs: {}", failed.join(", "));
        eprint!("Perform full isolation of all seen PIDs? [y/N]: ");

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        let consented = stdin.read_line(&mut answer).await.is_ok() && answer.trim().eq_ignore_ascii_case("y");

        if consented {
            let failures = containment::emergency_sweep(&aggregator.seen_pids);
            for (pid, err) in failures {
                warn!("[ORCHESTRATOR] emergency sweep could not isolate pid {}: {}", pid, err);
            }
            aggregator.seen_pids.clear();
            aggregator.hidden_failures.clear();
        } else {
            info!("[ORCHESTRATOR] skipping full isolation");
            aggregator.hidden_failures.clear();
        }
    }

    async fn spawn_tracer(&self, target: &Path) -> std::io::Result<KillOnDrop> {
        let mut child = Command::new("tracer-harness")
            .arg(target)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            wait_for_readiness(stderr).await;
        } else {
            tokio::time::sleep(TRACER_READY_GRACE).await;
        }

        Ok(KillOnDrop::new(child))
    }

    async fn spawn_emulator(&self, target: &Path, fork_max: u64) -> std::io::Result<KillOnDrop> {
        let Some((program, args)) = self.emulator_command.split_first() else {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty emulator command"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(target).kill_on_drop(true);

        unsafe {
            cmd.pre_exec(move || {
                let limit = libc::rlimit { rlim_cur: fork_max, rlim_max: fork_max };
                if libc::setrlimit(libc::RLIMIT_NPROC, &limit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn()?;
        Ok(KillOnDrop::new(child))
    }
}

/// Waits up to [`TRACER_READY_GRACE`] for a line containing
/// [`TRACER_READY_MARKER`] on the tracer's stderr; falls back to a timed
/// pause if the marker never appears (§4.7).
async fn wait_for_readiness<R: tokio::io::AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();
    let result = tokio::time::timeout(TRACER_READY_GRACE, async {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains(TRACER_READY_MARKER) {
                return;
            }
        }
    })
    .await;
    if result.is_err() {
        // Marker never arrived within the grace period; proceed anyway.
    }
}

pub fn emulator_command_for(_target: &PathBuf) -> Vec<String> {
    // The ELF header classifier that maps a binary to a concrete
    // `<qemu-variant> <binary-path>` invocation is an external collaborator;
    // this default covers the common case of a native-architecture target.
    vec!["qemu-x86_64".to_string()]
}
