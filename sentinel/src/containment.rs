//! C6 Containment Controller — cgroup acquisition, enrollment, termination,
//! cleanup, and the resource-usage watchdog.
//!
//! §9 Design Notes models the v1/v2 split as "a tagged sum type with a single
//! `ops` trait — enroll, kill, remove". [`CgroupHandle`] is that sum type;
//! [`CgroupOps`] is the trait, implemented once per variant so the rest of
//! the system (Orchestrator, watchdog) is agnostic to which kernel API is in
//! play.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::errors::SentinelError;

const CPU_PERIOD_MICROS: u64 = 100_000;
const SETTLE_INTERVAL: Duration = Duration::from_millis(200);
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Either a single unified-hierarchy path (v2) or a map of controller name to
/// its own subdirectory (v1). Both shapes support the same operations.
#[derive(Debug, Clone)]
pub enum CgroupHandle {
    V2 { path: PathBuf },
    V1 { controllers: HashMap<String, PathBuf> },
}

#[async_trait]
pub trait CgroupOps: Send + Sync {
    async fn enroll(&self, pid: u32) -> std::io::Result<()>;
    async fn procs(&self) -> std::io::Result<Vec<i32>>;
    async fn current_memory(&self) -> Option<u64>;
    async fn current_pids(&self) -> Option<u64>;
    async fn remove(&self) -> std::io::Result<()>;
}

#[async_trait]
impl CgroupOps for CgroupHandle {
    async fn enroll(&self, pid: u32) -> std::io::Result<()> {
        match self {
            CgroupHandle::V2 { path } => {
                tokio::fs::write(path.join("cgroup.procs"), pid.to_string()).await
            }
            CgroupHandle::V1 { controllers } => {
                for dir in controllers.values() {
                    tokio::fs::write(dir.join("cgroup.procs"), pid.to_string()).await?;
                }
                Ok(())
            }
        }
    }

    async fn procs(&self) -> std::io::Result<Vec<i32>> {
        let path = match self {
            CgroupHandle::V2 { path } => path.join("cgroup.procs"),
            CgroupHandle::V1 { controllers } => match controllers.get("pids") {
                Some(dir) => dir.join("cgroup.procs"),
                None => return Ok(Vec::new()),
            },
        };
        let contents = tokio::fs::read_to_string(path).await.unwrap_or_default();
        Ok(contents.lines().filter_map(|l| l.trim().parse().ok()).collect())
    }

    async fn current_memory(&self) -> Option<u64> {
        let path = match self {
            CgroupHandle::V2 { path } => path.join("memory.current"),
            CgroupHandle::V1 { controllers } => {
                controllers.get("memory")?.join("memory.usage_in_bytes")
            }
        };
        tokio::fs::read_to_string(path).await.ok()?.trim().parse().ok()
    }

    async fn current_pids(&self) -> Option<u64> {
        let path = match self {
            CgroupHandle::V2 { path } => path.join("pids.current"),
            CgroupHandle::V1 { controllers } => controllers.get("pids")?.join("pids.current"),
        };
        tokio::fs::read_to_string(path).await.ok()?.trim().parse().ok()
    }

    async fn remove(&self) -> std::io::Result<()> {
        let dirs: Vec<&Path> = match self {
            CgroupHandle::V2 { path } => vec![path.as_path()],
            CgroupHandle::V1 { controllers } => controllers.values().map(|p| p.as_path()).collect(),
        };
        for dir in dirs {
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => {}
                Err(e) if is_swallowable(&e) => {}
                Err(e) => {
                    error!("[CONTAINMENT] rmdir {} failed: {}", dir.display(), e);
                }
            }
        }
        Ok(())
    }
}

fn is_swallowable(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::ENOENT) | Some(libc::EROFS) | Some(libc::EBUSY)
    ) || e.kind() == std::io::ErrorKind::NotFound
}

/// Acquires a cgroup scope for one session: v2 if the mount table has a
/// `cgroup2` line and the controllers can be enabled, v1 otherwise.
pub async fn acquire(session_id: &str, cfg: &EngineConfig) -> Result<CgroupHandle, SentinelError> {
    match acquire_v2(session_id, cfg).await {
        Ok(handle) => {
            info!("[CONTAINMENT] acquired cgroup v2 scope for session {}", session_id);
            Ok(handle)
        }
        Err(v2_err) => {
            warn!("[CONTAINMENT] cgroup v2 acquisition failed ({}), falling back to v1", v2_err);
            match acquire_v1(session_id, cfg).await {
                Ok(handle) => {
                    info!("[CONTAINMENT] acquired cgroup v1 scope for session {}", session_id);
                    Ok(handle)
                }
                Err(v1_err) => {
                    // Whether this is fatal or a degrade-and-continue is the
                    // orchestrator's call (it knows `--cgroup` was requested
                    // by an unprivileged operator); we just report the failure.
                    Err(SentinelError::SandboxAcquisitionFailure(format!(
                        "v2: {}; v1: {}",
                        v2_err, v1_err
                    )))
                }
            }
        }
    }
}

async fn acquire_v2(session_id: &str, cfg: &EngineConfig) -> Result<CgroupHandle, String> {
    let mounts = tokio::fs::read_to_string("/proc/mounts").await.map_err(|e| e.to_string())?;
    let mount_point = mounts
        .lines()
        .find(|l| l.split_whitespace().nth(2) == Some("cgroup2"))
        .and_then(|l| l.split_whitespace().nth(1))
        .ok_or_else(|| "no cgroup2 mount found".to_string())?;

    let path = PathBuf::from(mount_point).join("sentinel").join(session_id);
    tokio::fs::create_dir_all(&path).await.map_err(|e| e.to_string())?;

    tokio::fs::write(path.join("cgroup.subtree_control"), "+memory +cpu +pids")
        .await
        .map_err(|e| e.to_string())?;

    let memory_bytes = crate::config::parse_memory_limit(&cfg.memory_limit)?;
    tokio::fs::write(path.join("memory.max"), memory_bytes.to_string())
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::write(path.join("cpu.max"), format!("{} {}", cfg.cpu_quota_micros, CPU_PERIOD_MICROS))
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::write(path.join("pids.max"), cfg.pids_max.to_string())
        .await
        .map_err(|e| e.to_string())?;

    Ok(CgroupHandle::V2 { path })
}

async fn acquire_v1(session_id: &str, cfg: &EngineConfig) -> Result<CgroupHandle, String> {
    let mut controllers = HashMap::new();
    let memory_bytes = crate::config::parse_memory_limit(&cfg.memory_limit)?;

    let specs: &[(&str, &str, String)] = &[
        ("memory", "memory.limit_in_bytes", memory_bytes.to_string()),
        ("cpu", "cpu.cfs_quota_us", cfg.cpu_quota_micros.to_string()),
        ("pids", "pids.max", cfg.pids_max.to_string()),
    ];

    for (controller, file, value) in specs {
        let dir = PathBuf::from("/sys/fs/cgroup").join(controller).join("sentinel").join(session_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| e.to_string())?;
        tokio::fs::write(dir.join(file), value).await.map_err(|e| e.to_string())?;
        controllers.insert(controller.to_string(), dir);
    }

    Ok(CgroupHandle::V1 { controllers })
}

/// Delivers SIGKILL to every PID currently in the cgroup. Idempotent: an
/// empty cgroup produces no signals and no error (§8 property 4).
pub async fn terminate(handle: &CgroupHandle) -> Result<(), SentinelError> {
    let pids = handle.procs().await.map_err(|e| SentinelError::TerminationFailure(e.to_string()))?;
    for pid in pids {
        // SAFETY: `pid` is read directly from the kernel's own cgroup.procs
        // file; kill(2) on a PID that has already exited is a harmless ESRCH.
        let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("[CONTAINMENT] kill({}) failed: {}", pid, err);
            }
        }
    }
    Ok(())
}

/// Re-invokes termination, settles briefly, then removes every directory the
/// handle owns. Errors ENOENT/EROFS/EBUSY are swallowed inside `remove()`.
pub async fn cleanup(handle: &CgroupHandle) -> Result<(), SentinelError> {
    terminate(handle).await?;
    tokio::time::sleep(SETTLE_INTERVAL).await;
    handle.remove().await.map_err(|e| SentinelError::TerminationFailure(e.to_string()))?;
    Ok(())
}

/// Falls back to killing a PID's process group when no cgroup handle exists.
/// Returns `Err` (recorded as a hidden failure by the caller) if the group
/// cannot be resolved.
pub fn kill_process_group(pid: i32) -> Result<(), SentinelError> {
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(SentinelError::TerminationFailure(format!(
            "killpg({}) failed: {}",
            pid, err
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    #[default]
    Idle,
    AbortedByWatchdog,
}

/// Periodically reads `memory.current`/`pids.current` and triggers
/// termination if the PID ceiling is exceeded (§4.6). `pids_ceiling` is the
/// watchdog's own soft trip point (`--watchdog-pids-max`, default 500 per
/// the original), independent of the cgroup's hard `pids.max` cap.
pub async fn run_watchdog(
    handle: Arc<CgroupHandle>,
    pids_ceiling: u64,
    outcome: Arc<RwLock<WatchdogOutcome>>,
) {
    loop {
        tokio::time::sleep(WATCHDOG_INTERVAL).await;
        let pids = handle.current_pids().await.unwrap_or(0);
        let _memory = handle.current_memory().await;
        if pids > pids_ceiling {
            warn!(
                "[CONTAINMENT] watchdog: pid count {} exceeds ceiling {}, terminating",
                pids, pids_ceiling
            );
            if let Err(e) = terminate(&handle).await {
                error!("[CONTAINMENT] watchdog termination failed: {}", e);
            }
            *outcome.write().await = WatchdogOutcome::AbortedByWatchdog;
            return;
        }
    }
}

/// Operator-consented "isolate everything we've ever seen" escape hatch
/// (`wrapper.py:214-232`'s `input("Perform full isolation of all seen PIDs?
/// [y/N]: ")` gate). Not part of the automatic containment path: the
/// Orchestrator calls this only after `hidden_failures` is non-empty and an
/// operator has explicitly consented, never on its own initiative. Attempts
/// to resolve each PID's process group and deliver SIGTERM to it, matching
/// the original's isolation loop; PIDs that can't be resolved or signaled
/// are returned so the caller can log them and decide what to do next.
pub fn emergency_sweep(seen_pids: &HashSet<i64>) -> Vec<(i64, std::io::Error)> {
    let mut failures = Vec::new();
    for &pid in seen_pids {
        let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
        if pgid < 0 {
            failures.push((pid, std::io::Error::last_os_error()));
            continue;
        }
        let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                failures.push((pid, err));
                continue;
            }
        }
        info!("[CONTAINMENT] emergency sweep: isolated pgid {} (pid {})", pgid, pid);
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn fake_v2_handle() -> (tempfile::TempDir, CgroupHandle) {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        tokio::fs::write(path.join("cgroup.procs"), "").await.unwrap();
        (dir, CgroupHandle::V2 { path })
    }

    #[tokio::test]
    async fn terminate_on_empty_cgroup_is_a_noop() {
        let (_dir, handle) = fake_v2_handle().await;
        assert!(terminate(&handle).await.is_ok());
        assert!(terminate(&handle).await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_removes_the_directory() {
        let (dir, handle) = fake_v2_handle().await;
        let path = dir.path().to_path_buf();
        cleanup(&handle).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn procs_parses_newline_separated_pids() {
        let (_dir, handle) = fake_v2_handle().await;
        if let CgroupHandle::V2 { path } = &handle {
            tokio::fs::write(path.join("cgroup.procs"), "100\n200\n300\n").await.unwrap();
        }
        let pids = handle.procs().await.unwrap();
        assert_eq!(pids, vec![100, 200, 300]);
    }

    #[test]
    fn emergency_sweep_over_an_empty_set_reports_no_failures() {
        assert!(emergency_sweep(&HashSet::new()).is_empty());
    }

    #[test]
    fn emergency_sweep_reports_unresolvable_pids_as_failures() {
        // A PID this unlikely to be alive makes getpgid fail with ESRCH,
        // exercising the failure-collection path without signaling a real
        // process.
        let seen: HashSet<i64> = [i32::MAX as i64].into_iter().collect();
        let failures = emergency_sweep(&seen);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, i32::MAX as i64);
    }

    #[tokio::test]
    async fn current_pids_reads_the_counter_file() {
        let (_dir, handle) = fake_v2_handle().await;
        if let CgroupHandle::V2 { path } = &handle {
            tokio::fs::write(path.join("pids.current"), "7\n").await.unwrap();
        }
        assert_eq!(handle.current_pids().await, Some(7));
    }
}
