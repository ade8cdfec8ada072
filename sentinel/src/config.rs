//! CLI surface and engine configuration (§6). `.env` values (loaded via
//! `dotenv`, the teacher's convention for env-based overrides) are read
//! before arg parsing so that a deployment can pin defaults without editing
//! the invocation; explicit flags still win.

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_MEMORY_LIMIT: &str = "2G";
const DEFAULT_CPU_QUOTA_MICROS: u64 = 200_000;
const DEFAULT_PIDS_MAX: u64 = 1000;
const DEFAULT_WATCHDOG_PIDS_MAX: u64 = 500;
const DEFAULT_FORK_MAX: u64 = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Parser, Debug, Clone)]
#[command(name = "sentinel", about = "Runtime detection and containment engine")]
pub struct Cli {
    /// Directory containing target binaries to run under emulation.
    pub targets_dir: PathBuf,

    /// Require cgroup-based containment; fail the session if unavailable.
    #[arg(long)]
    pub cgroup: bool,

    /// e.g. "2G", "512M".
    #[arg(long, default_value = DEFAULT_MEMORY_LIMIT)]
    pub memory_limit: String,

    /// CPU quota in microseconds per `cpu.max` period (period fixed at 100000µs).
    #[arg(long, default_value_t = DEFAULT_CPU_QUOTA_MICROS)]
    pub cpu_quota: u64,

    /// Hard cap written into the cgroup's `pids.max` at enrollment time.
    #[arg(long, default_value_t = DEFAULT_PIDS_MAX)]
    pub pids_max: u64,

    /// Soft trip point the watchdog polls `pids.current` against every 5s;
    /// distinct from `--pids-max`, the kernel-enforced hard cap.
    #[arg(long, default_value_t = DEFAULT_WATCHDOG_PIDS_MAX)]
    pub watchdog_pids_max: u64,

    #[arg(long, default_value_t = DEFAULT_FORK_MAX)]
    pub fork_max: u64,

    /// Per-target wall-clock timeout, seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

/// Resolved engine configuration, derived from [`Cli`] plus any `.env`
/// overrides `dotenv` pulled into the process environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub targets_dir: PathBuf,
    pub require_cgroup: bool,
    pub memory_limit: String,
    pub cpu_quota_micros: u64,
    pub pids_max: u64,
    pub watchdog_pids_max: u64,
    pub fork_max: u64,
    pub session_timeout_secs: u64,
}

impl EngineConfig {
    pub fn parse() -> Self {
        dotenv::dotenv().ok();
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Self {
        Self {
            targets_dir: cli.targets_dir,
            require_cgroup: cli.cgroup,
            memory_limit: cli.memory_limit,
            cpu_quota_micros: cli.cpu_quota,
            pids_max: cli.pids_max,
            watchdog_pids_max: cli.watchdog_pids_max,
            fork_max: cli.fork_max,
            session_timeout_secs: cli.timeout,
        }
    }
}

/// Parses a human memory size (`"2G"`, `"512M"`, `"1024K"`, or a bare byte
/// count) into bytes, for `memory.max` / `memory.limit_in_bytes`.
pub fn parse_memory_limit(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let (digits, multiplier) = match input.chars().last() {
        Some('G') | Some('g') => (&input[..input.len() - 1], 1024 * 1024 * 1024),
        Some('M') | Some('m') => (&input[..input.len() - 1], 1024 * 1024),
        Some('K') | Some('k') => (&input[..input.len() - 1], 1024),
        Some(_) => (input, 1),
        None => return Err("empty memory limit".to_string()),
    };
    let value: u64 = digits.parse().map_err(|_| format!("invalid memory limit: {}", input))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gigabyte_suffix() {
        assert_eq!(parse_memory_limit("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parses_megabyte_suffix() {
        assert_eq!(parse_memory_limit("512M").unwrap(), 512 * 1024 * 1024);
    }

    #[test]
    fn parses_bare_byte_count() {
        assert_eq!(parse_memory_limit("4096").unwrap(), 4096);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_memory_limit("not-a-size").is_err());
    }
}
