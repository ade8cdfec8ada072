mod config;
mod containment;
mod detectors;
mod errors;
mod events;
mod orchestrator;
mod router;
mod sink;
mod state_store;
mod verdict;


use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use crate::config::EngineConfig;
use crate::detectors::Detector;
use crate::orchestrator::Orchestrator;
use crate::router::Router;
use crate::sink::ReportSink;

fn build_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(detectors::access_control::AccessControl::new()),
        Arc::new(detectors::command_injection::CommandInjection::new()),
        Arc::new(detectors::fileless_execution::FilelessExecution::new()),
        Arc::new(detectors::fork_bomb::ForkBomb::new()),
        Arc::new(detectors::information_leak::InformationLeak::new()),
        Arc::new(detectors::memory_corruption::MemoryCorruption::new()),
        Arc::new(detectors::race_condition::RaceCondition::new()),
        Arc::new(detectors::reverse_shell::ReverseShell::new()),
        Arc::new(detectors::abnormal_signal::AbnormalSignal::new()),
        Arc::new(detectors::reconnaissance::Reconnaissance::new()),
    ]
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cfg = EngineConfig::parse();

    let mut targets = match std::fs::read_dir(&cfg.targets_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect::<Vec<_>>(),
        Err(e) => {
            error!("[MAIN] cannot read targets directory {}: {}", cfg.targets_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };
    targets.sort();

    let router = Arc::new(Router::new(build_detectors()));
    let mut sink = ReportSink::stdout_only();

    for target in &targets {
        info!("[MAIN] running target {}", target.display());
        router.reset_all();
        let emulator_command = orchestrator::emulator_command_for(target);
        let mut session = Orchestrator::new(&cfg, Arc::clone(&router), &mut sink, emulator_command);
        match session.run_target(target).await {
            Ok(outcome) => {
                info!("[MAIN] target {} finished in state {:?}", target.display(), outcome.state);
            }
            Err(e) => {
                error!("[MAIN] target {} aborted: {}", target.display(), e);
                if matches!(e, errors::SentinelError::SandboxAcquisitionFailure(_)) && cfg.require_cgroup {
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    info!("[MAIN] all targets processed, shutting down");
    ExitCode::SUCCESS
}
