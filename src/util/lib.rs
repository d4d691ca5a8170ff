//! Process-level utilities: logging, signal handling, exit codes

use std::sync::{atomic::AtomicBool, Arc};

use crate::config::util::UtilOpt;

/// Start the [stderrlog] instance at the configured verbosity
pub fn init_error_logger(cfg: &impl UtilOpt) {
    stderrlog::new()
        .module("alpidesim")
        .verbosity(cfg.verbosity() as usize)
        .init()
        .expect("Failed to initialize logger");
}

/// Initializes the Ctrl+C handler to facilitate graceful shutdown
///
/// Also handles SIGTERM and SIGHUP as the `termination` feature is enabled
pub fn init_ctrlc_handler(stop_flag: Arc<AtomicBool>) {
    ctrlc::set_handler({
        let mut stop_sig_count = 0;
        move || {
            log::warn!("Stop signal received, stopping gracefully, please wait...");
            stop_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            stop_sig_count += 1;
            if stop_sig_count > 1 {
                log::warn!("Second stop signal received, ungraceful shutdown.");
                std::process::exit(1);
            }
        }
    })
    .expect("Error setting Ctrl-C handler");
}

/// Exit the process with the appropriate exit code
pub fn exit(exit_code: u8, any_errors_flag: &AtomicBool) -> std::process::ExitCode {
    if exit_code == 0 {
        log::debug!("Exit successful from simulation");
        if any_errors_flag.load(std::sync::atomic::Ordering::Relaxed) {
            std::process::ExitCode::from(1)
        } else {
            std::process::ExitCode::SUCCESS
        }
    } else {
        std::process::ExitCode::from(exit_code)
    }
}
