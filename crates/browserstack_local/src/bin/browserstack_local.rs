//! BrowserStackLocal session runner
//!
//! Usage:
//!   browserstack_local --browserstack-local -- cargo test
//!   browserstack_local --browserstack-local --variables vars.yaml -- cargo test
//!   browserstack_local --browserstack-local --browserstack-local-argument daemon=start -- npm test
//!   browserstack_local --browserstack-local-argument key=abc --dry-run

use browserstack_local::{ProcessEnv, SessionArgs, TunnelSession};
use std::sync::mpsc;

fn main() {
    let args: SessionArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    let command = match args.resolve_command(&ProcessEnv) {
        Ok(command) => command,
        Err(e) => {
            log::error!("Failed to resolve BrowserStackLocal command: {}", e);
            std::process::exit(1);
        }
    };

    let launcher_config = match args.launcher_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid launcher settings: {}", e);
            std::process::exit(1);
        }
    };

    // Dry run mode
    if args.dry_run {
        println!("{}", command);
        return;
    }

    // Ctrl+C reaches the whole process group; stay alive long enough to tear down
    let (interrupt_tx, interrupt_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = interrupt_tx.send(());
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let session = if args.browserstack_local {
        let session = TunnelSession::start(command, &launcher_config);
        log::info!("{}", session);
        Some(session)
    } else {
        log::debug!("BrowserStackLocal is disabled, running without tunnel");
        None
    };

    let code = match args.command.split_first() {
        Some((program, rest)) => run_test_command(program, rest),
        None => {
            if session.as_ref().is_some_and(TunnelSession::is_running) {
                log::info!("No test command given, press Ctrl+C to stop BrowserStackLocal");
                let _ = interrupt_rx.recv();
            }
            0
        }
    };

    if let Some(session) = session {
        session.teardown();
    }

    std::process::exit(code);
}

/// Run the wrapped test command and return its exit code
fn run_test_command(program: &str, args: &[String]) -> i32 {
    log::info!("Running: {} {}", program, args.join(" "));

    match std::process::Command::new(program).args(args).status() {
        Ok(status) => {
            log::info!("Test command exited with code: {:?}", status.code());
            status.code().unwrap_or(1)
        }
        Err(e) => {
            log::error!("Failed to run '{}': {}", program, e);
            127
        }
    }
}
