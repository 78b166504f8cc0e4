//! Test helpers: fake BrowserStackLocal binaries backed by shell scripts

#![allow(dead_code)]

use browserstack_local::{LauncherConfig, TunnelCommand, READY_MESSAGE};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A shell script standing in for BrowserStackLocal.
///
/// The script is run through `/bin/sh` and records its own pid in a pid file
/// before running the given body.
pub struct FakeTunnel {
    dir: TempDir,
    script: PathBuf,
}

impl FakeTunnel {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let script = dir.path().join("BrowserStackLocal");
        let pid_file = dir.path().join("pid");
        let content = format!("echo $$ > '{}'\n{}\n", pid_file.display(), body);
        std::fs::write(&script, content).expect("write fake binary");
        Self { dir, script }
    }

    /// Prints the ready message, then stays up
    pub fn ready() -> Self {
        Self::new(&format!(
            "echo 'BrowserStackLocal v8.0'\necho '{}'\nexec sleep 30",
            READY_MESSAGE
        ))
    }

    /// Prints an error line, then stays up
    pub fn failing(message: &str) -> Self {
        Self::new(&format!(
            "echo 'Starting'\necho '*** Error: {}'\nexec sleep 30",
            message
        ))
    }

    /// Never becomes ready
    pub fn hanging() -> Self {
        Self::new("echo 'Connecting...'\nexec sleep 30")
    }

    /// Command running the script with extra BrowserStackLocal arguments
    pub fn command(&self, args: &[&str]) -> TunnelCommand {
        let mut tokens = vec![self.script.to_string_lossy().into_owned()];
        tokens.extend(args.iter().map(|a| a.to_string()));
        TunnelCommand::new("/bin/sh", tokens)
    }

    /// Pid recorded by the script, once it has started
    pub fn pid(&self) -> Option<i32> {
        std::fs::read_to_string(self.dir.path().join("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Short timings so failing launches do not slow the suite down
pub fn fast_config() -> LauncherConfig {
    LauncherConfig {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
    }
}

/// Whether a process with this pid can still be signalled
pub fn process_exists(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), None).is_ok()
}

/// Wait until the process is gone, up to `timeout`
pub fn wait_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    !process_exists(pid)
}
