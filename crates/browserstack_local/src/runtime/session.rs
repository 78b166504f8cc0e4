//! Test-session context owning the BrowserStackLocal process

use crate::config::TunnelCommand;
use crate::runtime::launcher::{
    stop_pid, DaemonInfo, LaunchError, Launcher, LauncherConfig, ProcessHandle,
};
use std::fmt;

/// What the session is currently supervising
#[derive(Debug)]
enum Supervised {
    None,
    Process(ProcessHandle),
    Daemon(DaemonInfo),
}

/// BrowserStackLocal state for the lifetime of one test session.
///
/// Launch failures are logged and leave the session without a process, so
/// tests can still run and inspect what happened. Whatever was started is
/// stopped exactly once, by [`TunnelSession::teardown`] or on drop.
pub struct TunnelSession {
    command: TunnelCommand,
    supervised: Supervised,
    error: Option<LaunchError>,
    launcher: Launcher,
}

impl TunnelSession {
    /// Start BrowserStackLocal, in daemon mode if the command asks for it
    pub fn start(command: TunnelCommand, config: &LauncherConfig) -> Self {
        let launcher = Launcher::new(config.clone());

        let result = if command.is_daemon() {
            launcher.start_daemon(&command).map(Supervised::Daemon)
        } else {
            launcher.start_foreground(&command).map(Supervised::Process)
        };

        let (supervised, error) = match result {
            Ok(supervised) => (supervised, None),
            Err(e) => {
                log::error!("Failed to start BrowserStackLocal: {}", e);
                (Supervised::None, Some(e))
            }
        };

        Self {
            command,
            supervised,
            error,
            launcher,
        }
    }

    /// The resolved command line
    pub fn command(&self) -> &TunnelCommand {
        &self.command
    }

    /// The foreground process, if one was started
    pub fn process(&self) -> Option<&ProcessHandle> {
        match &self.supervised {
            Supervised::Process(handle) => Some(handle),
            _ => None,
        }
    }

    /// The daemon status, if the daemon was started
    pub fn daemon(&self) -> Option<&DaemonInfo> {
        match &self.supervised {
            Supervised::Daemon(info) => Some(info),
            _ => None,
        }
    }

    /// Why the launch failed, if it did
    pub fn error(&self) -> Option<&LaunchError> {
        self.error.as_ref()
    }

    /// Whether BrowserStackLocal was started successfully
    pub fn is_running(&self) -> bool {
        !matches!(self.supervised, Supervised::None)
    }

    /// Stop whatever the session started
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.supervised, Supervised::None) {
            Supervised::None => {}
            Supervised::Process(mut handle) => {
                handle.stop(self.launcher.config().stop_timeout);
            }
            Supervised::Daemon(info) => stop_pid(info.pid),
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSession")
            .field("command", &self.command.to_string())
            .field("process", &self.process().map(ProcessHandle::pid))
            .field("daemon", &self.daemon())
            .field("error", &self.error.as_ref().map(ToString::to_string))
            .finish()
    }
}

/// Display a one-line session summary
impl fmt::Display for TunnelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.supervised {
            Supervised::Process(handle) => {
                write!(f, "BrowserStackLocal running (pid {})", handle.pid())
            }
            Supervised::Daemon(info) => write!(
                f,
                "BrowserStackLocal daemon {} (pid {}): {}",
                info.state, info.pid, info.message
            ),
            Supervised::None => match &self.error {
                Some(e) => write!(f, "BrowserStackLocal not running: {}", e),
                None => write!(f, "BrowserStackLocal not running"),
            },
        }
    }
}
