//! BrowserStackLocal process launcher

use crate::config::TunnelCommand;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Line printed by BrowserStackLocal once the tunnel is established
pub const READY_MESSAGE: &str = "You can now access your local server(s) in our remote browser.";

/// Marker preceding the error text in BrowserStackLocal output
pub const ERROR_MARKER: &str = "*** Error: ";

/// Process name used in log lines
const LOG_NAME: &str = "BrowserStackLocal";

/// Granularity of the exit wait while stopping a process
const REAP_INTERVAL: Duration = Duration::from_millis(50);

/// Launcher configuration
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// How long to wait for the tunnel to become ready
    pub timeout: Duration,
    /// Delay between two checks of the process output
    pub poll_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL when stopping
    pub stop_timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Response printed by BrowserStackLocal when started with `--daemon start`.
///
/// ```json
/// {"state": "connected", "pid": 35246, "message": "Connected"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub state: String,
    pub pid: u32,
    #[serde(default)]
    pub message: String,
}

impl DaemonInfo {
    pub fn is_connected(&self) -> bool {
        self.state == "connected"
    }
}

/// A running foreground BrowserStackLocal process
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the process (SIGTERM, then SIGKILL after `grace`).
    ///
    /// Stopping an already stopped handle does nothing, and a process that
    /// is already gone is not an error.
    pub fn stop(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        log::info!("[{}] Terminating process {}...", LOG_NAME, self.pid);

        #[cfg(unix)]
        send_sigterm(self.pid);

        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }

        match wait_timeout(&mut child, grace, REAP_INTERVAL) {
            Ok(Some(status)) => {
                log::info!("[{}] Process exited with code: {:?}", LOG_NAME, status.code());
            }
            Ok(None) => {
                log::warn!("[{}] Process did not exit gracefully, forcing kill", LOG_NAME);
                if let Err(e) = child.kill() {
                    log::debug!("[{}] Kill of {} failed: {}", LOG_NAME, self.pid, e);
                }
                if let Err(e) = child.wait() {
                    log::debug!("[{}] Error waiting for process: {}", LOG_NAME, e);
                }
            }
            Err(e) => {
                log::debug!("[{}] Error waiting for process: {}", LOG_NAME, e);
            }
        }
    }

    /// Wait for a process whose output has ended, stopping it if it lingers
    fn reap(&mut self, grace: Duration) -> Option<i32> {
        let child = self.child.as_mut()?;
        match wait_timeout(child, grace, REAP_INTERVAL) {
            Ok(Some(status)) => {
                self.child = None;
                status.code()
            }
            _ => {
                self.stop(grace);
                None
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop(REAP_INTERVAL);
    }
}

/// Classification of a single output line
#[derive(Debug, PartialEq, Eq)]
enum OutputLine {
    Ready,
    Error(String),
    Other,
}

fn classify(line: &str) -> OutputLine {
    if let Some(idx) = line.find(ERROR_MARKER) {
        return OutputLine::Error(line[idx + ERROR_MARKER.len()..].trim().to_string());
    }
    if line == READY_MESSAGE {
        return OutputLine::Ready;
    }
    OutputLine::Other
}

/// Starts and stops BrowserStackLocal
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Start BrowserStackLocal in the foreground and wait until it is ready.
    ///
    /// Standard output is polled until the ready message or an error line
    /// shows up. On error, early exit or timeout the process is terminated.
    pub fn start_foreground(&self, command: &TunnelCommand) -> Result<ProcessHandle, LaunchError> {
        log::info!("[{}] Starting process: {}", LOG_NAME, command);

        let mut child = command
            .to_process()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed {
                program: command.program().to_string(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let mut handle = ProcessHandle::new(child);
        let lines = match stdout.map(spawn_line_reader) {
            Some(Ok(rx)) => rx,
            Some(Err(e)) => {
                handle.stop(self.config.stop_timeout);
                return Err(LaunchError::Io(e));
            }
            None => {
                handle.stop(self.config.stop_timeout);
                return Err(LaunchError::Io(std::io::Error::other("stdout was not captured")));
            }
        };

        let started = Instant::now();
        let deadline = started + self.config.timeout;

        loop {
            loop {
                match lines.try_recv() {
                    Ok(line) => match classify(&line) {
                        OutputLine::Ready => {
                            log::info!(
                                "[{}] Ready after {:.1?} (pid {})",
                                LOG_NAME,
                                started.elapsed(),
                                handle.pid()
                            );
                            return Ok(handle);
                        }
                        OutputLine::Error(message) => {
                            log::error!("[{}] Error: {}", LOG_NAME, message);
                            handle.stop(self.config.stop_timeout);
                            return Err(LaunchError::Reported(message));
                        }
                        OutputLine::Other => {}
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        let code = handle.reap(self.config.stop_timeout);
                        log::error!(
                            "[{}] Process exited before becoming ready (code: {:?})",
                            LOG_NAME,
                            code
                        );
                        return Err(LaunchError::Exited { code });
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "[{}] Timeout ({} sec), terminating the process",
                    LOG_NAME,
                    self.config.timeout.as_secs_f32()
                );
                handle.stop(self.config.stop_timeout);
                return Err(LaunchError::Timeout(self.config.timeout));
            }

            log::debug!("[{}] Waiting for tunnel...", LOG_NAME);
            thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }

    /// Start BrowserStackLocal with `--daemon start` and parse its JSON response.
    ///
    /// The command is expected to exit on its own once the background tunnel
    /// has been set up. Both output streams are drained while waiting, and
    /// the wait for exit and end of output shares one deadline.
    pub fn start_daemon(&self, command: &TunnelCommand) -> Result<DaemonInfo, LaunchError> {
        log::info!("[{}] Starting daemon: {}", LOG_NAME, command);

        let mut child = command
            .to_process()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed {
                program: command.program().to_string(),
                source: e,
            })?;

        let deadline = Instant::now() + self.config.timeout;

        let readers = spawn_output_reader(child.stdout.take(), "browserstack-local-stdout")
            .and_then(|stdout| {
                let stderr = spawn_output_reader(child.stderr.take(), "browserstack-local-stderr")?;
                Ok((stdout, stderr))
            });
        let (stdout, stderr) = match readers {
            Ok(readers) => readers,
            Err(e) => {
                ProcessHandle::new(child).stop(self.config.stop_timeout);
                return Err(LaunchError::Io(e));
            }
        };

        match wait_timeout(&mut child, self.config.timeout, self.config.poll_interval) {
            Ok(Some(status)) => {
                log::debug!("[{}] Daemon command exited with code: {:?}", LOG_NAME, status.code());
            }
            Ok(None) => {
                log::error!(
                    "[{}] Error: timeout ({} sec)",
                    LOG_NAME,
                    self.config.timeout.as_secs_f32()
                );
                ProcessHandle::new(child).stop(self.config.stop_timeout);
                return Err(LaunchError::Timeout(self.config.timeout));
            }
            Err(e) => {
                ProcessHandle::new(child).stop(self.config.stop_timeout);
                return Err(LaunchError::Io(e));
            }
        }

        let stdout = self.collect_output(&stdout, deadline)?;
        let stderr = self.collect_output(&stderr, deadline)?;

        parse_daemon_output(&stdout, &stderr)
    }

    /// Wait for a reader spawned by [`spawn_output_reader`] to reach end of output
    fn collect_output(
        &self,
        output: &mpsc::Receiver<std::io::Result<Vec<u8>>>,
        deadline: Instant,
    ) -> Result<String, LaunchError> {
        match output.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Ok(buf)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Ok(Err(e)) => Err(LaunchError::Io(e)),
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "[{}] Error: timeout ({} sec), output still open after the command exited",
                    LOG_NAME,
                    self.config.timeout.as_secs_f32()
                );
                Err(LaunchError::Timeout(self.config.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(LaunchError::Io(std::io::Error::other(
                "output reader stopped unexpectedly",
            ))),
        }
    }
}

/// Interpret the output of a `--daemon start` invocation.
///
/// Anything on stderr is an error reported by BrowserStackLocal; otherwise
/// stdout must hold the JSON status object.
pub fn parse_daemon_output(stdout: &str, stderr: &str) -> Result<DaemonInfo, LaunchError> {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        log::error!("[{}] Error: {}", LOG_NAME, stderr);
        return Err(LaunchError::Reported(stderr.to_string()));
    }

    let stdout = stdout.trim();
    let info: DaemonInfo =
        serde_json::from_str(stdout).map_err(|e| LaunchError::MalformedDaemonResponse {
            output: stdout.to_string(),
            source: e,
        })?;

    log::info!("[{}] Success: {}", LOG_NAME, stdout);
    Ok(info)
}

/// Send SIGTERM to a process the launcher does not own (e.g. a daemon).
///
/// Failures are logged and otherwise ignored.
pub fn stop_pid(pid: u32) {
    #[cfg(unix)]
    {
        log::info!("[{}] Terminating process {}...", LOG_NAME, pid);
        send_sigterm(pid);
    }

    #[cfg(not(unix))]
    {
        log::warn!(
            "[{}] Cannot signal process {} on this platform",
            LOG_NAME,
            pid
        );
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // pid 0 and negative values address process groups
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if raw <= 0 {
        return;
    }

    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        log::debug!("[{}] SIGTERM to {} failed: {}", LOG_NAME, pid, e);
    }
}

/// Poll `try_wait` until the child exits or `timeout` elapses
fn wait_timeout(
    child: &mut Child,
    timeout: Duration,
    interval: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(interval.min(deadline - now));
    }
}

/// Forward stdout lines over a channel.
///
/// The reader keeps draining after the receiver is dropped so the process
/// never blocks on a full pipe.
fn spawn_line_reader(stdout: ChildStdout) -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("browserstack-local-stdout".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(|c| c == '\n' || c == '\r')
                            .to_string();
                        log::debug!("[{}] {}", LOG_NAME, line);
                        let _ = tx.send(line);
                    }
                    Err(e) => {
                        log::debug!("[{}] Error reading output: {}", LOG_NAME, e);
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}

/// Read a whole output stream on its own thread.
///
/// The buffer is sent once the stream reaches end of file. A missing stream
/// reads as empty.
fn spawn_output_reader<R: Read + Send + 'static>(
    stream: Option<R>,
    name: &str,
) -> std::io::Result<mpsc::Receiver<std::io::Result<Vec<u8>>>> {
    let (tx, rx) = mpsc::channel();

    let Some(mut stream) = stream else {
        let _ = tx.send(Ok(Vec::new()));
        return Ok(rx);
    };

    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut buf = Vec::new();
        let result = stream.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    })?;

    Ok(rx)
}

/// Errors that can occur while launching BrowserStackLocal
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout ({0:?}) waiting for BrowserStackLocal")]
    Timeout(Duration),

    #[error("BrowserStackLocal error: {0}")]
    Reported(String),

    #[error("BrowserStackLocal exited before becoming ready (code: {code:?})")]
    Exited { code: Option<i32> },

    #[error("Malformed daemon response '{output}': {source}")]
    MalformedDaemonResponse {
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ready() {
        assert_eq!(classify(READY_MESSAGE), OutputLine::Ready);
        assert_eq!(classify(&format!("  {}", READY_MESSAGE)), OutputLine::Other);
    }

    #[test]
    fn test_classify_error() {
        let line = "Tue Jan 01 2019 *** Error: Either another browserstack local client is running";
        assert_eq!(
            classify(line),
            OutputLine::Error("Either another browserstack local client is running".to_string())
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(classify("BrowserStackLocal v7.0"), OutputLine::Other);
        assert_eq!(classify(""), OutputLine::Other);
    }

    #[test]
    fn test_parse_daemon_output() {
        let info = parse_daemon_output(
            r#"{"state": "connected", "pid": 35246, "message": "Connected"}"#,
            "",
        )
        .unwrap();

        assert_eq!(info.pid, 35246);
        assert!(info.is_connected());
        assert_eq!(info.message, "Connected");
    }

    #[test]
    fn test_parse_daemon_output_stderr_wins() {
        let result = parse_daemon_output(r#"{"state": "connected", "pid": 1}"#, "Invalid key\n");
        assert!(matches!(result, Err(LaunchError::Reported(msg)) if msg == "Invalid key"));
    }

    #[test]
    fn test_parse_daemon_output_malformed() {
        let result = parse_daemon_output("not json", "");
        assert!(matches!(
            result,
            Err(LaunchError::MalformedDaemonResponse { ref output, .. }) if output == "not json"
        ));

        let result = parse_daemon_output("", "");
        assert!(matches!(result, Err(LaunchError::MalformedDaemonResponse { .. })));
    }

    #[test]
    fn test_output_reader_reads_to_end() {
        let rx = spawn_output_reader(Some(std::io::Cursor::new(b"line 1\nline 2".to_vec())), "test")
            .unwrap();
        assert_eq!(rx.recv().unwrap().unwrap(), b"line 1\nline 2");

        let rx = spawn_output_reader(None::<std::io::Empty>, "test").unwrap();
        assert!(rx.recv().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_collect_output_past_deadline() {
        let launcher = Launcher::new(LauncherConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        });
        // Sender kept alive, as when a detached process still holds the pipe
        let (_tx, rx) = mpsc::channel();

        let started = Instant::now();
        let result = launcher.collect_output(&rx, Instant::now() + Duration::from_millis(100));

        assert!(matches!(result, Err(LaunchError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_default_config() {
        let config = LauncherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }
}
