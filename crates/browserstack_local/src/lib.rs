//! BrowserStackLocal supervision for test sessions
//!
//! Runs the BrowserStackLocal tunnel binary next to a test session:
//! - Resolve the tunnel command line from a variables file, the
//!   `BROWSERSTACK_ACCESS_KEY` environment variable and `key=value` arguments
//! - Start the tunnel in the foreground and wait until it reports readiness,
//!   or start it as a daemon and read its JSON status
//! - Stop it again when the session ends
//!
//! # Example Variables File
//!
//! ```yaml
//! BrowserStackLocal:
//!   key: "abc123"
//!   localIdentifier: "ci-build"
//!   onlyAutomate: true
//!   forceLocal: false
//! ```
//!
//! resolves to `BrowserStackLocal --key abc123 --local-identifier ci-build --only-automate`.

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::SessionArgs;
pub use config::{
    convert_camelcase, convert_to_arg, resolve, CliArgument, ConfigError, ConfigValue, EnvSource,
    ProcessEnv, TunnelCommand, Variables, ACCESS_KEY_ENV_VAR, DEFAULT_BINARY, VARIABLES_SECTION,
};
pub use runtime::{
    parse_daemon_output, stop_pid, DaemonInfo, LaunchError, Launcher, LauncherConfig,
    ProcessHandle, TunnelSession, ERROR_MARKER, READY_MESSAGE,
};
