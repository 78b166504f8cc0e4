//! Command-line interface for browserstack_local

use crate::config::{
    resolve, CliArgument, ConfigError, EnvSource, TunnelCommand, Variables, DEFAULT_BINARY,
};
use crate::runtime::LauncherConfig;
use argh::FromArgs;
use std::time::Duration;

/// Run BrowserStackLocal in the background while a test command is running
#[derive(FromArgs, Debug)]
pub struct SessionArgs {
    /// run BrowserStackLocal while the test session is running
    #[argh(switch)]
    pub browserstack_local: bool,

    /// path to the BrowserStackLocal binary (default: BrowserStackLocal)
    #[argh(option, default = "String::from(DEFAULT_BINARY)")]
    pub browserstack_local_path: String,

    /// argument passed to BrowserStackLocal (format: key=value or key), can be repeated
    #[argh(option)]
    pub browserstack_local_argument: Vec<CliArgument>,

    /// variables file (YAML or JSON) with a BrowserStackLocal section, can be repeated
    #[argh(option)]
    pub variables: Vec<String>,

    /// seconds to wait for the tunnel to become ready (default: 10)
    #[argh(option, default = "10")]
    pub timeout: u64,

    /// milliseconds between two checks of the tunnel output (default: 1000)
    #[argh(option, default = "1000")]
    pub poll_interval_ms: u64,

    /// print the resolved BrowserStackLocal command and exit
    #[argh(switch)]
    pub dry_run: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    /// test command to run while the tunnel is up
    #[argh(positional, greedy)]
    pub command: Vec<String>,
}

impl SessionArgs {
    /// Launcher settings from the timing options
    pub fn launcher_config(&self) -> Result<LauncherConfig, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidArgument(
                "--poll-interval-ms must be greater than zero".to_string(),
            ));
        }

        Ok(LauncherConfig {
            timeout: Duration::from_secs(self.timeout),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..Default::default()
        })
    }

    /// Load the variables files and resolve the BrowserStackLocal command
    pub fn resolve_command(&self, env: &impl EnvSource) -> Result<TunnelCommand, ConfigError> {
        let variables = Variables::from_files(&self.variables)?;
        resolve(
            &self.browserstack_local_path,
            &variables,
            &self.browserstack_local_argument,
            env,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ACCESS_KEY_ENV_VAR;
    use std::collections::HashMap;

    fn parse(args: &[&str]) -> SessionArgs {
        SessionArgs::from_args(&["browserstack_local"], args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(!args.browserstack_local);
        assert_eq!(args.browserstack_local_path, "BrowserStackLocal");
        assert!(args.browserstack_local_argument.is_empty());
        let config = args.launcher_config().unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_repeated_arguments() {
        let args = parse(&[
            "--browserstack-local",
            "--browserstack-local-argument",
            "key=123",
            "--browserstack-local-argument",
            "onlyAutomate",
        ]);

        assert!(args.browserstack_local);
        assert_eq!(
            args.browserstack_local_argument,
            vec![
                CliArgument {
                    key: "key".to_string(),
                    value: Some("123".to_string())
                },
                CliArgument {
                    key: "onlyAutomate".to_string(),
                    value: None
                },
            ]
        );
    }

    #[test]
    fn test_trailing_command() {
        let args = parse(&["--browserstack-local", "--", "cargo", "test", "--release"]);
        assert_eq!(args.command, vec!["cargo", "test", "--release"]);
    }

    #[test]
    fn test_resolve_command_with_variables_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("variables.json");
        std::fs::write(&path, r#"{"BrowserStackLocal": {"key": "333", "forceLocal": true}}"#)
            .unwrap();
        let path = path.to_string_lossy().into_owned();

        let args = parse(&[
            "--variables",
            &path,
            "--browserstack-local-argument",
            "daemon=start",
        ]);
        let env: HashMap<String, String> =
            [(ACCESS_KEY_ENV_VAR.to_string(), "555".to_string())].into_iter().collect();

        let cmd = args.resolve_command(&env).unwrap();
        assert_eq!(
            cmd.tokens(),
            ["BrowserStackLocal", "--key", "555", "--force-local", "--daemon", "start"]
        );
        assert!(cmd.is_daemon());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let args = parse(&["--poll-interval-ms", "0"]);
        assert!(matches!(args.launcher_config(), Err(ConfigError::InvalidArgument(_))));

        // Timing options do not affect command resolution
        let cmd = args.resolve_command(&HashMap::<String, String>::new()).unwrap();
        assert_eq!(cmd.tokens(), ["BrowserStackLocal"]);
    }
}
