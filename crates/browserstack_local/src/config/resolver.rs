//! Merge configuration sources into the BrowserStackLocal command line

use crate::config::args::convert_to_arg;
use crate::config::variables::{ConfigError, ConfigValue, Variables};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Environment variable holding the BrowserStack access key
pub const ACCESS_KEY_ENV_VAR: &str = "BROWSERSTACK_ACCESS_KEY";

/// Default executable name, looked up in `PATH`
pub const DEFAULT_BINARY: &str = "BrowserStackLocal";

/// Flag carrying the access key
const KEY_FLAG: &str = "--key";

/// Source of environment variables
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A `key=value` (or bare `key`) argument given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgument {
    pub key: String,
    pub value: Option<String>,
}

impl CliArgument {
    /// Parse `key=value` or `key`; the value may itself contain `=`
    pub fn parse(s: &str) -> Self {
        match s.split_once('=') {
            Some((key, value)) => Self {
                key: key.to_string(),
                value: Some(value.to_string()),
            },
            None => Self {
                key: s.to_string(),
                value: None,
            },
        }
    }
}

impl std::str::FromStr for CliArgument {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Fully resolved BrowserStackLocal invocation: program path followed by flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCommand {
    tokens: Vec<String>,
}

impl TunnelCommand {
    /// Create a command from raw tokens; the first token is the program
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        let mut tokens = vec![program.into()];
        tokens.extend(args);
        Self { tokens }
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the command asks BrowserStackLocal to detach (`--daemon start`)
    pub fn is_daemon(&self) -> bool {
        self.args()
            .windows(2)
            .any(|pair| pair[0] == "--daemon" && pair[1] == "start")
    }

    /// Build a process command for this invocation
    pub fn to_process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(self.program());
        cmd.args(self.args());
        cmd
    }
}

/// Shell-like rendering with the access key masked
impl fmt::Display for TunnelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mask_next = false;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if mask_next {
                write!(f, "********")?;
            } else {
                write!(f, "{}", token)?;
            }
            mask_next = token == KEY_FLAG;
        }
        Ok(())
    }
}

/// Normalize an option name, rejecting names with nothing left after the dashes
fn normalize_key(key: &str) -> Result<String, ConfigError> {
    if key.trim_start_matches('-').is_empty() {
        return Err(ConfigError::EmptyKey(key.to_string()));
    }
    Ok(convert_to_arg(key))
}

/// Resolve the BrowserStackLocal command line.
///
/// Sources are applied as three overwrite passes: variables, then the access
/// key from the environment, then command-line arguments. A key keeps the
/// position where it was first seen and takes the value of the last source
/// that set it.
pub fn resolve(
    binary_path: &str,
    variables: &Variables,
    cli_args: &[CliArgument],
    env: &impl EnvSource,
) -> Result<TunnelCommand, ConfigError> {
    let mut options: IndexMap<String, Option<String>> = IndexMap::new();

    for (key, value) in variables.iter() {
        let value = match value {
            // `false` means the option was not given at all
            Some(ConfigValue::Bool(false)) => continue,
            Some(ConfigValue::Bool(true)) | None => None,
            Some(other) => Some(other.as_str()),
        };
        options.insert(normalize_key(key)?, value);
    }

    if let Some(access_key) = env.var(ACCESS_KEY_ENV_VAR) {
        options.insert(KEY_FLAG.to_string(), Some(access_key));
    }

    for arg in cli_args {
        options.insert(normalize_key(&arg.key)?, arg.value.clone());
    }

    let mut args = Vec::with_capacity(options.len() * 2);
    for (flag, value) in options {
        args.push(flag);
        if let Some(value) = value {
            args.push(value);
        }
    }

    Ok(TunnelCommand::new(binary_path, args))
}
