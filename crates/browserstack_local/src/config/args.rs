//! Conversion of user-facing option names into BrowserStackLocal flags

use regex::Regex;
use std::sync::LazyLock;

/// A capitalized word preceded by any character: `xRequest` -> `x-Request`
static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());

/// A lowercase letter or digit followed by an uppercase letter: `yH` -> `y-H`
static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

/// Convert a camel-case name into lowercase dashed form.
///
/// - `ABC` -> `abc`
/// - `abcDef` -> `abc-def`
/// - `abcXDef` -> `abc-x-def`
/// - `ProxyHTTPRequest` -> `proxy-http-request`
pub fn convert_camelcase(s: &str) -> String {
    let s = CAPITALIZED_WORD.replace_all(s, "${1}-${2}");
    LOWER_UPPER.replace_all(&s, "${1}-${2}").to_lowercase()
}

/// Convert an option name into a command-line flag.
///
/// Leading dashes are ignored, single-character names become short flags and
/// everything else becomes a dashed long flag:
///
/// - `x`, `-x`, `--x` -> `-x`
/// - `abc`, `-abc` -> `--abc`
/// - `abcDef`, `--abcDef`, `abc-def` -> `--abc-def`
pub fn convert_to_arg(s: &str) -> String {
    let name = s.trim_start_matches('-');

    if name.chars().count() == 1 {
        format!("-{}", name)
    } else {
        format!("--{}", convert_camelcase(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_camelcase() {
        let cases = [
            ("a", "a"),
            ("abc", "abc"),
            ("abc-def", "abc-def"),
            ("localIdentifier", "local-identifier"),
            ("HTTP", "http"),
            ("ProxyHTTPRequest", "proxy-http-request"),
            ("abcXDef", "abc-x-def"),
        ];

        for (input, expected) in cases {
            assert_eq!(convert_camelcase(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_convert_to_arg() {
        let cases = [
            ("a", "-a"),
            ("-a", "-a"),
            ("--a", "-a"),
            ("abc", "--abc"),
            ("-abc", "--abc"),
            ("--abc", "--abc"),
            ("abc-def", "--abc-def"),
            ("--abc-def", "--abc-def"),
            ("--abcDef", "--abc-def"),
            ("localIdentifier", "--local-identifier"),
            ("HTTP", "--http"),
            ("ProxyHTTPRequest", "--proxy-http-request"),
        ];

        for (input, expected) in cases {
            assert_eq!(convert_to_arg(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_convert_to_arg_is_idempotent() {
        for key in ["a", "onlyAutomate", "HTTP", "proxy-host", "forceLocal", "v"] {
            let once = convert_to_arg(key);
            assert_eq!(convert_to_arg(&once), once);
        }
    }
}
