//! Logging init and sanitizing of untrusted values before they are logged.

use std::error::Error as StdError;

use tracing_subscriber::EnvFilter;

/// Longest untrusted value written to a log line, in characters.
pub const MAX_LOGGED_CHARS: usize = 256;

const DEFAULT_FILTER: &str = "info,url_guard=debug";

/// Initialize structured logging to stderr.
///
/// The filter comes from `RUST_LOG`, falling back to `info,url_guard=debug`.
/// Returns an error if a global subscriber is already installed, so
/// embedders that set up their own logging can ignore it.
pub fn init_logging() -> Result<(), Box<dyn StdError + Send + Sync + 'static>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
}

/// Make an attacker-controlled string safe to log.
///
/// Control characters (CR/LF included) are escaped and the result is cut
/// at [`MAX_LOGGED_CHARS`].
pub fn sanitize_for_log(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_LOGGED_CHARS));

    for (count, c) in value.chars().enumerate() {
        if count == MAX_LOGGED_CHARS {
            out.push_str("...");
            break;
        }
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passes_plain_text() {
        assert_eq!(
            sanitize_for_log("http://example.com/a?b=c"),
            "http://example.com/a?b=c"
        );
    }

    #[test]
    fn test_sanitize_escapes_line_breaks() {
        let out = sanitize_for_log("http://a/\r\nX-Injected: 1");
        assert!(!out.contains('\n'));
        assert!(!out.contains('\r'));
        assert!(out.contains("\\r\\n"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(MAX_LOGGED_CHARS * 4);
        let out = sanitize_for_log(&long);
        assert_eq!(out.len(), MAX_LOGGED_CHARS + 3);
        assert!(out.ends_with("..."));

        let exact = "b".repeat(MAX_LOGGED_CHARS);
        assert_eq!(sanitize_for_log(&exact), exact);
    }

    #[test]
    fn test_init_logging_twice_fails_second_time() {
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
