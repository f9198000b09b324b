//! Structured logger
//!
//! - One log line = one event
//! - Explicit severity levels
//! - Fields rendered in deterministic (sorted) key order
//!
//! Lines are emitted through `tracing`; the binary installs a
//! `tracing-subscriber` formatter, tests and library users install their own
//! or none at all.

use std::fmt;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-request detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable for the group
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured event logger
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let rendered = Self::render_fields(fields);
        match severity {
            Severity::Trace => tracing::trace!(fields = %rendered, "{}", event),
            Severity::Info => tracing::info!(fields = %rendered, "{}", event),
            Severity::Warn => tracing::warn!(fields = %rendered, "{}", event),
            Severity::Error => tracing::error!(fields = %rendered, "{}", event),
            Severity::Fatal => tracing::error!(fatal = true, fields = %rendered, "{}", event),
        }
    }

    /// Render fields as `key=value` pairs sorted by key.
    ///
    /// Values containing whitespace, quotes or `=` are quoted.
    pub fn render_fields(fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        let mut output = String::with_capacity(16 * sorted.len());
        for (i, (key, value)) in sorted.into_iter().enumerate() {
            if i > 0 {
                output.push(' ');
            }
            output.push_str(key);
            output.push('=');
            if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
                output.push('"');
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        output.push('\\');
                    }
                    output.push(c);
                }
                output.push('"');
            } else {
                output.push_str(value);
            }
        }
        output
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_fields_sorted_by_key() {
        let rendered = Logger::render_fields(&[("zeta", "1"), ("alpha", "2"), ("mid", "3")]);
        assert_eq!(rendered, "alpha=2 mid=3 zeta=1");
    }

    #[test]
    fn test_values_with_spaces_are_quoted() {
        let rendered = Logger::render_fields(&[("reason", "disk \"full\""), ("group", "group-1")]);
        assert_eq!(rendered, r#"group=group-1 reason="disk \"full\"""#);
    }

    #[test]
    fn test_empty_value_quoted() {
        assert_eq!(Logger::render_fields(&[("k", "")]), r#"k="""#);
    }

    #[test]
    fn test_log_without_subscriber_does_not_panic() {
        Logger::info("TEST_EVENT", &[("key", "value")]);
        Logger::fatal("TEST_FATAL", &[]);
    }
}
