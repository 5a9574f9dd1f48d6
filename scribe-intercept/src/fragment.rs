//! Log-event fragments.
//!
//! A fragment is one formatted line describing a single instrumented
//! operation (query, cache command, error or POST dump) attached to a
//! request's composite log line. Fragments are immutable once built and are
//! rendered as `[KIND] {text}`.

use std::fmt;
use std::time::Duration;

/// The category of a log-event fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// An executed database query.
    Sql,
    /// An executed cache command, or a newly discovered cache connection.
    Cache,
    /// An error condition (transaction leak, rollback failure).
    Error,
    /// A POST body dump.
    Post,
}

impl FragmentKind {
    /// The bracketed label used when rendering.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sql => "SQL",
            Self::Cache => "CACHE",
            Self::Error => "ERROR",
            Self::Post => "POST",
        }
    }
}

/// One formatted line of a request's composite log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    kind: FragmentKind,
    text: String,
}

impl Fragment {
    /// Create a fragment from a kind and pre-formatted text.
    pub fn new(kind: FragmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Fragment for an executed query.
    pub fn sql(connection: &str, statement: &str, duration: Duration) -> Self {
        Self::new(
            FragmentKind::Sql,
            format!(
                "[connection:{}] {} [{}ms]",
                connection,
                statement,
                format_ms(duration)
            ),
        )
    }

    /// Fragment for an executed cache command.
    pub fn cache_command(
        connection: &str,
        command: &str,
        rendered_args: &str,
        duration: Duration,
    ) -> Self {
        Self::new(
            FragmentKind::Cache,
            format!(
                "[connection:{}] {}({}) ({}ms)",
                connection,
                command,
                rendered_args,
                format_ms(duration)
            ),
        )
    }

    /// Fragment announcing a cache connection that was discovered this
    /// request but is only instrumented from the next request on.
    pub fn cache_pending(connection: &str) -> Self {
        Self::new(FragmentKind::Cache, format!("[connection:{}] ...", connection))
    }

    /// Error fragment.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(FragmentKind::Error, text)
    }

    /// POST body dump fragment.
    pub fn post(dump: impl Into<String>) -> Self {
        Self::new(FragmentKind::Post, dump)
    }

    /// The fragment's category.
    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    /// The fragment's text, without the category label.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.text)
    }
}

/// Format a duration as milliseconds, truncated to at most seven characters
/// (six significant digits for sub-second values).
pub fn format_ms(duration: Duration) -> String {
    let ms = duration.as_secs_f64() * 1000.0;
    let mut formatted = format!("{:.6}", ms);
    if formatted.len() > 7 {
        formatted.truncate(7);
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_display() {
        let fragment = Fragment::sql("default", "SELECT * FROM users", Duration::from_millis(2));
        assert_eq!(
            fragment.to_string(),
            "[SQL] [connection:default] SELECT * FROM users [2.00000ms]"
        );
    }

    #[test]
    fn test_cache_command_fragment() {
        let fragment =
            Fragment::cache_command("sessions", "GET", "'user:1'", Duration::from_micros(500));
        assert_eq!(
            fragment.to_string(),
            "[CACHE] [connection:sessions] GET('user:1') (0.50000ms)"
        );
    }

    #[test]
    fn test_cache_pending_fragment() {
        let fragment = Fragment::cache_pending("sessions");
        assert_eq!(fragment.to_string(), "[CACHE] [connection:sessions] ...");
        assert_eq!(fragment.kind(), FragmentKind::Cache);
    }

    #[test]
    fn test_error_fragment() {
        let fragment = Fragment::error("boom");
        assert_eq!(fragment.to_string(), "[ERROR] boom");
    }

    #[test]
    fn test_format_ms_truncates_to_seven_chars() {
        assert_eq!(format_ms(Duration::from_micros(12_345_600)), "12345.6");
        assert_eq!(format_ms(Duration::from_micros(12_345)), "12.3450");
        assert_eq!(format_ms(Duration::from_secs(1000)), "1000000");
    }

    #[test]
    fn test_format_ms_small_values() {
        assert_eq!(format_ms(Duration::from_micros(50)), "0.05000");
        assert_eq!(format_ms(Duration::ZERO), "0.00000");
    }
}
