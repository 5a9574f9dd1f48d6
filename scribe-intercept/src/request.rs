//! Request and response surfaces consumed from the host framework.

use std::fmt;

/// What the interceptor needs to know about an incoming request.
///
/// The host integration (an HTTP framework layer, a test harness) builds one
/// of these per request. Routing attributes (`module`, `handler`, `action`)
/// are optional; exclusion rules only match against attributes that are set.
///
/// # Example
///
/// ```rust
/// use scribe_intercept::RequestInfo;
///
/// let info = RequestInfo::new("10.0.0.5", "GET", "/users/42")
///     .with_handler("UserController")
///     .with_action("show");
/// assert_eq!(info.normalized_url(), "users/42");
/// assert!(!info.is_post());
/// ```
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Client address as reported by the host.
    pub client_ip: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Full URL (path plus query string).
    pub full_url: String,
    /// Path component, used for prefix exclusion matching.
    pub path: String,
    /// Application/module name, if the host routes by module.
    pub module: Option<String>,
    /// Handler (controller) name.
    pub handler: Option<String>,
    /// Action name within the handler.
    pub action: Option<String>,
    /// Decoded POST body, dumped into the log line for POST requests.
    pub post_body: Option<serde_json::Value>,
}

impl RequestInfo {
    /// Create request info from the always-present attributes.
    pub fn new(
        client_ip: impl Into<String>,
        method: impl Into<String>,
        full_url: impl Into<String>,
    ) -> Self {
        let full_url = full_url.into();
        let path = full_url
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            client_ip: client_ip.into(),
            method: method.into().to_ascii_uppercase(),
            full_url,
            path,
            module: None,
            handler: None,
            action: None,
            post_body: None,
        }
    }

    /// Set the module name.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Set the handler name.
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the action name.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attach the decoded POST body.
    pub fn with_post_body(mut self, body: serde_json::Value) -> Self {
        self.post_body = Some(body);
        self
    }

    /// The full URL with leading and trailing slashes trimmed, as it appears
    /// in the request summary line.
    pub fn normalized_url(&self) -> &str {
        self.full_url.trim_matches('/')
    }

    /// Whether this is a POST request.
    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }
}

/// A failure captured by the host while producing the response.
///
/// The host framework catches unhandled application errors, converts them
/// into a response, and exposes the original failure here so the
/// interceptor can log it. `kind` identifies the failure class and is
/// matched against the configured `dont_report` exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFailure {
    /// Failure class used by exclusion rules.
    pub kind: String,
    /// Human-readable description, appended to the log line.
    pub message: String,
}

impl CapturedFailure {
    /// Create a captured failure.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Read-only view the interceptor has of a produced response.
pub trait ResponseInspect {
    /// The failure captured while producing this response, if any.
    fn failure(&self) -> Option<&CapturedFailure> {
        None
    }
}

impl ResponseInspect for () {}

/// A plain collection of rows carries no captured failure; handlers that
/// return query results directly use the default (no-failure) view.
impl<T> ResponseInspect for Vec<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_url_trims_slashes() {
        assert_eq!(
            RequestInfo::new("1.2.3.4", "GET", "/users/42").normalized_url(),
            "users/42"
        );
        assert_eq!(RequestInfo::new("1.2.3.4", "GET", "/").normalized_url(), "");
        assert_eq!(
            RequestInfo::new("1.2.3.4", "GET", "/health/").normalized_url(),
            "health"
        );
    }

    #[test]
    fn test_path_strips_query_string() {
        let info = RequestInfo::new("1.2.3.4", "GET", "/users/42?expand=posts");
        assert_eq!(info.path, "/users/42");
        assert_eq!(info.full_url, "/users/42?expand=posts");
    }

    #[test]
    fn test_method_is_uppercased() {
        let info = RequestInfo::new("1.2.3.4", "post", "/users");
        assert!(info.is_post());
        assert_eq!(info.method, "POST");
    }

    #[test]
    fn test_captured_failure_display() {
        let failure = CapturedFailure::new("BusinessError", "insufficient funds");
        assert_eq!(failure.to_string(), "BusinessError: insufficient funds");
    }
}
