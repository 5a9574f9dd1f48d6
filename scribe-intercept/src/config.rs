//! Interceptor configuration.
//!
//! Loaded once at startup and read per request. Exclusion rules disable all
//! instrumentation for matching requests; exception rules decide whether a
//! captured failure is appended to the log line.
//!
//! # Example
//!
//! ```rust
//! use scribe_intercept::InterceptConfig;
//!
//! let config = InterceptConfig::from_toml_str(r#"
//!     tag = "api"
//!     channel = "audit"
//!
//!     [exception]
//!     dont_report = ["BusinessError"]
//!
//!     [dont_report]
//!     paths = ["/health"]
//! "#).unwrap();
//! assert_eq!(config.tag, "api");
//! assert!(!config.exception.should_report("BusinessError"));
//! ```

use serde::Deserialize;

use crate::error::ConfigError;
use crate::request::RequestInfo;

/// Static interceptor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Master switch; when off, every request bypasses instrumentation.
    pub enable: bool,
    /// Tag appended to the request summary line.
    pub tag: String,
    /// Name of the log channel to dispatch to.
    pub channel: String,
    /// Failure reporting rules.
    pub exception: ExceptionConfig,
    /// Request exclusion rules.
    pub dont_report: SkipRules,
    /// Maximum rendered length of the POST body dump; `0` means unlimited.
    pub max_post_length: usize,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enable: true,
            tag: "scribe".to_string(),
            channel: "default".to_string(),
            exception: ExceptionConfig::default(),
            dont_report: SkipRules::default(),
            max_post_length: 2048,
        }
    }
}

impl InterceptConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Disable the interceptor entirely.
    pub fn disabled(mut self) -> Self {
        self.enable = false;
        self
    }

    /// Set the summary-line tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set the log channel name.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Exclude a module from instrumentation.
    pub fn skip_module(mut self, module: impl Into<String>) -> Self {
        self.dont_report.modules.push(module.into());
        self
    }

    /// Exclude a path prefix from instrumentation.
    pub fn skip_path(mut self, prefix: impl Into<String>) -> Self {
        self.dont_report.paths.push(prefix.into());
        self
    }

    /// Exclude a handler from instrumentation.
    pub fn skip_handler(mut self, handler: impl Into<String>) -> Self {
        self.dont_report.handlers.push(handler.into());
        self
    }

    /// Exclude one handler/action pair from instrumentation.
    pub fn skip_action(
        mut self,
        handler: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.dont_report.actions.push(HandlerAction {
            handler: handler.into(),
            action: action.into(),
        });
        self
    }

    /// Keep failures of the given kind out of the log line.
    pub fn ignore_failure_kind(mut self, kind: impl Into<String>) -> Self {
        self.exception.dont_report.push(kind.into());
        self
    }
}

/// Failure reporting rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExceptionConfig {
    /// Whether captured failures are appended to the log line at all.
    pub enable: bool,
    /// Failure kinds that are never appended.
    pub dont_report: Vec<String>,
}

impl Default for ExceptionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            dont_report: Vec::new(),
        }
    }
}

impl ExceptionConfig {
    /// Whether a failure of `kind` should be appended to the log line.
    pub fn should_report(&self, kind: &str) -> bool {
        self.enable && !self.dont_report.iter().any(|excluded| excluded == kind)
    }
}

/// Exclusion rules disabling instrumentation for matching requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkipRules {
    /// Excluded module names.
    pub modules: Vec<String>,
    /// Excluded path prefixes (matched against the request path, which
    /// carries its leading slash).
    pub paths: Vec<String>,
    /// Excluded handler names.
    pub handlers: Vec<String>,
    /// Excluded handler/action pairs.
    pub actions: Vec<HandlerAction>,
}

/// One excluded handler/action pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandlerAction {
    /// Handler name.
    pub handler: String,
    /// Action name.
    pub action: String,
}

impl SkipRules {
    /// Whether the request matches any exclusion rule.
    pub fn matches(&self, request: &RequestInfo) -> bool {
        if let Some(module) = &request.module {
            if self.modules.iter().any(|excluded| excluded == module) {
                return true;
            }
        }
        if self.paths.iter().any(|prefix| request.path.starts_with(prefix.as_str())) {
            return true;
        }
        if let Some(handler) = &request.handler {
            if self.handlers.iter().any(|excluded| excluded == handler) {
                return true;
            }
            if let Some(action) = &request.action {
                if self
                    .actions
                    .iter()
                    .any(|pair| &pair.handler == handler && &pair.action == action)
                {
                    return true;
                }
            }
        }
        false
    }
}
