//! The request interceptor.
//!
//! One interceptor instance serves the whole process. Per request it records
//! timing, collects the fragments produced by data-source listeners while
//! the inner handler runs, checks for leaked transactions, and dispatches a
//! single composite log line to the configured channel.

use std::sync::Arc;

use crate::config::InterceptConfig;
use crate::context::RequestScope;
use crate::detector::{self, LEAK_MESSAGE};
use crate::error::InterceptError;
use crate::fragment::{self, Fragment};
use crate::registry::{self, ListenerRegistry};
use crate::request::{RequestInfo, ResponseInspect};
use crate::sink::{ChannelRegistry, LogChannel, Severity, SharedChannel, TracingChannel};
use crate::source::{CacheSource, DatabaseSource, FragmentListener};

/// Process-wide request interceptor.
///
/// # Example
///
/// ```rust,ignore
/// use scribe_intercept::{InterceptConfig, RequestInfo, RequestInterceptor};
///
/// let interceptor = RequestInterceptor::builder()
///     .config(InterceptConfig::new().skip_path("/health"))
///     .database(database_source)
///     .cache(cache_source)
///     .build();
///
/// let response = interceptor
///     .intercept(RequestInfo::new(ip, method, url), || handle(request))
///     .await?;
/// ```
pub struct RequestInterceptor {
    config: InterceptConfig,
    channel: SharedChannel,
    databases: Vec<Arc<dyn DatabaseSource>>,
    caches: Vec<Arc<dyn CacheSource>>,
    registry: ListenerRegistry,
    listener: Arc<FragmentListener>,
}

impl RequestInterceptor {
    /// Start building an interceptor.
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &InterceptConfig {
        &self.config
    }

    /// Wrap one request.
    ///
    /// Runs `next` and returns its response unchanged, with one exception:
    /// when a leaked transaction was found (and rolled back), the response
    /// is replaced by [`InterceptError::UncommittedTransactions`] *after*
    /// the log line has been dispatched.
    pub async fn intercept<R, F, Fut>(
        &self,
        request: RequestInfo,
        next: F,
    ) -> Result<R, InterceptError>
    where
        R: ResponseInspect,
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        if !self.config.enable || self.config.dont_report.matches(&request) {
            return Ok(next().await);
        }

        let scope = RequestScope::new();
        self.ensure_database_listeners();

        let response = scope.enter(next()).await;

        let mut lines = vec![format!(
            "{} {} {} [{}ms] [{}]",
            request.client_ip,
            request.method,
            request.normalized_url(),
            fragment::format_ms(scope.elapsed()),
            self.config.tag,
        )];

        if request.is_post() {
            lines.push(Fragment::post(self.render_post_dump(&request)).to_string());
        }
        for captured in scope.drain() {
            lines.push(captured.to_string());
        }

        let mut severity = Severity::Info;
        if let Some(failure) = response.failure() {
            if self.config.exception.should_report(&failure.kind) {
                lines.push(failure.to_string());
                severity = Severity::Error;
            }
        }

        let leaks = detector::sweep(&self.databases, scope.id()).await;
        for _connection in &leaks.connections {
            lines.push(Fragment::error(LEAK_MESSAGE).to_string());
        }
        if !leaks.is_empty() {
            severity = Severity::Error;
        }

        for connection in self.rescan_cache_listeners() {
            lines.push(Fragment::cache_pending(&connection).to_string());
        }

        self.channel.log(severity, &lines.join("\n"));

        if leaks.is_empty() {
            Ok(response)
        } else {
            Err(InterceptError::UncommittedTransactions {
                connections: leaks.connections,
            })
        }
    }

    /// Attach the query listener to each database source exactly once per
    /// process. Attach failures degrade capture and are not retried.
    fn ensure_database_listeners(&self) {
        for source in &self.databases {
            let key = registry::database_key(source.name());
            if !self.registry.register_once(&key) {
                continue;
            }
            if let Err(error) = source.attach(self.listener.clone()) {
                tracing::debug!(
                    target: "scribe::listener",
                    source = source.name(),
                    %error,
                    "query listener attach failed"
                );
            }
        }
    }

    /// Re-enumerate cache connections and instrument the ones not seen
    /// before. Returns the names of newly instrumented connections; their
    /// commands are only captured from the next request on.
    fn rescan_cache_listeners(&self) -> Vec<String> {
        let mut discovered = Vec::new();
        for source in &self.caches {
            for connection in source.connections() {
                let key = registry::cache_key(source.name(), connection.name());
                if !self.registry.register_once(&key) {
                    continue;
                }
                match connection.listen(self.listener.clone()) {
                    Ok(()) => discovered.push(connection.name().to_string()),
                    Err(error) => {
                        tracing::debug!(
                            target: "scribe::listener",
                            source = source.name(),
                            connection = connection.name(),
                            %error,
                            "command listener attach failed"
                        );
                    }
                }
            }
        }
        discovered
    }

    fn render_post_dump(&self, request: &RequestInfo) -> String {
        let body = request
            .post_body
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        let mut dump = body.to_string();
        let limit = self.config.max_post_length;
        if limit > 0 && dump.len() > limit {
            let mut cut = limit;
            while !dump.is_char_boundary(cut) {
                cut -= 1;
            }
            dump.truncate(cut);
            dump.push_str("...");
        }
        dump
    }
}

/// Builder for [`RequestInterceptor`].
pub struct InterceptorBuilder {
    config: InterceptConfig,
    channel: Option<SharedChannel>,
    databases: Vec<Arc<dyn DatabaseSource>>,
    caches: Vec<Arc<dyn CacheSource>>,
}

impl InterceptorBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: InterceptConfig::default(),
            channel: None,
            databases: Vec::new(),
            caches: Vec::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: InterceptConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the log channel directly.
    pub fn channel(mut self, channel: SharedChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Resolve the configured channel name against a registry.
    pub fn channels(mut self, registry: &ChannelRegistry) -> Self {
        self.channel = Some(registry.resolve(&self.config.channel));
        self
    }

    /// Register a database collaborator.
    pub fn database(mut self, source: Arc<dyn DatabaseSource>) -> Self {
        self.databases.push(source);
        self
    }

    /// Register a cache collaborator.
    pub fn cache(mut self, source: Arc<dyn CacheSource>) -> Self {
        self.caches.push(source);
        self
    }

    /// Build the interceptor. Without an explicit channel the tracing
    /// channel is used.
    pub fn build(self) -> RequestInterceptor {
        RequestInterceptor {
            config: self.config,
            channel: self
                .channel
                .unwrap_or_else(|| Arc::new(TracingChannel::new())),
            databases: self.databases,
            caches: self.caches,
            registry: ListenerRegistry::new(),
            listener: Arc::new(FragmentListener::new()),
        }
    }
}

impl Default for InterceptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
