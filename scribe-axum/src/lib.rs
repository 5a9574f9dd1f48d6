//! # scribe-axum
//!
//! Axum framework integration for the Scribe request interceptor.
//!
//! [`ScribeLayer`] is a Tower layer wrapping every routed request in
//! `RequestInterceptor::intercept`: it assembles the request surface the
//! interceptor needs (client address, method, URL, matched route, POST
//! body), runs the inner service as the continuation, and converts the
//! interceptor's fatal transaction-leak error into a `500` response after
//! the log line has been written.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use scribe_axum::ScribeLayer;
//! use scribe_intercept::{InterceptConfig, RequestInterceptor};
//!
//! let interceptor = Arc::new(
//!     RequestInterceptor::builder()
//!         .config(InterceptConfig::new().skip_path("/health"))
//!         .build(),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/users/{id}", get(show_user))
//!     .layer(ScribeLayer::new(interceptor));
//! ```
//!
//! Handlers report application failures to the interceptor by storing a
//! [`CapturedFailure`] in the response extensions, see [`FailureExt`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use scribe_intercept::{CapturedFailure, RequestInfo, RequestInterceptor, ResponseInspect};

/// Default cap on how much of a POST body is buffered for the dump.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Tower layer installing the Scribe interceptor around every request.
#[derive(Clone)]
pub struct ScribeLayer {
    interceptor: Arc<RequestInterceptor>,
    module: Option<String>,
    capture_post_body: bool,
    body_limit: usize,
}

impl ScribeLayer {
    /// Create a layer around an interceptor.
    pub fn new(interceptor: Arc<RequestInterceptor>) -> Self {
        Self {
            interceptor,
            module: None,
            capture_post_body: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Set the module name reported for every request through this layer,
    /// matched by module exclusion rules.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Enable or disable POST body buffering.
    pub fn with_body_capture(mut self, enabled: bool) -> Self {
        self.capture_post_body = enabled;
        self
    }

    /// Cap the number of body bytes buffered for the POST dump.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The wrapped interceptor.
    pub fn interceptor(&self) -> &Arc<RequestInterceptor> {
        &self.interceptor
    }
}

impl<S> Layer<S> for ScribeLayer {
    type Service = ScribeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ScribeService {
            inner,
            interceptor: Arc::clone(&self.interceptor),
            module: self.module.clone(),
            capture_post_body: self.capture_post_body,
            body_limit: self.body_limit,
        }
    }
}

/// Tower service produced by [`ScribeLayer`].
#[derive(Clone)]
pub struct ScribeService<S> {
    inner: S,
    interceptor: Arc<RequestInterceptor>,
    module: Option<String>,
    capture_post_body: bool,
    body_limit: usize,
}

impl<S> Service<Request<Body>> for ScribeService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let interceptor = Arc::clone(&self.interceptor);
        let module = self.module.clone();
        let capture = self.capture_post_body;
        let limit = self.body_limit;

        // Take the instance that was polled ready; leave a fresh clone
        // behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (info, request) = build_request_info(request, module, capture, limit).await;

            let result = interceptor
                .intercept(info, move || {
                    let mut inner = inner;
                    async move {
                        match inner.call(request).await {
                            Ok(response) => Inspected(response),
                            Err(never) => match never {},
                        }
                    }
                })
                .await;

            match result {
                Ok(Inspected(response)) => Ok(response),
                Err(error) => {
                    debug!(target: "scribe::axum", %error, "request failed after logging");
                    Ok((StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response())
                }
            }
        })
    }
}

/// Response wrapper giving the interceptor access to a reported failure.
struct Inspected(Response);

impl ResponseInspect for Inspected {
    fn failure(&self) -> Option<&CapturedFailure> {
        self.0.extensions().get::<CapturedFailure>()
    }
}

/// Attach a captured application failure to a response so the interceptor
/// logs it and escalates the request to `error` severity.
///
/// # Example
///
/// ```rust,ignore
/// use axum::response::IntoResponse;
/// use scribe_axum::FailureExt;
/// use scribe_intercept::CapturedFailure;
///
/// async fn checkout() -> impl IntoResponse {
///     let response = (StatusCode::CONFLICT, "out of stock").into_response();
///     response.with_failure(CapturedFailure::new("BusinessError", "out of stock"))
/// }
/// ```
pub trait FailureExt {
    /// Store the failure in the response extensions.
    fn with_failure(self, failure: CapturedFailure) -> Self;
}

impl<B> FailureExt for http::Response<B> {
    fn with_failure(mut self, failure: CapturedFailure) -> Self {
        self.extensions_mut().insert(failure);
        self
    }
}

async fn build_request_info(
    request: Request<Body>,
    module: Option<String>,
    capture_post_body: bool,
    body_limit: usize,
) -> (RequestInfo, Request<Body>) {
    let full_url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let mut info = RequestInfo::new(client_ip(&request), request.method().as_str(), full_url);

    if let Some(module) = module {
        info = info.with_module(module);
    }
    if let Some(matched) = request.extensions().get::<MatchedPath>() {
        info = info.with_handler(matched.as_str().to_string());
    }

    if capture_post_body && request.method() == Method::POST {
        let (parts, body) = request.into_parts();
        match axum::body::to_bytes(body, body_limit).await {
            Ok(bytes) => {
                info = info.with_post_body(decode_body(&parts, &bytes));
                let request = Request::from_parts(parts, Body::from(bytes));
                (info, request)
            }
            Err(error) => {
                debug!(target: "scribe::axum", %error, "POST body not captured");
                info = info
                    .with_post_body(serde_json::Value::String("<post body unavailable>".into()));
                let request = Request::from_parts(parts, Body::empty());
                (info, request)
            }
        }
    } else {
        (info, request)
    }
}

fn client_ip(request: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    for name in ["x-forwarded-for", "x-real-ip"] {
        let value = request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok());
        if let Some(value) = value {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    "-".to_string()
}

fn decode_body(parts: &http::request::Parts, bytes: &Bytes) -> serde_json::Value {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            return value;
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let map: serde_json::Map<String, serde_json::Value> =
            url::form_urlencoded::parse(bytes)
                .into_owned()
                .map(|(key, value)| (key, serde_json::Value::String(value)))
                .collect();
        return serde_json::Value::Object(map);
    }
    serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
}
