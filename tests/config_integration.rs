//! Integration tests for configuration loading and its effect on the
//! interceptor.
//!
//! These tests verify that a TOML-loaded configuration drives the skip
//! rules, channel selection and POST-dump limits end to end.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use scribe_log::intercept::{
    ChannelRegistry, InterceptConfig, MemoryChannel, RequestInfo, RequestInterceptor, Severity,
};

/// Test minimal configuration
#[test]
fn test_config_minimal() {
    let config = InterceptConfig::from_toml_str("").expect("empty config must parse");

    assert!(config.enable);
    assert_eq!(config.tag, "scribe");
    assert_eq!(config.channel, "default");
    assert!(config.exception.enable);
    assert!(config.dont_report.modules.is_empty());
    assert!(config.dont_report.paths.is_empty());
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config = InterceptConfig::from_toml_str(
        r#"
        enable = true
        tag = "api"
        channel = "audit"
        max_post_length = 512

        [exception]
        enable = true
        dont_report = ["BusinessError", "ValidationError"]

        [dont_report]
        modules = ["admin"]
        paths = ["/health", "/metrics"]
        handlers = ["StatusController"]

        [[dont_report.actions]]
        handler = "UserController"
        action = "export"
        "#,
    )
    .expect("full config must parse");

    assert_eq!(config.tag, "api");
    assert_eq!(config.channel, "audit");
    assert_eq!(config.max_post_length, 512);
    assert_eq!(
        config.exception.dont_report,
        vec!["BusinessError".to_string(), "ValidationError".to_string()]
    );
    assert_eq!(config.dont_report.modules, vec!["admin".to_string()]);
    assert_eq!(config.dont_report.handlers, vec!["StatusController".to_string()]);
    assert_eq!(config.dont_report.actions.len(), 1);
}

/// Test invalid configuration is rejected
#[test]
fn test_config_invalid_types_rejected() {
    assert!(InterceptConfig::from_toml_str("enable = \"maybe\"").is_err());
    assert!(InterceptConfig::from_toml_str("max_post_length = -1").is_err());
    assert!(InterceptConfig::from_toml_str("[dont_report]\npaths = 7").is_err());
}

#[tokio::test]
async fn test_toml_skip_rules_bypass_instrumentation() {
    let config = InterceptConfig::from_toml_str(
        r#"
        [dont_report]
        paths = ["/health"]
        "#,
    )
    .unwrap();

    let channel = Arc::new(MemoryChannel::new());
    let interceptor = RequestInterceptor::builder()
        .config(config)
        .channel(channel.clone())
        .build();

    interceptor
        .intercept(RequestInfo::new("10.0.0.5", "GET", "/health/live"), || async {})
        .await
        .unwrap();
    assert!(channel.is_empty());

    interceptor
        .intercept(RequestInfo::new("10.0.0.5", "GET", "/users"), || async {})
        .await
        .unwrap();
    assert_eq!(channel.len(), 1);
}

#[tokio::test]
async fn test_toml_channel_name_selects_registered_sink() {
    let config = InterceptConfig::from_toml_str("channel = \"audit\"").unwrap();

    let audit = Arc::new(MemoryChannel::new());
    let registry = ChannelRegistry::new();
    registry.register("audit", audit.clone());

    let interceptor = RequestInterceptor::builder()
        .config(config)
        .channels(&registry)
        .build();

    interceptor
        .intercept(RequestInfo::new("10.0.0.5", "GET", "/users"), || async {})
        .await
        .unwrap();

    let (severity, message) = audit.last().expect("audit channel must receive the line");
    assert_eq!(severity, Severity::Info);
    assert!(message.starts_with("10.0.0.5 GET users ["));
}

#[tokio::test]
async fn test_toml_post_limit_truncates_the_dump() {
    let config = InterceptConfig::from_toml_str("max_post_length = 8").unwrap();

    let channel = Arc::new(MemoryChannel::new());
    let interceptor = RequestInterceptor::builder()
        .config(config)
        .channel(channel.clone())
        .build();

    let request = RequestInfo::new("10.0.0.5", "POST", "/users")
        .with_post_body(serde_json::json!({"name": "a-value-well-past-the-limit"}));
    interceptor.intercept(request, || async {}).await.unwrap();

    let (_, message) = channel.last().unwrap();
    let dump_line = message
        .lines()
        .find(|line| line.starts_with("[POST] "))
        .expect("POST dump line missing");
    assert_eq!(dump_line, "[POST] {\"name\":...");
}

#[tokio::test]
async fn test_toml_exception_exclusions_apply() {
    let config = InterceptConfig::from_toml_str(
        r#"
        [exception]
        dont_report = ["BusinessError"]
        "#,
    )
    .unwrap();

    assert!(!config.exception.should_report("BusinessError"));
    assert!(config.exception.should_report("DbError"));
}
