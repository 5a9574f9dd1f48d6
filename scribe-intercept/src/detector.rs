//! Uncommitted-transaction detection.
//!
//! After the response is produced, every registered database source is asked
//! to roll back transactions that were opened within the ending request and
//! are still active. A pooled connection carrying an open transaction across
//! request boundaries is a correctness hazard, so the rollback is forced
//! here; the interceptor then escalates the request to `error` severity and
//! fails it after dispatching the log line.

use std::sync::Arc;

use crate::context::RequestId;
use crate::source::DatabaseSource;

/// Fragment text appended once per rolled-back connection.
pub const LEAK_MESSAGE: &str = "Uncommitted transaction found and rolled back";

/// Outcome of a leak sweep.
#[derive(Debug, Clone, Default)]
pub struct LeakReport {
    /// One connection name per transaction that was force-rolled-back.
    pub connections: Vec<String>,
}

impl LeakReport {
    /// Whether any leak was found.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Sweep every database source for transactions leaked by `scope` and roll
/// them back.
pub async fn sweep(sources: &[Arc<dyn DatabaseSource>], scope: RequestId) -> LeakReport {
    let mut report = LeakReport::default();
    for source in sources {
        let rolled_back = source.rollback_leaked(scope).await;
        if !rolled_back.is_empty() {
            tracing::warn!(
                target: "scribe::detector",
                source = source.name(),
                count = rolled_back.len(),
                request = %scope,
                "rolled back uncommitted transactions"
            );
        }
        report.connections.extend(rolled_back);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttachError;
    use crate::source::SharedQueryListener;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeSource {
        name: String,
        leaks: Mutex<Vec<RequestId>>,
    }

    impl FakeSource {
        fn new(name: &str, leaks: Vec<RequestId>) -> Self {
            Self {
                name: name.to_string(),
                leaks: Mutex::new(leaks),
            }
        }
    }

    #[async_trait]
    impl DatabaseSource for FakeSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn attach(&self, _listener: SharedQueryListener) -> Result<(), AttachError> {
            Ok(())
        }

        async fn rollback_leaked(&self, scope: RequestId) -> Vec<String> {
            let mut leaks = self.leaks.lock();
            let before = leaks.len();
            leaks.retain(|leaked| *leaked != scope);
            vec![self.name.clone(); before - leaks.len()]
        }
    }

    #[tokio::test]
    async fn test_sweep_covers_all_sources() {
        let scope = crate::context::RequestScope::new().id();
        let sources: Vec<Arc<dyn DatabaseSource>> = vec![
            Arc::new(FakeSource::new("primary", vec![scope])),
            Arc::new(FakeSource::new("replica", vec![scope, scope])),
        ];

        let report = sweep(&sources, scope).await;
        assert_eq!(
            report.connections,
            vec!["primary".to_string(), "replica".to_string(), "replica".to_string()]
        );
        assert!(!report.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_ignores_other_scopes() {
        let leaked_by = crate::context::RequestScope::new().id();
        let ending = crate::context::RequestScope::new().id();
        let sources: Vec<Arc<dyn DatabaseSource>> =
            vec![Arc::new(FakeSource::new("primary", vec![leaked_by]))];

        let report = sweep(&sources, ending).await;
        assert!(report.is_empty());
    }
}
