//! Request-scoped capture context.
//!
//! Every instrumented request gets its own [`RequestScope`] carrying the
//! start instant and the ordered fragment buffer. The scope lives in Tokio
//! task-local storage for the duration of the inner handler, so listener
//! callbacks firing during the request append to the right buffer without
//! any shared mutable state between concurrent requests. The interceptor
//! keeps its own handle to the scope and drains the buffer once the handler
//! has returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::fragment::Fragment;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Scope of the request currently being handled on this task.
    static ACTIVE_SCOPE: RequestScope;
}

/// Process-unique identifier of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request capture state: id, start time and the fragment buffer.
///
/// Cloning is cheap; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct RequestScope {
    id: RequestId,
    started: Instant,
    fragments: Arc<Mutex<Vec<Fragment>>>,
}

impl RequestScope {
    /// Create a fresh scope with a new request id.
    pub fn new() -> Self {
        Self {
            id: RequestId::next(),
            started: Instant::now(),
            fragments: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The request id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Time elapsed since the scope was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Append a fragment to this request's buffer.
    pub fn append(&self, fragment: Fragment) {
        self.fragments.lock().push(fragment);
    }

    /// Take all buffered fragments, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Fragment> {
        std::mem::take(&mut *self.fragments.lock())
    }

    /// Number of buffered fragments.
    pub fn len(&self) -> usize {
        self.fragments.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.lock().is_empty()
    }

    /// Run a future with this scope installed as the task-local active
    /// scope.
    pub async fn enter<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        ACTIVE_SCOPE.scope(self.clone(), future).await
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

/// The scope of the request currently handled on this task, if any.
pub fn current() -> Option<RequestScope> {
    ACTIVE_SCOPE.try_with(|scope| scope.clone()).ok()
}

/// The id of the request currently handled on this task, if any.
pub fn current_id() -> Option<RequestId> {
    ACTIVE_SCOPE.try_with(|scope| scope.id()).ok()
}

/// Append a fragment to the active request's buffer.
///
/// Returns `false` when no request scope is active on this task; the
/// fragment is discarded in that case.
pub fn append(fragment: Fragment) -> bool {
    ACTIVE_SCOPE
        .try_with(|scope| scope.append(fragment))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_collects_fragments_in_order() {
        let scope = RequestScope::new();
        scope
            .enter(async {
                append(Fragment::error("first"));
                append(Fragment::error("second"));
            })
            .await;

        let fragments = scope.drain();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text(), "first");
        assert_eq!(fragments[1].text(), "second");
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_append_without_scope_is_discarded() {
        assert!(!append(Fragment::error("lost")));
        assert!(current().is_none());
        assert!(current_id().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let first = RequestScope::new();
        let second = RequestScope::new();
        assert_ne!(first.id(), second.id());

        let left = first.enter(async {
            append(Fragment::error("left"));
            tokio::task::yield_now().await;
            append(Fragment::error("left again"));
        });
        let right = second.enter(async {
            tokio::task::yield_now().await;
            append(Fragment::error("right"));
        });
        tokio::join!(left, right);

        let first_texts: Vec<_> = first.drain().iter().map(|f| f.text().to_string()).collect();
        let second_texts: Vec<_> = second.drain().iter().map(|f| f.text().to_string()).collect();
        assert_eq!(first_texts, vec!["left", "left again"]);
        assert_eq!(second_texts, vec!["right"]);
    }

    #[tokio::test]
    async fn test_nested_call_sees_scope() {
        async fn deep() {
            append(Fragment::error("deep"));
        }

        let scope = RequestScope::new();
        scope.enter(deep()).await;
        assert_eq!(scope.len(), 1);
    }
}
