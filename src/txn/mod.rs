//! # Rollback Stack
//!
//! Per-request compensating actions for workflows that cross the metadata
//! store and the backend store. Steps register their compensation as they
//! succeed; on failure the stack runs in reverse registration order. A
//! commit discards everything.
//!
//! Rollback is best-effort: each action gets its own timeout budget, and a
//! failing action is logged and swallowed so the original error is what the
//! caller sees. The stack is a request-local value, never shared.

use futures::future::BoxFuture;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::constants::ROLLBACK_TIMEOUT_SECS;
use crate::error::Result;

type RollbackAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

pub struct RollbackStack {
    actions: Vec<(String, RollbackAction)>,
}

impl std::fmt::Debug for RollbackStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackStack")
            .field("depth", &self.actions.len())
            .finish()
    }
}

impl RollbackStack {
    pub fn new() -> Self {
        RollbackStack {
            actions: Vec::new(),
        }
    }

    /// Register a compensating action for a step that just succeeded.
    pub fn push<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.actions
            .push((label.into(), Box::new(move || Box::pin(action()))));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The workflow reached its end; drop all compensations.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Run compensations in reverse registration order, each under its own
    /// timeout. Failures are logged, never propagated.
    pub async fn run(mut self) {
        while let Some((label, action)) = self.actions.pop() {
            match timeout(Duration::from_secs(ROLLBACK_TIMEOUT_SECS), action()).await {
                Ok(Ok(())) => debug!(rollback = %label, "rollback applied"),
                Ok(Err(err)) => {
                    warn!(rollback = %label, error = %err, "rollback failed");
                }
                Err(_) => {
                    warn!(rollback = %label, "rollback timed out");
                }
            }
        }
    }
}

impl Default for RollbackStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_run_executes_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        for step in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            stack.push(step, move || async move {
                order.lock().unwrap().push(step);
                Ok(())
            });
        }
        stack.run().await;
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_commit_discards_actions() {
        let ran = Arc::new(Mutex::new(false));
        let mut stack = RollbackStack::new();
        {
            let ran = Arc::clone(&ran);
            stack.push("never", move || async move {
                *ran.lock().unwrap() = true;
                Ok(())
            });
        }
        stack.commit();
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_failed_action_does_not_stop_the_rest() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        {
            let order = Arc::clone(&order);
            stack.push("metadata", move || async move {
                order.lock().unwrap().push("metadata");
                Ok(())
            });
        }
        stack.push("backend", || async {
            Err(Error::StoreUnavailable {
                store: "consul",
                message: "connection refused".into(),
            })
        });
        stack.run().await;
        // The failing backend action ran first, the metadata one still ran.
        assert_eq!(*order.lock().unwrap(), vec!["metadata"]);
    }
}
