//! Disposable scopes for in-flight reads and writes.
//!
//! Work started on behalf of an owner (a dashboard session, an account, a
//! network) runs through its scope. Once the scope is disposed, results are
//! dropped on the floor, including ones that settle after disposal.

use std::future::Future;
use tokio::sync::watch;

pub struct Scope {
    tx: watch::Sender<bool>,
}

/// Cheap, cloneable view of a [`Scope`] that can move into tasks
#[derive(Clone)]
pub struct ScopeToken {
    rx: watch::Receiver<bool>,
}

impl Scope {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> ScopeToken {
        ScopeToken { rx: self.tx.subscribe() }
    }

    pub fn dispose(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_disposed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Run `fut`; `None` if the scope is (or becomes) disposed
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        self.token().run(fut).await
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl ScopeToken {
    /// A dropped scope counts as disposed
    pub fn is_disposed(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the owning scope is disposed or dropped
    pub async fn disposed(&mut self) {
        let _ = self.rx.wait_for(|disposed| *disposed).await;
    }

    pub async fn run<F: Future>(mut self, fut: F) -> Option<F::Output> {
        if self.is_disposed() {
            return None;
        }
        let output = tokio::select! {
            output = fut => output,
            _ = self.disposed() => return None,
        };
        if self.is_disposed() {
            return None;
        }
        Some(output)
    }
}
