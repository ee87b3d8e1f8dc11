//! One-shot readiness barrier.
//!
//! `Readiness::new` hands out the shared barrier and its only resolver.
//! Resolution is one-way; a barrier whose resolver is dropped unresolved
//! stays pending forever.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

pub struct Readiness {
    tx: watch::Sender<bool>,
}

/// The single resolver of a [`Readiness`]; consumed on use.
pub struct ReadyResolver {
    readiness: Arc<Readiness>,
}

impl Readiness {
    pub fn new() -> (Arc<Self>, ReadyResolver) {
        let (tx, _) = watch::channel(false);
        let readiness = Arc::new(Self { tx });
        let resolver = ReadyResolver {
            readiness: readiness.clone(),
        };
        (readiness, resolver)
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the barrier is resolved. Safe to call any number of
    /// times, before or after resolution.
    pub fn when_ready(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            if rx.wait_for(|ready| *ready).await.is_err() {
                // Barrier dropped unresolved: the shell is going away.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl ReadyResolver {
    pub fn resolve(self) {
        self.readiness.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_waiters_before_and_after_resolution() {
        let (ready, resolver) = Readiness::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let mut early = Vec::new();
        for _ in 0..3 {
            let fut = ready.when_ready();
            let hits = hits.clone();
            early.push(tokio::spawn(async move {
                fut.await;
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(!ready.is_ready());

        resolver.resolve();
        for h in early {
            h.await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // Late callers complete immediately.
        timeout(Duration::from_millis(100), ready.when_ready())
            .await
            .unwrap();
        assert!(ready.is_ready());
    }

    #[tokio::test]
    async fn test_unresolved_never_completes() {
        let (ready, resolver) = Readiness::new();
        drop(resolver);
        let res = timeout(Duration::from_millis(50), ready.when_ready()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_barrier_dropped_stays_pending() {
        let (ready, resolver) = Readiness::new();
        let fut = ready.when_ready();
        drop(ready);
        drop(resolver);
        let res = timeout(Duration::from_millis(50), fut).await;
        assert!(res.is_err());
    }
}
