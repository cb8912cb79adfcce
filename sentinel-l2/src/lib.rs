//! The L2 semantic classifier: a strictly-timed, fail-open call to a
//! pluggable backend (a live chat-completion endpoint, or a deterministic
//! mock for tests). `unknown` is always available; availability of the
//! pipeline never depends on the backend succeeding.

mod live;
mod mock;
mod parsing;
mod request;

pub use live::LiveBackend;
pub use live::LiveClassifyError;
pub use mock::MockBackend;
pub use request::ClassificationRequest;
pub use request::ContextEnvelope;

use std::time::Duration;

use async_trait::async_trait;
use sentinel_protocol::L2Finding;
use tracing::warn;

/// One pluggable L2 implementation. `classify_raw` may fail for any
/// reason (network, parse, non-2xx); [`L2Classifier`] is what turns that
/// into the fail-open `unknown` contract callers actually see.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn classify_raw(&self, request: &ClassificationRequest) -> Result<L2Finding, anyhow::Error>;
}

/// Wraps a [`ClassifierBackend`] with the timeout and fail-open handling
/// every backend shares, so individual backends only need to implement
/// the happy path plus their own error type.
pub struct L2Classifier {
    backend: Box<dyn ClassifierBackend>,
    timeout: Duration,
}

impl L2Classifier {
    pub fn new(backend: Box<dyn ClassifierBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Runs the backend under `timeout`. Network error, non-2xx, parse
    /// failure, and deadline expiry all collapse to the same `unknown`
    /// outcome; the caller (the Dispatcher) treats `unknown` identically
    /// to "no opinion" and never blocks on it alone.
    ///
    /// Dropping this future (e.g. via `tokio::select!` against a
    /// cancellation signal) cancels the in-flight call; there is nothing
    /// further to clean up since the backend owns no dispatcher state.
    pub async fn classify(&self, request: &ClassificationRequest) -> L2Finding {
        match tokio::time::timeout(self.timeout, self.backend.classify_raw(request)).await {
            Ok(Ok(finding)) => finding,
            Ok(Err(error)) => {
                warn!(backend = self.backend.name(), %error, "L2 backend failed; failing open");
                L2Finding::unknown(self.backend.name())
            }
            Err(_elapsed) => {
                warn!(backend = self.backend.name(), timeout_ms = self.timeout.as_millis() as u64, "L2 call timed out; failing open");
                L2Finding::unknown(self.backend.name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_protocol::L2Outcome;
    use std::time::Duration;

    struct AlwaysFails;

    #[async_trait]
    impl ClassifierBackend for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        async fn classify_raw(&self, _request: &ClassificationRequest) -> Result<L2Finding, anyhow::Error> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    struct NeverResolves;

    #[async_trait]
    impl ClassifierBackend for NeverResolves {
        fn name(&self) -> &'static str {
            "never_resolves"
        }

        async fn classify_raw(&self, _request: &ClassificationRequest) -> Result<L2Finding, anyhow::Error> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn backend_errors_fail_open_to_unknown() {
        let classifier = L2Classifier::new(Box::new(AlwaysFails), Duration::from_secs(5));
        let request = ClassificationRequest::new("tools/call", None);
        let finding = classifier.classify(&request).await;
        assert_eq!(finding.outcome, L2Outcome::Unknown);
        assert_eq!(finding.confidence, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_fails_open_to_unknown() {
        let classifier = L2Classifier::new(Box::new(NeverResolves), Duration::from_millis(10));
        let request = ClassificationRequest::new("tools/call", None);
        let finding = classifier.classify(&request).await;
        assert_eq!(finding.outcome, L2Outcome::Unknown);
    }

    #[tokio::test]
    async fn mock_backend_round_trips_through_the_wrapper() {
        let classifier = L2Classifier::new(Box::new(MockBackend::new()), Duration::from_secs(5));
        let request = ClassificationRequest::new("tools/call", None);
        let finding = classifier.classify(&request).await;
        assert_eq!(finding.outcome, L2Outcome::No);
        assert_eq!(finding.backend, "mock");
    }
}
