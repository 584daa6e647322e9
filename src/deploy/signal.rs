// ABOUTME: Cancellation and verification signals delivered into a running deployment.
// ABOUTME: Both are watch channels so late subscribers still see the latest value.

use std::sync::Arc;
use tokio::sync::watch;

/// External verification decision for the Verifying phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject(String),
}

/// Receiving side of a cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never is.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Receiving side of verification verdicts.
#[derive(Debug, Clone)]
pub struct VerdictSignal {
    rx: watch::Receiver<Option<Verdict>>,
}

impl VerdictSignal {
    /// The verdict sent so far, without waiting for one.
    pub fn pending(&self) -> Option<Verdict> {
        self.rx.borrow().clone()
    }

    /// Resolves with the first verdict; pends forever if none arrives.
    pub async fn received(&self) -> Verdict {
        let mut rx = self.rx.clone();
        let verdict = match rx.wait_for(Option::is_some).await {
            Ok(verdict) => verdict.clone(),
            Err(_) => None,
        };
        match verdict {
            Some(verdict) => verdict,
            None => std::future::pending().await,
        }
    }
}

/// Sending sides, held by whoever controls the deployment.
#[derive(Debug, Clone)]
pub(crate) struct SignalSenders {
    cancel: Arc<watch::Sender<bool>>,
    verdict: Arc<watch::Sender<Option<Verdict>>>,
}

impl SignalSenders {
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn send_verdict(&self, verdict: Verdict) {
        self.verdict.send_replace(Some(verdict));
    }
}

pub(crate) fn signal_pair() -> (SignalSenders, CancelSignal, VerdictSignal) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (verdict_tx, verdict_rx) = watch::channel(None);
    (
        SignalSenders {
            cancel: Arc::new(cancel_tx),
            verdict: Arc::new(verdict_tx),
        },
        CancelSignal { rx: cancel_rx },
        VerdictSignal { rx: verdict_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellation_is_observed_after_the_fact() {
        let (senders, cancel, _verdict) = signal_pair();
        senders.cancel();
        assert!(cancel.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), cancel.cancelled())
            .await
            .expect("already-cancelled signal resolves immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn never_signal_pends() {
        let cancel = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_secs(60), cancel.cancelled()).await;
        assert!(result.is_err());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn pending_verdict_is_visible_without_waiting() {
        let (senders, _cancel, verdict) = signal_pair();
        assert_eq!(verdict.pending(), None);
        senders.send_verdict(Verdict::Approve);
        assert_eq!(verdict.pending(), Some(Verdict::Approve));
    }

    #[tokio::test]
    async fn verdict_is_delivered() {
        let (senders, _cancel, verdict) = signal_pair();
        senders.send_verdict(Verdict::Reject("smoke test failed".into()));
        assert_eq!(
            verdict.received().await,
            Verdict::Reject("smoke test failed".into())
        );
    }
}
