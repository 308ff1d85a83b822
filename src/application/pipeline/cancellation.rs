use crate::domain::errors::EngineError;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Creates a linked handle/signal pair.
pub fn cancellation() -> (CancellationHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    let handle = CancellationHandle { tx: Arc::new(tx) };
    let signal = CancelSignal {
        rx: Some(rx),
        deadline: None,
    };
    (handle, signal)
}

/// Owner side: flips every linked [`CancelSignal`] to cancelled.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another signal linked to this handle
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
            deadline: None,
        }
    }
}

/// Observer side, passed by reference into long-running operations.
///
/// Fires when the linked handle cancels or when the deadline passes,
/// whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Adds a deadline; an earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        let flagged = self.rx.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        flagged || expired
    }

    /// `Err(EngineError::Cancelled)` once the signal has fired
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the signal fires; never resolves for [`CancelSignal::never`].
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let flagged = async move {
            match rx.as_mut() {
                Some(rx) => {
                    // Handle dropped without cancelling: wait on the deadline only
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flagged => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flagged.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_not_cancelled() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert!(signal.check().is_ok());
    }

    #[tokio::test]
    async fn test_handle_cancels_all_signals() {
        let (handle, signal) = cancellation();
        let other = handle.signal();
        let cloned = signal.clone();
        assert!(!signal.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
        assert_eq!(cloned.check(), Err(EngineError::Cancelled));
        signal.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let signal = CancelSignal::never().with_timeout(Duration::from_secs(5));
        assert!(!signal.is_cancelled());

        tokio::time::timeout(Duration::from_secs(10), signal.cancelled())
            .await
            .expect("deadline should fire before the outer timeout");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let (handle, signal) = cancellation();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::task::yield_now().await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let signal = CancelSignal::never()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(signal.deadline(), Some(now + Duration::from_secs(1)));
    }
}
