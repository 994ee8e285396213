//! Cooperative cancellation for agent loops
//!
//! A [`StopSignal`] is a set-once latch shared by every long-running loop in
//! an agent invocation: the audio read loop, the transcript receive loop, and
//! the playback loop all wait on it at their suspension points. OS interrupt
//! signals (SIGINT, SIGTERM) are the only writers; the first one wins and the
//! latch never resets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Set-once, multi-reader stop latch.
///
/// Cloning is cheap; all clones observe the same latch. `wait()` suspends
/// without polling until the latch is set.
#[derive(Debug, Clone)]
pub struct StopSignal {
    fired: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Create a new, unset stop signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
        }
    }

    /// Set the latch. Returns true if this call was the one that set it;
    /// subsequent calls are no-ops and return false.
    pub fn set(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        // send_replace updates the value even when no receiver is
        // subscribed yet; a plain send would not
        self.tx.send_replace(true);
        true
    }

    /// Check the latch without blocking
    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until the latch is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for checks the current value first, so a set() that happened
        // before the subscription is not missed.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire SIGINT and SIGTERM to the given stop signal.
///
/// Handlers live for the rest of the process; repeated signals after the
/// first are ignored by the latch.
pub fn install_handlers(stop: &StopSignal) -> std::io::Result<()> {
    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let mut sig = signal(kind)?;
        let stop = stop.clone();
        tokio::spawn(async move {
            while sig.recv().await.is_some() {
                if stop.set() {
                    tracing::info!("Received {}, stopping...", name);
                } else {
                    tracing::debug!("Received {} but already stopping", name);
                }
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_signal_is_unset() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
    }

    #[test]
    fn test_set_is_first_wins() {
        let stop = StopSignal::new();
        assert!(stop.set());
        assert!(!stop.set());
        assert!(stop.is_set());
    }

    #[test]
    fn test_clones_share_the_latch() {
        let stop = StopSignal::new();
        let other = stop.clone();
        stop.set();
        assert!(other.is_set());
    }

    #[tokio::test]
    async fn test_wait_returns_after_set() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.set();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake after set")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_set() {
        let stop = StopSignal::new();
        stop.set();
        tokio::time::timeout(Duration::from_millis(100), stop.wait())
            .await
            .expect("wait on a set latch should not block");
    }
}
