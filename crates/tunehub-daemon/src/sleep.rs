//! Cancellable delayed-stop scheduler. At most one pending timer per
//! process; every new schedule replaces (and cancels) the previous one.

use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// Sent into the daemon event channel when a timer fires; the main loop
/// routes it to `PlaybackController::stop`.
#[derive(Debug, Clone)]
pub struct SleepFired {
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    /// No timer was pending. Reported distinctly, not folded into success.
    NotPending,
}

struct Pending {
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct SleepTimer {
    pending: Mutex<Option<Pending>>,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer. A previously pending timer is cancelled first.
    pub async fn schedule(
        &self,
        after: Duration,
        zone: Option<String>,
        fired_tx: mpsc::Sender<SleepFired>,
    ) {
        let mut guard = self.pending.lock().await;
        if let Some(prev) = guard.take() {
            prev.handle.abort();
            info!("sleep: replaced pending timer");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = fired_tx.send(SleepFired { zone }).await;
        });

        *guard = Some(Pending { handle });
        info!("sleep: armed, fires in {:?}", after);
    }

    pub async fn cancel(&self) -> CancelOutcome {
        let mut guard = self.pending.lock().await;
        match guard.take() {
            Some(pending) => {
                pending.handle.abort();
                info!("sleep: cancelled pending timer");
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NotPending,
        }
    }

    pub async fn is_pending(&self) -> bool {
        let mut guard = self.pending.lock().await;
        // A fired timer leaves a finished task behind; treat it as spent.
        if guard.as_ref().map(|p| p.handle.is_finished()).unwrap_or(false) {
            *guard = None;
        }
        guard.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fires_after_deadline() {
        let timer = SleepTimer::new();
        let (tx, mut rx) = mpsc::channel(4);

        timer
            .schedule(Duration::from_millis(20), Some("Den".into()), tx)
            .await;
        assert!(timer.is_pending().await);

        let fired = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timer did not fire")
            .unwrap();
        assert_eq!(fired.zone.as_deref(), Some("Den"));
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let timer = SleepTimer::new();
        let (tx, mut rx) = mpsc::channel(4);

        timer.schedule(Duration::from_millis(30), None, tx).await;
        assert_eq!(timer.cancel().await, CancelOutcome::Cancelled);

        let res = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        // Channel closes without a message: the task was aborted.
        assert!(matches!(res, Ok(None)));
    }

    #[tokio::test]
    async fn test_cancel_without_pending_reports_not_pending() {
        let timer = SleepTimer::new();
        assert_eq!(timer.cancel().await, CancelOutcome::NotPending);
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous() {
        let timer = SleepTimer::new();
        let (tx, mut rx) = mpsc::channel(4);

        timer
            .schedule(Duration::from_millis(10), Some("old".into()), tx.clone())
            .await;
        timer
            .schedule(Duration::from_millis(40), Some("new".into()), tx)
            .await;

        let fired = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .expect("replacement timer did not fire")
            .unwrap();
        assert_eq!(fired.zone.as_deref(), Some("new"));
        // Only the replacement fires.
        let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(extra, Ok(None) | Err(_)));
    }
}
