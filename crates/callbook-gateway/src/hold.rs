//! Hold-audio timer armed at the start of each turn.
//!
//! Firing and cancellation resolve under one lock: the timer sends the hold
//! message only while the state is still `Pending`, and `cancel` moves
//! `Pending` to `Cancelled`. Once a turn has sent `StopBackground` no hold
//! message can follow it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use callbook_core::protocol::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Pending,
    Fired,
    Cancelled,
}

pub struct HoldTimer {
    state: Arc<Mutex<HoldState>>,
    token: CancellationToken,
}

fn lock(state: &Mutex<HoldState>) -> MutexGuard<'_, HoldState> {
    // The guarded value is a plain enum, a panic elsewhere cannot leave it torn.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HoldTimer {
    /// Spawn a timer that emits `ServerMessage::hold(audio_ref)` after `delay`.
    pub fn arm(
        delay: Duration,
        audio_ref: impl Into<String>,
        out: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let state = Arc::new(Mutex::new(HoldState::Pending));
        let token = CancellationToken::new();
        let message = ServerMessage::hold(audio_ref);

        let task_state = state.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let mut state = lock(&task_state);
                    if *state == HoldState::Pending {
                        let _ = out.send(message);
                        *state = HoldState::Fired;
                        debug!(?delay, "Hold audio started");
                    }
                }
            }
        });

        Self { state, token }
    }

    /// Stop the timer. Returns true if the hold message was already sent.
    pub fn cancel(&self) -> bool {
        let fired = {
            let mut state = lock(&self.state);
            if *state == HoldState::Pending {
                *state = HoldState::Cancelled;
            }
            *state == HoldState::Fired
        };
        self.token.cancel();
        fired
    }

    pub fn state(&self) -> HoldState {
        *lock(&self.state)
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = HoldTimer::arm(Duration::from_millis(2000), "/audio/hold", tx);

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await, Some(ServerMessage::hold("/audio/hold")));
        assert_eq!(timer.state(), HoldState::Fired);
        assert!(timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_delay_suppresses_hold() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = HoldTimer::arm(Duration::from_millis(2000), "/audio/hold", tx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!timer.cancel());
        assert_eq!(timer.state(), HoldState::Cancelled);

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Sender dropped with the task, nothing was queued.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let timer = HoldTimer::arm(Duration::from_millis(10), "/audio/hold", tx);
        assert!(!timer.cancel());
        assert!(!timer.cancel());
        assert_eq!(timer.state(), HoldState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(HoldTimer::arm(Duration::from_millis(10), "/audio/hold", tx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, None);
    }
}
