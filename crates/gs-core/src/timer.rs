//! Named, cancellable timers
//!
//! State machines keep one `TimerHandle` per purpose (heartbeat, health
//! check, reconnect, ...) and cancel it explicitly when it is superseded.
//! A cancelled timer never invokes its callback again. Dropping a handle
//! cancels it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled one-shot or repeating callback
#[derive(Debug)]
pub struct TimerHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `callback` once after `delay`
    pub fn once<F, Fut>(name: &'static str, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tracing::trace!(timer = name, "timer fired");
                    callback().await;
                }
            }
        });

        Self { name, cancel, task }
    }

    /// Run `callback` immediately and then every `period` until cancelled
    /// or until the callback returns `false`
    pub fn repeating<F, Fut>(name: &'static str, period: Duration, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let keep_going = tokio::select! {
                            biased;
                            _ = token.cancelled() => false,
                            keep_going = callback() => keep_going,
                        };
                        if !keep_going {
                            break;
                        }
                    }
                }
            }
            tracing::trace!(timer = name, "timer stopped");
        });

        Self { name, cancel, task }
    }

    /// Cancel the timer. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() && !self.task.is_finished() {
            tracing::trace!(timer = self.name, "timer cancelled");
        }
        self.cancel.cancel();
    }

    /// Whether the timer may still fire
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cancel and clear an optional timer slot
pub fn cancel_slot(slot: &mut Option<TimerHandle>) {
    if let Some(timer) = slot.take() {
        timer.cancel();
    }
}
