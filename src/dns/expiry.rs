//! Mapping expiry timers
//!
//! Timers never touch the store. When one fires it enqueues an
//! `ExpirySignal`, and the store's event loop decides under its lock whether
//! the mapping really has expired, since a refresh may have raced the timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

/// A name -> value mapping whose timer has fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirySignal {
    pub name: String,
    pub value: String,
}

/// Source of the current time, swappable so that tests can move it forward.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle to a scheduled expiry; cancelling it stops the signal being sent.
#[derive(Debug, Default)]
pub struct TimerHandle {
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// A handle not backed by any task.
    pub fn detached() -> TimerHandle {
        TimerHandle { abort: None }
    }

    pub fn cancel(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// Arranges for an `ExpirySignal` to be delivered after a delay.
pub trait ExpiryScheduler: Send + Sync {
    fn schedule(&self, after: Duration, signal: ExpirySignal) -> TimerHandle;
}

/// Schedules expiries as sleeping tasks on the current tokio runtime.
pub struct TokioExpiryScheduler {
    sender: UnboundedSender<ExpirySignal>,
}

impl TokioExpiryScheduler {
    pub fn new(sender: UnboundedSender<ExpirySignal>) -> TokioExpiryScheduler {
        TokioExpiryScheduler { sender }
    }
}

impl ExpiryScheduler for TokioExpiryScheduler {
    fn schedule(&self, after: Duration, signal: ExpirySignal) -> TimerHandle {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "No runtime to schedule expiry of {} -> {}; mapping will only be dropped on reset",
                    signal.name,
                    signal.value
                );
                return TimerHandle::detached();
            }
        };

        let sender = self.sender.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(after).await;
            // The receiver only goes away when the store is dropped.
            let _ = sender.send(signal);
        });

        TimerHandle {
            abort: Some(task.abort_handle()),
        }
    }
}

impl<T: ExpiryScheduler + ?Sized> ExpiryScheduler for Arc<T> {
    fn schedule(&self, after: Duration, signal: ExpirySignal) -> TimerHandle {
        (**self).schedule(after, signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_signal_sent_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioExpiryScheduler::new(tx);

        let _handle = scheduler.schedule(
            Duration::from_secs(5),
            ExpirySignal {
                name: "a.com".to_string(),
                value: "10.0.0.1".to_string(),
            },
        );

        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(6)).await;

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.name, "a.com");
        assert_eq!(signal.value, "10.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_stays_quiet() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioExpiryScheduler::new(tx);

        let mut handle = scheduler.schedule(
            Duration::from_secs(5),
            ExpirySignal {
                name: "a.com".to_string(),
                value: "10.0.0.1".to_string(),
            },
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_runtime_gives_detached_handle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = TokioExpiryScheduler::new(tx);
        let handle = scheduler.schedule(
            Duration::from_secs(1),
            ExpirySignal {
                name: "a.com".to_string(),
                value: "b.com".to_string(),
            },
        );
        assert!(handle.abort.is_none());
    }
}
