//! Revision cursors for handing DNS changes to the dataplane
//!
//! Changes move through three stages:
//!
//! * **pending** - learned from DNS but the dataplane has not been told
//!   (revision >= `current`)
//! * **handled** - handlers were notified, the dataplane has not yet applied
//!   the result (`applied` < revision < `current`)
//! * **applied** - programmed into the dataplane (revision <= `applied`)
//!
//! Each captured message may carry a completion callback. It is filed by the
//! highest revision the message produced and released once that revision has
//! been applied.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use parking_lot::Mutex;

/// Completion callback attached to a captured DNS message.
pub type Callback = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Where a callback ended up when it was filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filed {
    Pending,
    Handled,
    /// Already live in the dataplane; the caller must run it now.
    Immediate,
}

pub struct RevisionTracker {
    /// Next revision to assign. Everything at or above it is pending.
    current: u64,
    /// Highest revision known to be programmed in the dataplane.
    applied: u64,
    callbacks: Vec<Callback>,
    handled_callbacks: Vec<Callback>,
    needs_sync: bool,
}

impl Default for RevisionTracker {
    fn default() -> Self {
        RevisionTracker::new()
    }
}

impl RevisionTracker {
    pub fn new() -> RevisionTracker {
        // Revision 0 means "no change", so assignment starts at 1.
        RevisionTracker {
            current: 1,
            applied: 0,
            callbacks: Vec::new(),
            handled_callbacks: Vec::new(),
            needs_sync: false,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn needs_sync(&self) -> bool {
        self.needs_sync
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    pub fn handled_callbacks(&self) -> usize {
        self.handled_callbacks.len()
    }

    /// Files `callback` against the highest revision its message produced.
    /// An `Immediate` result hands the callback back for the caller to run.
    pub fn file(&mut self, max_revision: u64, callback: Callback) -> Option<Callback> {
        match self.classify(max_revision) {
            Filed::Pending => {
                self.callbacks.push(callback);
                None
            }
            Filed::Handled => {
                self.handled_callbacks.push(callback);
                None
            }
            Filed::Immediate => Some(callback),
        }
    }

    pub fn classify(&self, max_revision: u64) -> Filed {
        if max_revision >= self.current {
            Filed::Pending
        } else if max_revision <= self.applied {
            Filed::Immediate
        } else {
            Filed::Handled
        }
    }

    /// Closes the pending batch: its callbacks become handled and a new
    /// revision opens.
    pub fn begin_handling(&mut self) {
        let pending = std::mem::take(&mut self.callbacks);
        self.handled_callbacks.extend(pending);
        self.current += 1;
    }

    /// Sticky until the next `mark_applied`, so that repeated handling passes
    /// before an apply cannot lose a required sync.
    pub fn request_sync(&mut self) {
        self.needs_sync = true;
    }

    /// Everything handled so far is now live. Returns the callbacks to release.
    pub fn mark_applied(&mut self) -> Vec<Callback> {
        self.needs_sync = false;
        self.applied = self.current - 1;
        std::mem::take(&mut self.handled_callbacks)
    }
}

/// Runs callbacks in order on one long-lived thread so the dataplane loop
/// and the store lock are never held up by them.
pub struct CallbackRunner {
    batches: Mutex<Option<mpsc::Sender<Vec<Callback>>>>,
}

impl Default for CallbackRunner {
    fn default() -> Self {
        CallbackRunner::new()
    }
}

impl CallbackRunner {
    pub fn new() -> CallbackRunner {
        let (tx, rx) = mpsc::channel::<Vec<Callback>>();

        let spawned = std::thread::Builder::new()
            .name("dns-callbacks".to_string())
            .spawn(move || {
                // Ends once the runner, and with it the sender, is dropped.
                for batch in rx {
                    run_batch(batch);
                }
            });

        let batches = match spawned {
            Ok(_) => Some(tx),
            Err(e) => {
                log::error!("Failed to start callback thread, running callbacks inline: {}", e);
                None
            }
        };

        CallbackRunner {
            batches: Mutex::new(batches),
        }
    }

    /// Queues a batch behind every batch queued before it.
    pub fn run(&self, callbacks: Vec<Callback>) {
        if callbacks.is_empty() {
            return;
        }

        let callbacks = match &*self.batches.lock() {
            Some(tx) => match tx.send(callbacks) {
                Ok(()) => return,
                Err(mpsc::SendError(callbacks)) => callbacks,
            },
            None => callbacks,
        };

        log::warn!("Callback thread unavailable, running {} callbacks inline", callbacks.len());
        run_batch(callbacks);
    }
}

fn run_batch(callbacks: Vec<Callback>) {
    for callback in callbacks {
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            log::error!("Message callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn noop() -> Callback {
        Box::new(|| {})
    }

    #[test]
    fn test_initial_cursors() {
        let tracker = RevisionTracker::new();
        assert_eq!(tracker.current(), 1);
        assert_eq!(tracker.applied(), 0);
        assert!(!tracker.needs_sync());
    }

    #[test]
    fn test_classification() {
        let mut tracker = RevisionTracker::new();

        // Revision 0 means the message changed nothing.
        assert_eq!(tracker.classify(0), Filed::Immediate);
        assert_eq!(tracker.classify(1), Filed::Pending);

        tracker.begin_handling();
        assert_eq!(tracker.classify(1), Filed::Handled);
        assert_eq!(tracker.classify(2), Filed::Pending);

        tracker.mark_applied();
        assert_eq!(tracker.applied(), 1);
        assert_eq!(tracker.classify(1), Filed::Immediate);
        assert_eq!(tracker.classify(2), Filed::Pending);
    }

    #[test]
    fn test_callbacks_move_between_buckets() {
        let mut tracker = RevisionTracker::new();

        assert!(tracker.file(1, noop()).is_none());
        assert!(tracker.file(1, noop()).is_none());
        assert_eq!(tracker.pending_callbacks(), 2);

        tracker.begin_handling();
        assert_eq!(tracker.pending_callbacks(), 0);
        assert_eq!(tracker.handled_callbacks(), 2);

        // A repeat of the handled message lands with the handled ones.
        assert!(tracker.file(1, noop()).is_none());
        assert_eq!(tracker.handled_callbacks(), 3);

        assert_eq!(tracker.mark_applied().len(), 3);
        assert!(tracker.file(1, noop()).is_some());
    }

    #[test]
    fn test_sync_flag_is_sticky_until_applied() {
        let mut tracker = RevisionTracker::new();
        tracker.request_sync();
        tracker.begin_handling();
        tracker.begin_handling();
        assert!(tracker.needs_sync());
        assert_eq!(tracker.current(), 3);

        tracker.mark_applied();
        assert!(!tracker.needs_sync());
        assert_eq!(tracker.applied(), 2);
    }

    fn recorder(seen: &Arc<Mutex<Vec<i32>>>, i: i32) -> Callback {
        let seen = seen.clone();
        Box::new(move || seen.lock().push(i))
    }

    fn wait_for(seen: &Arc<Mutex<Vec<i32>>>, len: usize) {
        for _ in 0..500 {
            if seen.lock().len() >= len {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_batches_run_in_order() {
        let runner = CallbackRunner::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        runner.run((0..3).map(|i| recorder(&seen, i)).collect());
        runner.run(Vec::new());
        runner.run((3..6).map(|i| recorder(&seen, i)).collect());

        wait_for(&seen, 6);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_batches_share_one_thread() {
        let runner = CallbackRunner::new();
        let threads = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..4 {
            let threads = threads.clone();
            runner.run(vec![Box::new(move || {
                threads.lock().push(std::thread::current().id())
            }) as Callback]);
        }

        for _ in 0..500 {
            if threads.lock().len() == 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let threads = threads.lock();
        assert_eq!(threads.len(), 4);
        assert!(threads.iter().all(|id| *id == threads[0]));
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[test]
    fn test_panicking_callback_does_not_stop_the_runner() {
        let runner = CallbackRunner::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        runner.run(vec![
            recorder(&seen, 1),
            Box::new(|| panic!("callback failure")) as Callback,
            recorder(&seen, 2),
        ]);
        runner.run(vec![recorder(&seen, 3)]);

        wait_for(&seen, 3);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
