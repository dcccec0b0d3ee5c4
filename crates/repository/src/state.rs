//! Per-instance call state and the guards that restore it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::Metadata;

use crate::bus::Publication;

/// Work deferred until the outermost transaction commits.
pub(crate) enum AfterCommit {
    Publish(Publication),
    Callback(Box<dyn FnOnce() + Send>),
}

#[derive(Default)]
pub(crate) struct CallState {
    /// Metadata overlay attached to emitted events
    pub metadata: Metadata,
    /// Topic of the event method currently executing
    pub cause: Option<String>,
    pub events_disabled: bool,
    /// Transaction nesting depth
    pub depth: usize,
    /// An inner level failed and its writes could not be undone
    pub rollback_only: bool,
    pub pending: Vec<AfterCommit>,
}

pub(crate) fn lock(state: &Mutex<CallState>) -> MutexGuard<'_, CallState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts a saved value back into the call state when dropped, on success,
/// error and cancellation alike.
pub(crate) struct Restore<'a, T> {
    state: &'a Mutex<CallState>,
    prior: Option<T>,
    put_back: fn(&mut CallState, T),
}

impl<'a, T> Restore<'a, T> {
    pub fn new(state: &'a Mutex<CallState>, prior: T, put_back: fn(&mut CallState, T)) -> Self {
        Self {
            state,
            prior: Some(prior),
            put_back,
        }
    }
}

impl<T> Drop for Restore<'_, T> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            (self.put_back)(&mut lock(self.state), prior);
        }
    }
}

/// One level of the transaction stack.
///
/// Dropping an unsettled frame discards the after-commit work queued since
/// the frame opened.
pub(crate) struct TransactionFrame<'a> {
    state: &'a Mutex<CallState>,
    mark: usize,
    settled: bool,
}

impl<'a> TransactionFrame<'a> {
    /// Open a frame. Returns the frame and whether it is the outermost one.
    pub fn open(state: &'a Mutex<CallState>) -> (Self, bool) {
        let mut guard = lock(state);
        guard.depth += 1;
        if guard.depth == 1 {
            guard.rollback_only = false;
        }
        let frame = Self {
            state,
            mark: guard.pending.len(),
            settled: false,
        };
        (frame, guard.depth == 1)
    }

    /// Keep the queued work for the enclosing level.
    pub fn settle(mut self) {
        self.settled = true;
    }

    /// Close the outermost frame and hand back everything queued.
    #[allow(clippy::let_and_return)]
    pub fn settle_outermost(mut self) -> Vec<AfterCommit> {
        self.settled = true;
        // release the lock before `self` drops and takes it again
        let pending = std::mem::take(&mut lock(self.state).pending);
        pending
    }
}

impl Drop for TransactionFrame<'_> {
    fn drop(&mut self) {
        let mut guard = lock(self.state);
        guard.depth = guard.depth.saturating_sub(1);
        if !self.settled {
            guard.pending.truncate(self.mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventPayload, Metadata};

    fn publication(topic: &str) -> AfterCommit {
        AfterCommit::Publish(Publication::new(
            topic,
            EventPayload::new("1", Vec::new(), Metadata::new()),
        ))
    }

    #[test]
    fn restore_puts_the_prior_value_back() {
        let state = Mutex::new(CallState::default());
        {
            let prior = lock(&state).cause.replace("blog:post:created".into());
            let _restore = Restore::new(&state, prior, |s: &mut CallState, p| s.cause = p);
            assert!(lock(&state).cause.is_some());
        }
        assert!(lock(&state).cause.is_none());
    }

    #[test]
    fn unsettled_inner_frame_discards_its_work() {
        let state = Mutex::new(CallState::default());

        let (outer, outermost) = TransactionFrame::open(&state);
        assert!(outermost);
        lock(&state).pending.push(publication("a"));

        let (inner, outermost) = TransactionFrame::open(&state);
        assert!(!outermost);
        lock(&state).pending.push(publication("b"));
        drop(inner);

        assert_eq!(lock(&state).pending.len(), 1);
        assert_eq!(lock(&state).depth, 1);

        let pending = outer.settle_outermost();
        assert_eq!(pending.len(), 1);
        assert_eq!(lock(&state).depth, 0);
    }

    #[test]
    fn settled_inner_frame_keeps_its_work() {
        let state = Mutex::new(CallState::default());

        let (outer, _) = TransactionFrame::open(&state);
        let (inner, _) = TransactionFrame::open(&state);
        lock(&state).pending.push(publication("b"));
        inner.settle();

        assert_eq!(outer.settle_outermost().len(), 1);
    }
}
