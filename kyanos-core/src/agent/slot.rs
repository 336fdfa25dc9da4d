//! Capacity-1 blocking handoff between the daemon's callback threads and the operator side.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, PartialEq, Eq)]
pub enum SendError<T> {
    Full(T),
    Closed(T),
    TimedOut(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    Closed,
    TimedOut,
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// Holds at most one undelivered value. Sending into a full slot blocks until it is received.
pub struct HandoffSlot<T> {
    state: Mutex<SlotState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Default for HandoffSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.send_deadline(value, None)
    }

    pub fn send_deadline(&self, value: T, deadline: Option<Instant>) -> Result<(), SendError<T>> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(SendError::Closed(value));
            }
            if state.value.is_none() {
                state.value = Some(value);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            let (guard, timed_out) = wait_until(&self.not_full, state, deadline);
            state = guard;
            if timed_out && state.value.is_some() && !state.closed {
                return Err(SendError::TimedOut(value));
            }
        }
    }

    /// Never blocks; fails with `Full` if a value is already waiting.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(SendError::Closed(value));
        }
        if state.value.is_some() {
            return Err(SendError::Full(value));
        }
        state.value = Some(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks for the next value. `None` once closed and drained.
    pub fn recv(&self) -> Option<T> {
        self.recv_deadline(None).ok()
    }

    pub fn recv_deadline(&self, deadline: Option<Instant>) -> Result<T, RecvError> {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                drop(state);
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(RecvError::Closed);
            }
            let (guard, timed_out) = wait_until(&self.not_empty, state, deadline);
            state = guard;
            if timed_out && state.value.is_none() && !state.closed {
                return Err(RecvError::TimedOut);
            }
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        let value = self.lock().value.take();
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    pub fn is_full(&self) -> bool {
        self.lock().value.is_some()
    }

    /// Wakes every waiter. Pending values can still be received; new sends fail.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Waits on `cv` until notified or `deadline` passes. The flag is true once the deadline is reached.
pub(crate) fn wait_until<'a, S>(
    cv: &Condvar,
    guard: MutexGuard<'a, S>,
    deadline: Option<Instant>,
) -> (MutexGuard<'a, S>, bool) {
    match deadline {
        None => (cv.wait(guard).unwrap_or_else(PoisonError::into_inner), false),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return (guard, true);
            }
            let (guard, _) = cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            (guard, Instant::now() >= deadline)
        }
    }
}
