use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};

/// Handed out by a successful acquire.
/// `window` is the index of the window the admission counts against; the
/// window opened at construction is 0 and every reset adds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Admission {
    pub window: u64,
}

/// Point-in-time view of the gate, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub limit: u32,
    pub in_window: u32,
    pub waiting: usize,
    pub window_index: u64,
    pub total_admitted: u64,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct State {
    count: u32,
    window_index: u64,
    waiting: usize,
    total_admitted: u64,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    limit: u32,
    window: Duration,
    state: Mutex<State>,
    /// Blocked callers park here. Notified on every reset and on shutdown.
    capacity: Condvar,
    /// The window clock sleeps here so shutdown can interrupt it.
    clock: Condvar,
}

impl Shared {
    // State is plain counters, so a panic while holding the lock cannot
    // leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check-and-increment. Callers must hold the state lock.
    fn admit(&self, st: &mut State) -> Option<Admission> {
        if st.count >= self.limit {
            return None;
        }
        st.count += 1;
        st.total_admitted += 1;
        Some(Admission {
            window: st.window_index,
        })
    }
}

/// Fixed-window admission gate: at most `limit` acquires succeed per `window`.
///
/// The gate owns a clock thread that resets the window count on a fixed
/// schedule. Share it between callers with an `Arc`; the clock stops on
/// [`RateGate::shutdown`] or when the last handle is dropped.
///
/// A `limit` of 0 is accepted: every acquire blocks until shutdown.
#[derive(Debug)]
pub struct RateGate {
    shared: Arc<Shared>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl RateGate {
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(Error::Configuration(
                "rate gate window must be longer than zero".into(),
            ));
        }
        if Instant::now().checked_add(window).is_none() {
            return Err(Error::Configuration(format!(
                "rate gate window {window:?} is out of range"
            )));
        }
        if limit == 0 {
            warn!("rate gate built with limit 0; every acquire will block until shutdown");
        }

        let shared = Arc::new(Shared {
            limit,
            window,
            state: Mutex::new(State::default()),
            capacity: Condvar::new(),
            clock: Condvar::new(),
        });

        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("regpush-window".into())
                .spawn(move || run_clock(&shared))
                .map_err(|e| Error::Configuration(format!("cannot start window clock: {e}")))?
        };

        info!("rate gate open: {limit} request(s) per {window:?}");
        Ok(Self {
            shared,
            clock: Mutex::new(Some(handle)),
        })
    }

    /// Block until the current window has room, then take one slot.
    ///
    /// Returns [`Error::Closed`] if the gate is shut down before or while waiting.
    pub fn acquire(&self) -> Result<Admission> {
        let mut st = self.shared.lock();
        loop {
            if st.closed {
                return Err(Error::Closed);
            }
            if let Some(admission) = self.shared.admit(&mut st) {
                debug!(
                    "admitted {}/{} in window {}",
                    st.count, self.shared.limit, admission.window
                );
                return Ok(admission);
            }
            st.waiting += 1;
            st = self
                .shared
                .capacity
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
            st.waiting -= 1;
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up with [`Error::TimedOut`]
    /// once `timeout` has passed without capacity.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Admission> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.acquire();
        };

        let mut st = self.shared.lock();
        loop {
            if st.closed {
                return Err(Error::Closed);
            }
            if let Some(admission) = self.shared.admit(&mut st) {
                return Ok(admission);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::TimedOut);
            }
            st.waiting += 1;
            let (guard, _) = self
                .shared
                .capacity
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            st = guard;
            st.waiting -= 1;
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Result<Option<Admission>> {
        let mut st = self.shared.lock();
        if st.closed {
            return Err(Error::Closed);
        }
        Ok(self.shared.admit(&mut st))
    }

    /// Close the gate: blocked and future callers get [`Error::Closed`] and
    /// the window clock is stopped. Calling it again is a no-op.
    pub fn shutdown(&self) {
        {
            let mut st = self.shared.lock();
            if !st.closed {
                st.closed = true;
                info!(
                    "rate gate closing after {} admission(s); releasing {} waiter(s)",
                    st.total_admitted, st.waiting
                );
            }
        }
        self.shared.capacity.notify_all();
        self.shared.clock.notify_all();

        let handle = self
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("window clock thread panicked");
            }
        }
    }

    pub fn stats(&self) -> GateStats {
        let st = self.shared.lock();
        GateStats {
            limit: self.shared.limit,
            in_window: st.count,
            waiting: st.waiting,
            window_index: st.window_index,
            total_admitted: st.total_admitted,
            closed: st.closed,
        }
    }

    pub fn limit(&self) -> u32 {
        self.shared.limit
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for RateGate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Window clock: resets the count once per window on fixed-rate deadlines
/// measured from start. Ticks missed while descheduled collapse into one reset.
fn run_clock(shared: &Shared) {
    let mut next = Instant::now() + shared.window;
    let mut st = shared.lock();

    while !st.closed {
        let now = Instant::now();
        if now < next {
            st = shared
                .clock
                .wait_timeout(st, next - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        let used = st.count;
        st.count = 0;
        st.window_index += 1;
        if used > 0 || st.waiting > 0 {
            debug!(
                "window {} opened ({} admitted in the last one, {} waiting)",
                st.window_index, used, st.waiting
            );
        }
        shared.capacity.notify_all();

        next += shared.window;
        if next <= now {
            next = now + shared.window;
        }
    }
}
