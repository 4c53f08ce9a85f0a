//! Logical clock used by the engine and its periodic update timer.
//!
//! This module provides:
//! - `TimeSource` trait for abstracting the connection clock
//! - `RealTime` implementation delegating to tokio
//! - `VirtualTime` implementation for deterministic tests and simulation

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
    task::{Context, Poll, Waker},
    time::Duration,
};

use parking_lot::Mutex;

/// Unique identifier for a wakeup registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeupId(u64);

impl WakeupId {
    /// Returns the inner ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Wakeup {
    deadline: u64,
    id: WakeupId,
}

impl PartialEq for Wakeup {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for Wakeup {}

impl PartialOrd for Wakeup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wakeup {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by deadline, ties resolved in registration order
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.id.0.cmp(&self.id.0),
            ord => ord,
        }
    }
}

/// Clock abstraction shared by the engine and its timers.
///
/// Production code runs on [`RealTime`]; tests and the simulator drive a
/// [`VirtualTime`] explicitly so every ACK, loss and timer tick lands at a
/// reproducible instant.
pub trait TimeSource: Send + Sync + Clone + 'static {
    /// Returns the current time as nanoseconds since an arbitrary epoch.
    fn now_nanos(&self) -> u64;

    /// Returns the current time as a Duration since an arbitrary epoch.
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }

    /// Creates a future that completes after the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Creates a future that completes when the deadline is reached or returns
    /// immediately if the deadline has passed.
    fn sleep_until(&self, deadline_nanos: u64) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Wall-clock time backed by tokio timers.
#[derive(Clone)]
pub struct RealTime {
    epoch: std::time::Instant,
}

impl Default for RealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl TimeSource for RealTime {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn sleep_until(&self, deadline_nanos: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let now = self.now_nanos();
        if deadline_nanos <= now {
            Box::pin(std::future::ready(()))
        } else {
            Box::pin(tokio::time::sleep(Duration::from_nanos(deadline_nanos - now)))
        }
    }
}

#[derive(Debug)]
struct VirtualTimeState {
    current_nanos: AtomicU64,
    next_wakeup_id: AtomicU64,
    pending_wakeups: Mutex<BinaryHeap<Wakeup>>,
    pending_wakers: Mutex<Vec<(WakeupId, Waker)>>,
}

impl VirtualTimeState {
    fn is_pending(&self, id: WakeupId) -> bool {
        self.pending_wakeups.lock().iter().any(|w| w.id == id)
    }

    fn forget(&self, id: WakeupId) {
        self.pending_wakeups.lock().retain(|w| w.id != id);
        self.pending_wakers.lock().retain(|(wid, _)| *wid != id);
    }
}

/// Virtual clock that only moves when stepped with `advance()` or `advance_to()`.
///
/// Wakeups sharing a deadline fire in registration order. A sleep future that
/// is dropped before firing removes its registration, so cancelled timers do
/// not leave stale entries behind.
#[derive(Clone)]
pub struct VirtualTime {
    state: Arc<VirtualTimeState>,
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTime {
    /// Creates a new virtual clock starting at 0.
    pub fn new() -> Self {
        Self::with_initial_time(0)
    }

    /// Creates a new virtual clock starting at the given nanoseconds.
    pub fn with_initial_time(initial_nanos: u64) -> Self {
        Self {
            state: Arc::new(VirtualTimeState {
                current_nanos: AtomicU64::new(initial_nanos),
                next_wakeup_id: AtomicU64::new(0),
                pending_wakeups: Mutex::new(BinaryHeap::new()),
                pending_wakers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the number of registered sleeps that have not fired yet.
    pub fn pending_wakeup_count(&self) -> usize {
        self.state.pending_wakeups.lock().len()
    }

    /// Returns the deadline of the next pending wakeup, if any.
    pub fn next_wakeup_deadline(&self) -> Option<u64> {
        self.state.pending_wakeups.lock().peek().map(|w| w.deadline)
    }

    /// Advances time by the given duration, waking all expired sleeps.
    ///
    /// Returns the wakeups that fired, in order.
    pub fn advance(&self, duration: Duration) -> Vec<WakeupId> {
        let target = self
            .state
            .current_nanos
            .load(AtomicOrdering::SeqCst)
            .saturating_add(duration.as_nanos() as u64);
        self.advance_to(target)
    }

    /// Advances time to the given absolute nanoseconds, waking all expired sleeps.
    pub fn advance_to(&self, target_nanos: u64) -> Vec<WakeupId> {
        let current = self.state.current_nanos.load(AtomicOrdering::SeqCst);
        if target_nanos <= current {
            return Vec::new();
        }
        self.state
            .current_nanos
            .store(target_nanos, AtomicOrdering::SeqCst);

        let mut triggered = Vec::new();
        let mut to_wake = Vec::new();
        {
            let mut pending = self.state.pending_wakeups.lock();
            let mut wakers = self.state.pending_wakers.lock();
            while pending
                .peek()
                .is_some_and(|wakeup| wakeup.deadline <= target_nanos)
            {
                let Some(wakeup) = pending.pop() else {
                    break;
                };
                triggered.push(wakeup.id);
                if let Some(pos) = wakers.iter().position(|(id, _)| *id == wakeup.id) {
                    to_wake.push(wakers.swap_remove(pos).1);
                }
            }
        }

        for waker in to_wake {
            waker.wake();
        }
        triggered
    }

    fn register_wakeup(&self, deadline: u64) -> WakeupId {
        let id = WakeupId(
            self.state
                .next_wakeup_id
                .fetch_add(1, AtomicOrdering::SeqCst),
        );
        self.state
            .pending_wakeups
            .lock()
            .push(Wakeup { deadline, id });
        id
    }
}

impl TimeSource for VirtualTime {
    fn now_nanos(&self) -> u64 {
        self.state.current_nanos.load(AtomicOrdering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let deadline = self.now_nanos().saturating_add(duration.as_nanos() as u64);
        self.sleep_until(deadline)
    }

    fn sleep_until(&self, deadline_nanos: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        if deadline_nanos <= self.now_nanos() {
            return Box::pin(std::future::ready(()));
        }
        let id = self.register_wakeup(deadline_nanos);
        Box::pin(VirtualSleep {
            id,
            state: self.state.clone(),
            fired: false,
        })
    }
}

/// Future returned by `VirtualTime::sleep()`.
struct VirtualSleep {
    id: WakeupId,
    state: Arc<VirtualTimeState>,
    fired: bool,
}

impl Future for VirtualSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.state.is_pending(self.id) {
            self.fired = true;
            return Poll::Ready(());
        }
        let mut wakers = self.state.pending_wakers.lock();
        match wakers.iter().position(|(id, _)| *id == self.id) {
            Some(pos) => wakers[pos].1 = cx.waker().clone(),
            None => wakers.push((self.id, cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl Drop for VirtualSleep {
    fn drop(&mut self) {
        if !self.fired {
            self.state.forget(self.id);
        }
    }
}
