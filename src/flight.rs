//! Request coalescing for concurrent loads of the same key.
//!
//! [`FlightGroup::execute`] guarantees that, per key, at most one
//! computation runs at a time. The first caller for a key becomes the
//! *leader* and runs the closure on its own thread; callers that arrive
//! while it is running become *waiters*, block on the call's completion
//! signal, and receive a clone of the leader's result.
//!
//! ```text
//!   thread A ─ execute("Tom") ──► Leader ──► f() ────────► publish ─► remove
//!   thread B ─ execute("Tom") ──► Waiter ──► wait ──────────┘ clone
//!   thread C ─ execute("Tom") ──► Waiter ──► wait ──────────┘ clone
//!   thread D ─ execute("Tom") ────────────────────────────────────────► Leader (fresh call)
//! ```
//!
//! The pending entry is removed from the table on every exit path, so a
//! caller that arrives after completion starts a fresh computation. If the
//! leader's closure panics, its waiters are woken and one of them retries
//! as the new leader; the panic itself only unwinds the leader's thread.
//!
//! ```
//! use peercache::flight::FlightGroup;
//!
//! let flights: FlightGroup<u32> = FlightGroup::new();
//! assert_eq!(flights.execute("answer", || 42), 42);
//! assert_eq!(flights.in_flight(), 0);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

/// How a caller took part in a coalesced call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    /// The caller ran the closure.
    Leader,
    /// The caller received another caller's result.
    Joined,
}

enum CallState<T> {
    Running,
    Done(T),
    Abandoned,
}

struct Call<T> {
    state: Mutex<CallState<T>>,
    done: Condvar,
    waiters: AtomicUsize,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Running),
            done: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Blocks until the leader finishes, then leaves the waiter count.
    /// `None` means the leader panicked.
    fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        while matches!(*state, CallState::Running) {
            self.done.wait(&mut state);
        }
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        match &*state {
            CallState::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn publish(&self, outcome: CallState<T>) {
        *self.state.lock() = outcome;
        self.done.notify_all();
    }
}

enum Role<T> {
    Leader(Arc<Call<T>>),
    Waiter(Arc<Call<T>>),
}

/// Deduplicates concurrent computations keyed by string.
pub struct FlightGroup<T> {
    calls: Mutex<FxHashMap<String, Arc<Call<T>>>>,
}

impl<T: Clone> FlightGroup<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(FxHashMap::default()),
        }
    }

    /// Runs `f` for `key` unless a call for `key` is already in flight, in
    /// which case blocks and returns that call's result instead.
    pub fn execute<F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.execute_with_role(key, f).0
    }

    /// Like [`execute`](Self::execute), also reporting whether this caller
    /// ran `f` or joined another caller's run.
    pub fn execute_with_role<F>(&self, key: &str, f: F) -> (T, FlightRole)
    where
        F: FnOnce() -> T,
    {
        loop {
            match self.claim(key) {
                Role::Leader(call) => return (self.lead(key, call, f), FlightRole::Leader),
                Role::Waiter(call) => {
                    if let Some(value) = call.wait() {
                        return (value, FlightRole::Joined);
                    }
                    tracing::debug!(key, "in-flight call abandoned, retrying as leader");
                },
            }
        }
    }

    /// Number of keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of callers currently blocked on the in-flight call for `key`.
    ///
    /// A caller stops counting once it wakes, whether it took the result or
    /// went on to retry after an abandoned call.
    pub fn waiters(&self, key: &str) -> usize {
        self.calls
            .lock()
            .get(key)
            .map_or(0, |call| call.waiters.load(Ordering::Acquire))
    }

    fn claim(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key) {
            call.waiters.fetch_add(1, Ordering::AcqRel);
            return Role::Waiter(Arc::clone(call));
        }
        let call = Arc::new(Call::new());
        calls.insert(key.to_owned(), Arc::clone(&call));
        Role::Leader(call)
    }

    fn lead<F>(&self, key: &str, call: Arc<Call<T>>, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut guard = LeaderGuard {
            flights: self,
            key,
            call,
            finished: false,
        };
        let value = f();
        guard.finish(value.clone());
        value
    }

    fn release(&self, key: &str, call: &Arc<Call<T>>) {
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, call)) {
            calls.remove(key);
        }
    }
}

impl<T: Clone> Default for FlightGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FlightGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGroup")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Publishes the leader's outcome and clears the pending entry, including
/// when the leader unwinds.
struct LeaderGuard<'a, T: Clone> {
    flights: &'a FlightGroup<T>,
    key: &'a str,
    call: Arc<Call<T>>,
    finished: bool,
}

impl<T: Clone> LeaderGuard<'_, T> {
    fn finish(&mut self, value: T) {
        self.call.publish(CallState::Done(value));
        self.flights.release(self.key, &self.call);
        self.finished = true;
    }
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.call.publish(CallState::Abandoned);
            self.flights.release(self.key, &self.call);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Barrier;
    use std::thread;

    fn wait_for_waiters<T: Clone>(flights: &FlightGroup<T>, key: &str, n: usize) {
        while flights.waiters(key) < n {
            thread::yield_now();
        }
    }

    #[test]
    fn sequential_calls_run_each_time() {
        let flights = FlightGroup::new();
        let runs = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = flights.execute("k", || runs.fetch_add(1, Ordering::SeqCst) + 1);
            assert!(value >= 1);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn concurrent_callers_share_one_run() {
        const CALLERS: usize = 16;
        let flights = Arc::new(FlightGroup::<Result<String, String>>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flights.execute_with_role("Tom", || {
                        wait_for_waiters(&flights, "Tom", CALLERS - 1);
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok("630".to_string())
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(r, _)| r.as_deref() == Ok("630")));
        let leaders = results
            .iter()
            .filter(|(_, role)| *role == FlightRole::Leader)
            .count();
        assert_eq!(leaders, 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn errors_are_shared_and_cleared() {
        let flights = Arc::new(FlightGroup::<Result<u8, String>>::new());
        let barrier = Arc::new(Barrier::new(2));

        let joiner = {
            let flights = Arc::clone(&flights);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                wait_for_in_flight(&flights);
                flights.execute("bad", || Ok(1))
            })
        };

        let leader = flights.execute("bad", || {
            barrier.wait();
            wait_for_waiters(&flights, "bad", 1);
            Err("not exist".to_string())
        });

        assert_eq!(leader, Err("not exist".to_string()));
        assert_eq!(joiner.join().unwrap(), Err("not exist".to_string()));
        assert_eq!(flights.in_flight(), 0);
        assert_eq!(flights.execute("bad", || Ok(2)), Ok(2));
    }

    fn wait_for_in_flight<T: Clone>(flights: &FlightGroup<T>) {
        while flights.in_flight() == 0 {
            thread::yield_now();
        }
    }

    #[test]
    fn woken_waiters_leave_the_count() {
        let call = Arc::new(Call::<u32>::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                call.waiters.fetch_add(1, Ordering::AcqRel);
                let call = Arc::clone(&call);
                thread::spawn(move || call.wait())
            })
            .collect();
        assert_eq!(call.waiters.load(Ordering::Acquire), 3);

        call.publish(CallState::Done(9));
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(9));
        }
        assert_eq!(call.waiters.load(Ordering::Acquire), 0);
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let flights = FlightGroup::new();
        let outer = flights.execute("a", || flights.execute("b", || 7) + 1);
        assert_eq!(outer, 8);
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn panicking_leader_hands_off_to_waiter() {
        let flights = Arc::new(FlightGroup::<u32>::new());
        let barrier = Arc::new(Barrier::new(2));

        let waiter = {
            let flights = Arc::clone(&flights);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                wait_for_in_flight(&flights);
                flights.execute_with_role("k", || 5)
            })
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            flights.execute("k", || {
                barrier.wait();
                wait_for_waiters(&flights, "k", 1);
                panic!("loader exploded");
            })
        }));

        assert!(result.is_err());
        assert_eq!(waiter.join().unwrap(), (5, FlightRole::Leader));
        assert_eq!(flights.in_flight(), 0);
    }
}
