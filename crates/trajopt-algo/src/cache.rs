//! Bounded pool of problem snapshots for concurrent grid-point evaluation.
//!
//! Every worker that evaluates a grid point checks out one [`ProblemRep`]
//! exclusively, uses it, and hands it back. Snapshots are built lazily by
//! [`ContinuousProblem::create_rep`] the first time demand exceeds the idle
//! supply, and never beyond the pool's capacity. Once built they are reused
//! across grid points and across solves.
//!
//! ```text
//!   acquire()                                    drop / release()
//!  ───────────►  idle? ──yes──► hand out  ───────────────────────►  idle
//!                  │no
//!                  ▼
//!           created < capacity? ──yes──► create_rep() ──► hand out
//!                  │no
//!                  ▼
//!           wait for a release
//! ```
//!
//! A snapshot that was involved in a failed evaluation may hold corrupt
//! scratch state. [`RepresentationPool::discard`] drops it and frees its slot
//! so a fresh one can be built on demand. A guard dropped while its thread
//! panics is discarded the same way, and a panicking `create_rep` gives its
//! reserved slot back.

use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;
use trajopt_core::{ContinuousProblem, ProblemRep, TrajError, TrajResult};

struct PoolState {
    idle: Vec<Box<dyn ProblemRep>>,
    /// Snapshots alive right now, idle or checked out, including slots
    /// reserved for snapshots under construction.
    created: usize,
}

/// Thread-safe pool of snapshots built from one continuous problem.
pub struct RepresentationPool {
    problem: Arc<dyn ContinuousProblem>,
    capacity: usize,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl RepresentationPool {
    /// Create an empty pool that will hold at most `capacity` snapshots
    /// (at least one).
    pub fn new(problem: Arc<dyn ContinuousProblem>, capacity: usize) -> Self {
        Self {
            problem,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of snapshots currently alive (idle or checked out).
    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    /// Number of idle snapshots.
    pub fn available(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn problem(&self) -> &Arc<dyn ContinuousProblem> {
        &self.problem
    }

    /// Check out a snapshot, building one if none is idle and the pool is
    /// below capacity, or blocking until another thread releases one.
    ///
    /// A construction failure is returned to the caller and the reserved
    /// slot is freed; nothing is added to the pool.
    pub fn acquire(&self) -> TrajResult<PooledRep<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(rep) = state.idle.pop() {
                return Ok(PooledRep::new(self, rep));
            }
            if state.created < self.capacity {
                state.created += 1;
                let index = state.created;
                drop(state);
                return self.construct(index);
            }
            self.released.wait(&mut state);
        }
    }

    /// Like [`acquire`](Self::acquire) but never blocks. Returns `Ok(None)`
    /// when every slot is checked out.
    pub fn try_acquire(&self) -> TrajResult<Option<PooledRep<'_>>> {
        let mut state = self.state.lock();
        if let Some(rep) = state.idle.pop() {
            return Ok(Some(PooledRep::new(self, rep)));
        }
        if state.created < self.capacity {
            state.created += 1;
            let index = state.created;
            drop(state);
            return self.construct(index).map(Some);
        }
        Ok(None)
    }

    /// Return a snapshot to the pool. Equivalent to dropping the guard.
    pub fn release(&self, guard: PooledRep<'_>) {
        debug_assert!(std::ptr::eq(guard.pool, self));
        drop(guard);
    }

    /// Destroy a snapshot whose internal state can no longer be trusted.
    pub fn discard(&self, mut guard: PooledRep<'_>) {
        debug_assert!(std::ptr::eq(guard.pool, self));
        if guard.rep.take().is_some() {
            self.free_slot();
            debug!("discarded problem snapshot");
        }
    }

    // Called without the lock held so slow model construction does not
    // stall other workers. The slot is already counted in `created`.
    fn construct(&self, index: usize) -> TrajResult<PooledRep<'_>> {
        debug!(
            snapshot = index,
            capacity = self.capacity,
            "constructing problem snapshot"
        );
        let mut slot = Reservation {
            pool: self,
            held: true,
        };
        let rep = self
            .problem
            .create_rep()
            .map_err(|err| TrajError::Snapshot(format!("{err:#}")))?;
        slot.held = false;
        Ok(PooledRep::new(self, rep))
    }

    fn free_slot(&self) {
        let mut state = self.state.lock();
        state.created -= 1;
        drop(state);
        self.released.notify_one();
    }

    fn give_back(&self, rep: Box<dyn ProblemRep>) {
        let mut state = self.state.lock();
        state.idle.push(rep);
        drop(state);
        self.released.notify_one();
    }
}

impl std::fmt::Debug for RepresentationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RepresentationPool")
            .field("problem", &self.problem.info().name)
            .field("capacity", &self.capacity)
            .field("created", &state.created)
            .field("idle", &state.idle.len())
            .finish()
    }
}

/// A counted slot whose snapshot is still being built. Freed on drop unless
/// construction succeeded, which covers both errors and unwinding.
struct Reservation<'a> {
    pool: &'a RepresentationPool,
    held: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.held {
            self.pool.free_slot();
        }
    }
}

/// Exclusive checkout of one snapshot. Returns it to the pool on drop, or
/// discards it when dropped during a panic.
pub struct PooledRep<'a> {
    pool: &'a RepresentationPool,
    rep: Option<Box<dyn ProblemRep>>,
}

impl<'a> PooledRep<'a> {
    fn new(pool: &'a RepresentationPool, rep: Box<dyn ProblemRep>) -> Self {
        Self {
            pool,
            rep: Some(rep),
        }
    }
}

impl Deref for PooledRep<'_> {
    type Target = dyn ProblemRep;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the snapshot, and both consume the guard.
        self.rep.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledRep<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.rep.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledRep<'_> {
    fn drop(&mut self) {
        if let Some(rep) = self.rep.take() {
            if std::thread::panicking() {
                drop(rep);
                self.pool.free_slot();
                debug!("discarded problem snapshot after panic");
            } else {
                self.pool.give_back(rep);
            }
        }
    }
}
