//! Deferred reclamation of closed DCBs.
//!
//! A closed DCB cannot be freed while any worker thread might still be
//! mid-dispatch on it. The close path snapshots the set of live workers
//! into the DCB's [`ThreadMask`] and parks the DCB on the [`ZombieList`];
//! each worker clears its own bit once per poll iteration, and the worker
//! that clears the last bit extracts the DCB for final free. A worker that
//! starts after the close can never see the DCB (it left the poll set
//! first), so a fully cleared mask proves no reference remains.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::error;
use parking_lot::Mutex;

use crate::dcb::Dcb;
use crate::poll::MAX_WORKERS;
use crate::state::DcbState;

/// The set of worker threads that must still clear a zombie DCB.
///
/// Armed exactly once, at the transition into `NoPolling`, with the
/// poller's live-worker snapshot. Bits are only ever cleared afterwards.
pub struct ThreadMask(AtomicU64);

impl ThreadMask {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Arm the mask with the live-worker snapshot taken at close time.
    pub(crate) fn arm(&self, mask: u64) {
        debug_assert_eq!(self.0.load(Ordering::Relaxed), 0, "thread mask armed twice");
        self.0.store(mask, Ordering::Relaxed);
    }

    /// Clear the bit for `tid`, returning the bits that remain set.
    pub(crate) fn clear(&self, tid: usize) -> u64 {
        debug_assert!(tid < MAX_WORKERS);
        self.0.fetch_and(!(1u64 << tid), Ordering::AcqRel) & !(1u64 << tid)
    }

    /// Whether no worker still needs to clear this DCB.
    pub fn is_clear(&self) -> bool {
        self.0.load(Ordering::Acquire) == 0
    }

    /// The raw bitmask.
    pub fn raw(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// The process-wide list of closed-but-not-yet-freed DCBs.
pub(crate) struct ZombieList {
    entries: Mutex<Vec<Arc<Dcb>>>,
    /// Dirty-readable entry count so workers skip the lock when the list
    /// is empty, which is the common case.
    pending: AtomicUsize,
}

impl ZombieList {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
        }
    }

    /// Lock-free emptiness check for the reap fast path.
    pub(crate) fn is_empty_fast(&self) -> bool {
        self.pending.load(Ordering::Relaxed) == 0
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Append a closed DCB and transition it to `Zombie` inside the same
    /// critical section, so a racing close cannot queue it twice.
    /// Returns whether the DCB was actually appended.
    pub(crate) fn push(&self, dcb: &Arc<Dcb>) -> bool {
        let mut entries = self.entries.lock();

        // Already queued: the first closer won.
        if dcb.state() == DcbState::Zombie {
            debug_assert!(!entries.is_empty());
            return false;
        }
        if entries.iter().any(|entry| Arc::ptr_eq(entry, dcb)) {
            error!("dcb fd {} already on the zombie list", dcb.fd());
            return false;
        }

        entries.push(dcb.clone());
        self.pending.fetch_add(1, Ordering::Relaxed);

        let (ok, _prev) = dcb.set_state(DcbState::Zombie);
        debug_assert!(ok, "zombie transition failed from {_prev}");
        true
    }

    /// Clear bit `tid` on every entry and extract the DCBs whose masks are
    /// now fully clear. The caller runs final free on the victims outside
    /// any lock.
    pub(crate) fn reap(&self, tid: usize) -> Vec<Arc<Dcb>> {
        let mut entries = self.entries.lock();
        let mut victims = Vec::new();
        entries.retain(|dcb| {
            debug_assert_eq!(dcb.state(), DcbState::Zombie);
            if dcb.thread_mask().clear(tid) == 0 {
                victims.push(dcb.clone());
                false
            } else {
                true
            }
        });
        if !victims.is_empty() {
            self.pending.fetch_sub(victims.len(), Ordering::Relaxed);
        }
        victims
    }
}
