//! Contract between the DCB core and the poll subsystem.
//!
//! The poll subsystem owns the OS event primitive and the worker threads;
//! the DCB core only needs three things from it: register a descriptor,
//! withdraw a descriptor, and report which workers are currently live.

use std::io;
use std::sync::Arc;

use crate::dcb::Dcb;

/// Upper bound on worker threads. The zombie reaper tracks workers in one
/// 64-bit mask, one bit per worker ID.
pub const MAX_WORKERS: usize = 64;

/// Interface the poll subsystem exposes to the DCB core.
///
/// Implementations distribute readable/writable events for registered
/// DCBs to worker threads, each of which calls
/// [`DcbManager::process_zombies`](crate::DcbManager::process_zombies)
/// once per poll iteration after dispatching its events.
pub trait Poller: Send + Sync {
    /// Register a DCB's descriptor in the poll set.
    fn add(&self, dcb: &Arc<Dcb>) -> io::Result<()>;

    /// Withdraw a DCB's descriptor from the poll set.
    ///
    /// Once this returns, no *new* events may be dispatched for the DCB.
    /// Workers already mid-dispatch are accounted for by the caller via
    /// [`live_worker_mask`](Self::live_worker_mask).
    ///
    /// Invoked with the DCB init-lock held: implementations must not call
    /// back into state-changing DCB operations.
    fn remove(&self, dcb: &Arc<Dcb>);

    /// Bitmask of worker-thread IDs currently executing or blocked in the
    /// poll loop. Bit `n` set means worker `n` may be mid-dispatch.
    fn live_worker_mask(&self) -> u64;
}
