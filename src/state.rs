//! DCB lifecycle states and the legal-transition function.
//!
//! A DCB moves through its life strictly along the edges encoded in
//! [`transition`]. Anything else is a bug in the caller: the transition
//! reports failure and leaves the state untouched, which lets racing
//! closers treat "lost the race" as a no-op.

use std::fmt;

/// The role a DCB plays. Fixed at allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcbRole {
    /// Carries client or backend request traffic.
    RequestHandler,
    /// A listening socket accepting new connections.
    Listener,
    /// Internal plumbing (admin connections, self-pipes).
    Internal,
}

/// Lifecycle state of a DCB.
///
/// The file descriptor is only valid in `Polling`, `Listening`,
/// `NoPolling` and `Zombie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcbState {
    /// Sentinel for a state that has never been set. Bootstrap only.
    Undefined,
    /// Freshly allocated, not yet attached to a descriptor.
    Alloc,
    /// Registered in the poll set, receiving events.
    Polling,
    /// A listening socket.
    Listening,
    /// Removed from the poll set by a close; not yet on the zombie list.
    NoPolling,
    /// On the zombie list, waiting for every worker to pass a safe point.
    Zombie,
    /// Descriptor closed, off the zombie list, awaiting final free.
    Disconnected,
    /// Final free has run; all owned resources are released.
    Freed,
}

impl fmt::Display for DcbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DcbState::Undefined => "DCB state undefined",
            DcbState::Alloc => "DCB Allocated",
            DcbState::Polling => "DCB in the polling loop",
            DcbState::Listening => "DCB for listening socket",
            DcbState::NoPolling => "DCB removed from the polling loop",
            DcbState::Zombie => "DCB Zombie",
            DcbState::Disconnected => "DCB socket closed",
            DcbState::Freed => "DCB memory could be freed",
        };
        f.write_str(text)
    }
}

/// Apply a state transition if it is legal.
///
/// Returns `(success, previous_state)`. On failure the state is unchanged.
/// Two edges are accept-without-change: `NoPolling -> Polling` and
/// `Zombie -> Polling` report success but keep the current state, so a
/// thread that lost a close race can retry harmlessly.
///
/// Callers must hold the DCB init-lock; [`Dcb::set_state`](crate::Dcb::set_state)
/// wraps this with the lock held.
pub(crate) fn transition(state: &mut DcbState, new_state: DcbState) -> (bool, DcbState) {
    use DcbState::*;

    let prev = *state;
    let ok = match (prev, new_state) {
        (Undefined, _) => true,
        (Alloc, Polling | Listening | Disconnected) => true,
        (Polling, NoPolling | Listening) => true,
        (Listening, Polling | NoPolling) => true,
        (NoPolling, Zombie) => true,
        // Ok to try, but the state cannot change.
        (NoPolling, Polling) => {
            return (true, prev);
        }
        (Zombie, Disconnected) => true,
        (Zombie, Polling) => {
            return (true, prev);
        }
        (Disconnected, Freed) => true,
        _ => false,
    };

    if ok {
        *state = new_state;
    }
    (ok, prev)
}
