//! The DCB lifecycle engine.
//!
//! [`DcbManager`] owns the process-wide registry, the zombie list, the
//! protocol module registry and the handle to the poll subsystem. Every
//! lifecycle operation — allocate, connect, close, reap, final free —
//! goes through it.
//!
//! The close/reap pair is the heart of the crate. `close` may be called
//! by any thread at any moment; it wins or loses the NOPOLLING
//! transition under the DCB init-lock, and the winner withdraws the
//! descriptor from the poll set and snapshots the live-worker mask
//! before the lock drops. From then on no new event can dispatch for the
//! DCB, and each worker clears its mask bit at its next safe point. The
//! worker that clears the last bit runs final free, so the free
//! happens-after every dispatch that was in flight at close time.

use std::sync::Arc;

use log::{error, trace};

use crate::config::Config;
use crate::dcb::Dcb;
use crate::error::Error;
use crate::metrics;
use crate::poll::Poller;
use crate::protocol::{Protocol, ProtocolRegistry};
use crate::registry::Registry;
use crate::server::Server;
use crate::session::Session;
use crate::state::{self, DcbRole, DcbState};
use crate::zombie::ZombieList;

/// Owner of all process-wide DCB state.
pub struct DcbManager {
    config: Config,
    poller: Arc<dyn Poller>,
    registry: Registry,
    zombies: ZombieList,
    protocols: ProtocolRegistry,
}

impl DcbManager {
    /// Create a manager over a poll subsystem. Fails on invalid
    /// configuration.
    pub fn new(config: Config, poller: Arc<dyn Poller>) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            poller,
            registry: Registry::new(),
            zombies: ZombieList::new(),
            protocols: ProtocolRegistry::new(),
        })
    }

    /// The poll subsystem this manager drives.
    pub fn poller(&self) -> &Arc<dyn Poller> {
        &self.poller
    }

    /// Register a protocol module under `name` for later resolution by
    /// [`connect`](Self::connect) and accept paths.
    pub fn register_protocol(&self, name: &str, module: Arc<dyn Protocol>) {
        self.protocols.register(name, module);
    }

    /// Resolve a protocol module by name.
    pub fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols.lookup(name)
    }

    /// Allocate a DCB in state `Alloc` and insert it into the registry.
    pub fn allocate(&self, role: DcbRole) -> Arc<Dcb> {
        let dcb = Arc::new(Dcb::new(role, self.config.max_buffer_size));
        self.registry.insert(&dcb);
        metrics::DCB_ALLOCATED.increment();
        metrics::DCB_LIVE.increment();
        trace!("allocated dcb with role {:?}", dcb.role());
        dcb
    }

    /// Number of DCBs currently in the registry.
    pub fn live_dcbs(&self) -> usize {
        self.registry.len()
    }

    /// Number of DCBs awaiting reclamation.
    pub fn zombie_count(&self) -> usize {
        self.zombies.len()
    }

    /// Walk every live DCB under the registry lock. The visitor must not
    /// allocate, close or free DCBs.
    pub fn for_each_dcb<F>(&self, visitor: F)
    where
        F: FnMut(&Arc<Dcb>),
    {
        self.registry.for_each(visitor);
    }

    /// Connect to a backend server on behalf of a session.
    ///
    /// Allocates a request-handler DCB, resolves the protocol module,
    /// links the session, and lets the module establish the descriptor.
    /// The module's connect is responsible for adding the DCB to the
    /// poll set. Any failure releases the DCB before returning.
    pub fn connect(
        &self,
        server: &Arc<Server>,
        session: &Arc<Session>,
        protocol: &str,
    ) -> Result<Arc<Dcb>, Error> {
        let dcb = self.allocate(DcbRole::RequestHandler);

        let Some(module) = self.protocols.lookup(protocol) else {
            error!("no protocol module registered as {protocol}");
            metrics::CONNECT_FAILURES.increment();
            self.discard_unconnected(&dcb);
            return Err(Error::UnknownProtocol(protocol.to_string()));
        };
        let installed = dcb.set_protocol(module.clone());
        debug_assert!(installed);

        if !session.link_dcb() {
            trace!("connect: session is closing, dropping dcb");
            metrics::CONNECT_FAILURES.increment();
            self.discard_unconnected(&dcb);
            return Err(Error::SessionGone);
        }
        dcb.attach_session(session.clone());

        match module.connect(&dcb, server, session) {
            Ok(fd) => dcb.attach_fd(fd),
            Err(err) => {
                error!(
                    "failed to connect to server {} at {}: {err}",
                    server.name(),
                    server.addr()
                );
                metrics::CONNECT_FAILURES.increment();
                self.discard_unconnected(&dcb);
                return Err(Error::Io(err));
            }
        }

        server.connection_opened();
        Ok(dcb)
    }

    /// Close a DCB. Safe to call from any thread, any number of times.
    ///
    /// The first caller wins the NOPOLLING transition and, still under
    /// the init-lock, withdraws the descriptor from the poll set and
    /// arms the thread mask with the live-worker snapshot. The DCB then
    /// moves to the zombie list; reclamation happens later, in
    /// [`process_zombies`](Self::process_zombies).
    pub fn close(&self, dcb: &Arc<Dcb>) {
        {
            let mut guard = dcb.state_guard();
            let (ok, prev) = state::transition(&mut guard, DcbState::NoPolling);
            if ok && *guard == DcbState::NoPolling {
                self.poller.remove(dcb);
                dcb.thread_mask().arm(self.poller.live_worker_mask());
                trace!(
                    "dcb fd {} removed from poll set (was {prev})",
                    dcb.fd()
                );
            }
        }

        // The transition may have been won by another thread that has not
        // yet queued the DCB; whoever observes NOPOLLING here may queue
        // it, and the zombie list rejects duplicates.
        if dcb.state() == DcbState::NoPolling && self.zombies.push(dcb) {
            metrics::ZOMBIE_QUEUED.increment();
        }
    }

    /// Reap zombies on behalf of worker `tid`.
    ///
    /// Called by each worker once per poll iteration, after it has
    /// dispatched its events. Clears the worker's bit on every zombie;
    /// DCBs whose masks are fully clear are reclaimed here: descriptor
    /// closed, state moved to `Disconnected`, final free run — all
    /// outside any lock.
    pub fn process_zombies(&self, tid: usize) {
        // Dirty read: skip the lock when nothing is queued.
        if self.zombies.is_empty_fast() {
            return;
        }

        for dcb in self.zombies.reap(tid) {
            let fd = dcb.fd();
            if fd >= 0 {
                unsafe {
                    libc::close(fd);
                }
            }
            let (ok, prev) = dcb.set_state(DcbState::Disconnected);
            debug_assert!(ok, "zombie was in state {prev}");
            metrics::ZOMBIE_REAPED.increment();
            trace!("reaped dcb fd {fd} on worker {tid}");
            self.final_free(&dcb);
        }
    }

    /// Release everything a DCB owns and remove it from the registry.
    ///
    /// Runs with no locks held by the caller. The router session, if the
    /// DCB's session carries one, is swapped out under the session lock
    /// and closed exactly once before the session handle is surrendered.
    fn final_free(&self, dcb: &Arc<Dcb>) {
        self.registry.unlink(dcb);

        if let Some(session) = dcb.take_session() {
            session.close_router_session();
            drop(session);
        }

        drop(dcb.take_protocol_data());
        drop(dcb.take_app_data());
        dcb.clear_remote();

        let (ok, prev) = dcb.set_state(DcbState::Freed);
        debug_assert!(ok, "final free from state {prev}");
        metrics::DCB_FREED.increment();
        metrics::DCB_LIVE.decrement();
        trace!("dcb finally freed");
    }

    /// Failure path for connect: the DCB never reached the poll set, so
    /// it can be released directly instead of through the reaper.
    fn discard_unconnected(&self, dcb: &Arc<Dcb>) {
        let (ok, prev) = dcb.set_state(DcbState::Disconnected);
        debug_assert!(ok, "connect failure from state {prev}");
        self.final_free(dcb);
    }
}
