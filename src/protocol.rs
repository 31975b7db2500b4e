//! Protocol module contract and the name-keyed module registry.
//!
//! A protocol module is the operation table a DCB dispatches through:
//! event handlers for readable/writable/error/hangup plus the connect and
//! accept entry points. The table is resolved by name once, at
//! connect/accept time, and stored immutably on the DCB.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferChain;
use crate::dcb::Dcb;
use crate::error::Error;
use crate::server::Server;
use crate::session::Session;

/// Operation table implemented by a protocol module.
///
/// `read`, `write_ready`, `error` and `hangup` are event handlers invoked
/// by the poll subsystem's dispatch; they must not block. `connect` and
/// `accept` are entry points for establishing descriptors. The default
/// `write`/`write_ready` implementations go straight to the DCB write
/// queue, which is what most request handlers want.
pub trait Protocol: Send + Sync {
    /// Handle a readable event on the DCB.
    fn read(&self, dcb: &Arc<Dcb>) -> Result<(), Error>;

    /// Write a buffer chain toward the peer.
    fn write(&self, dcb: &Arc<Dcb>, data: BufferChain) -> Result<(), Error> {
        dcb.write(data)
    }

    /// Handle a writable event. Returns bytes flushed.
    fn write_ready(&self, dcb: &Arc<Dcb>) -> usize {
        dcb.drain()
    }

    /// Establish an outbound connection for `dcb` to `server`, returning
    /// the new descriptor. The implementation is responsible for adding
    /// the DCB to the poll set once the descriptor is usable.
    fn connect(
        &self,
        dcb: &Arc<Dcb>,
        server: &Arc<Server>,
        session: &Arc<Session>,
    ) -> io::Result<RawFd> {
        let _ = (dcb, server, session);
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Accept a connection on a listener DCB.
    fn accept(&self, dcb: &Arc<Dcb>) -> io::Result<()> {
        let _ = dcb;
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Protocol-specific teardown, invoked by higher layers before the
    /// generic close.
    fn close(&self, dcb: &Arc<Dcb>) {
        let _ = dcb;
    }

    /// Write routed from the session/router layer.
    fn session_write(&self, dcb: &Arc<Dcb>, data: BufferChain) -> Result<(), Error> {
        self.write(dcb, data)
    }

    /// Socket error event.
    fn error(&self, dcb: &Arc<Dcb>) {
        let _ = dcb;
    }

    /// Peer hangup event.
    fn hangup(&self, dcb: &Arc<Dcb>) {
        let _ = dcb;
    }
}

/// Name-keyed registry of protocol modules.
pub(crate) struct ProtocolRegistry {
    modules: RwLock<HashMap<String, Arc<dyn Protocol>>>,
}

impl ProtocolRegistry {
    pub(crate) fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Register a module under `name`, replacing any previous entry.
    pub(crate) fn register(&self, name: &str, module: Arc<dyn Protocol>) {
        self.modules.write().insert(name.to_string(), module);
    }

    /// Resolve a module by name.
    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.modules.read().get(name).cloned()
    }
}
