//! Backend server descriptors.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A backend database server that DCBs connect to.
pub struct Server {
    name: String,
    addr: SocketAddr,
    n_connections: AtomicU64,
    n_current: AtomicI64,
}

impl Server {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            n_connections: AtomicU64::new(0),
            n_current: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Record a new connection to this server.
    pub fn connection_opened(&self) {
        self.n_connections.fetch_add(1, Ordering::Relaxed);
        self.n_current.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the teardown of a connection to this server. Called from
    /// protocol close paths.
    pub fn connection_closed(&self) {
        self.n_current.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connections ever opened.
    pub fn total_connections(&self) -> u64 {
        self.n_connections.load(Ordering::Relaxed)
    }

    /// Connections currently open.
    pub fn current_connections(&self) -> i64 {
        self.n_current.load(Ordering::Relaxed)
    }
}
