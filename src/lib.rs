//! gateline — descriptor control block core for a multi-threaded database proxy.
//!
//! A proxy multiplexes many client and backend sockets across a pool of
//! worker threads that share one poll set. gateline provides the
//! per-socket state object (the DCB) and the lifecycle engine that makes
//! closing safe: any thread may close a DCB at any moment while other
//! workers are still dispatching events on it, and the memory and owned
//! resources are reclaimed only once every worker that could hold a
//! reference has passed a safe point.
//!
//! The crate is a library. The poll subsystem plugs in through the
//! [`Poller`] trait, wire protocols through [`Protocol`], and the query
//! routing layer through [`Router`]; each worker's event loop calls
//! [`DcbManager::process_zombies`] once per poll iteration after
//! dispatching its events.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gateline::{Config, Dcb, DcbManager, DcbRole, DcbState, Poller};
//!
//! struct NullPoller;
//!
//! impl Poller for NullPoller {
//!     fn add(&self, _dcb: &Arc<Dcb>) -> std::io::Result<()> { Ok(()) }
//!     fn remove(&self, _dcb: &Arc<Dcb>) {}
//!     fn live_worker_mask(&self) -> u64 { 0b1 }
//! }
//!
//! fn main() -> Result<(), gateline::Error> {
//!     let manager = DcbManager::new(Config::default(), Arc::new(NullPoller))?;
//!
//!     let dcb = manager.allocate(DcbRole::RequestHandler);
//!     dcb.set_state(DcbState::Polling);
//!
//!     // Any thread may close; worker 0 reclaims at its next safe point.
//!     manager.close(&dcb);
//!     manager.process_zombies(0);
//!     assert_eq!(dcb.state(), DcbState::Freed);
//!     Ok(())
//! }
//! ```

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod metrics;
pub(crate) mod registry;
pub(crate) mod zombie;

// ── Public modules ──────────────────────────────────────────────────────
pub mod buffer;
pub mod config;
pub mod dcb;
pub mod diagnostics;
pub mod error;
pub mod manager;
pub mod poll;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;

// ── Re-exports ──────────────────────────────────────────────────────────

/// Owned FIFO of byte segments, the unit of queued I/O.
pub use buffer::BufferChain;
/// Core configuration.
pub use config::Config;
/// The per-socket descriptor control block.
pub use dcb::Dcb;
/// Per-DCB I/O statistics.
pub use dcb::DcbStats;
/// Errors returned by the DCB core.
pub use error::Error;
/// Owner of the registry, zombie list and protocol modules.
pub use manager::DcbManager;
/// Upper bound on worker threads.
pub use poll::MAX_WORKERS;
/// Contract the poll subsystem implements.
pub use poll::Poller;
/// Protocol module operation table.
pub use protocol::Protocol;
/// Backend server descriptor with connection counters.
pub use server::Server;
/// Routing layer callback surface.
pub use session::Router;
/// Client session shared between DCBs and the routing layer.
pub use session::Session;
/// The role a DCB plays.
pub use state::DcbRole;
/// Lifecycle state of a DCB.
pub use state::DcbState;
/// Worker mask cleared by the zombie reaper.
pub use zombie::ThreadMask;
