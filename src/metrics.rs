//! Process-wide DCB metrics.
//!
//! Counters for allocation, reclamation and I/O volume across all DCBs.
//! Per-DCB statistics live on the DCB itself; these aggregate the whole
//! process for Prometheus exposition.

use metriken::{Counter, Gauge, metric};

// ── DCB lifecycle ────────────────────────────────────────────────

#[metric(name = "gateline/dcb/allocated", description = "Total DCBs allocated")]
pub static DCB_ALLOCATED: Counter = Counter::new();

#[metric(name = "gateline/dcb/freed", description = "Total DCBs finally freed")]
pub static DCB_FREED: Counter = Counter::new();

#[metric(name = "gateline/dcb/live", description = "DCBs currently in the registry")]
pub static DCB_LIVE: Gauge = Gauge::new();

// ── Zombie reaper ────────────────────────────────────────────────

#[metric(
    name = "gateline/zombie/queued",
    description = "DCBs appended to the zombie list"
)]
pub static ZOMBIE_QUEUED: Counter = Counter::new();

#[metric(
    name = "gateline/zombie/reaped",
    description = "Zombie DCBs reclaimed after all workers cleared"
)]
pub static ZOMBIE_REAPED: Counter = Counter::new();

// ── I/O volume ───────────────────────────────────────────────────

#[metric(name = "gateline/bytes/read", description = "Total bytes read")]
pub static BYTES_READ: Counter = Counter::new();

#[metric(name = "gateline/bytes/written", description = "Total bytes written")]
pub static BYTES_WRITTEN: Counter = Counter::new();

#[metric(
    name = "gateline/writes/buffered",
    description = "Writes that left data on a write queue"
)]
pub static WRITES_BUFFERED: Counter = Counter::new();

// ── Connect path ─────────────────────────────────────────────────

#[metric(
    name = "gateline/connect/failures",
    description = "Failed outbound connection attempts"
)]
pub static CONNECT_FAILURES: Counter = Counter::new();
