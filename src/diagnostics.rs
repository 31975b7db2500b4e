//! Human-readable DCB diagnostics.
//!
//! Two render targets: any `io::Write` (logs, admin CLI capture) and
//! another DCB, for the administrative-connection case where reports are
//! emitted through the target's protocol module.

use std::io;
use std::sync::Arc;

use crate::dcb::Dcb;
use crate::error::Error;
use crate::manager::DcbManager;

/// Render one DCB's state and statistics.
pub fn print_dcb(out: &mut dyn io::Write, dcb: &Arc<Dcb>) -> io::Result<()> {
    writeln!(out, "DCB: {:p}", Arc::as_ptr(dcb))?;
    writeln!(out, "\tDCB state:          {}", dcb.state())?;
    if let Some(addr) = dcb.remote() {
        writeln!(out, "\tConnected to:       {addr}")?;
    }
    writeln!(out, "\tQueued write data:  {}", dcb.writeq_len())?;
    let stats = dcb.stats();
    writeln!(out, "\tStatistics:")?;
    writeln!(out, "\t\tNo. of Reads:           {}", stats.reads())?;
    writeln!(out, "\t\tNo. of Writes:          {}", stats.writes())?;
    writeln!(out, "\t\tNo. of Buffered Writes: {}", stats.buffered_writes())?;
    writeln!(out, "\t\tNo. of Accepts:         {}", stats.accepts())?;
    Ok(())
}

/// Render every DCB in the registry.
pub fn print_all(out: &mut dyn io::Write, manager: &DcbManager) -> io::Result<()> {
    let mut result = Ok(());
    manager.for_each_dcb(|dcb| {
        if result.is_ok() {
            result = print_dcb(out, dcb);
        }
    });
    result
}

/// Render one DCB into another DCB through the target's protocol module.
pub fn print_dcb_to(target: &Arc<Dcb>, dcb: &Arc<Dcb>) -> Result<(), Error> {
    let mut report = Vec::new();
    // Writing into a Vec is infallible.
    let _ = print_dcb(&mut report, dcb);
    Dcb::printf(target, format_args!("{}", String::from_utf8_lossy(&report)))
}

/// Render the whole registry into a DCB.
pub fn print_all_to(target: &Arc<Dcb>, manager: &DcbManager) -> Result<(), Error> {
    let mut report = Vec::new();
    let _ = print_all(&mut report, manager);
    Dcb::printf(target, format_args!("{}", String::from_utf8_lossy(&report)))
}
