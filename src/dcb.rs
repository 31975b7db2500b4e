//! The descriptor control block.
//!
//! A DCB is the per-socket state object handed to the poll subsystem: it
//! carries the descriptor, the lifecycle state, the protocol operation
//! table, the session handle and the buffered write queue. Many worker
//! threads may hold a DCB at once; every mutation goes through a short
//! dedicated lock (state through the init-lock, queued data through the
//! queue locks) and reclamation is deferred to the zombie reaper so no
//! thread ever observes a freed DCB.

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};

use bytes::BytesMut;
use log::{error, trace};
use parking_lot::{Mutex, MutexGuard};

use crate::buffer::BufferChain;
use crate::error::Error;
use crate::metrics;
use crate::protocol::Protocol;
use crate::registry::NO_KEY;
use crate::session::Session;
use crate::state::{self, DcbRole, DcbState};
use crate::zombie::ThreadMask;

/// Per-DCB I/O statistics. Monotonic, updated without locking.
#[derive(Default)]
pub struct DcbStats {
    n_reads: AtomicU64,
    n_writes: AtomicU64,
    n_buffered: AtomicU64,
    n_accepts: AtomicU64,
}

impl DcbStats {
    pub fn reads(&self) -> u64 {
        self.n_reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.n_writes.load(Ordering::Relaxed)
    }

    pub fn buffered_writes(&self) -> u64 {
        self.n_buffered.load(Ordering::Relaxed)
    }

    pub fn accepts(&self) -> u64 {
        self.n_accepts.load(Ordering::Relaxed)
    }

    /// Record an accepted connection. Called by listener protocol modules.
    pub fn record_accept(&self) {
        self.n_accepts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_read(&self) {
        self.n_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.n_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_buffered(&self) {
        self.n_buffered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Descriptor control block: the per-socket state object.
///
/// Allocated through [`DcbManager::allocate`](crate::DcbManager::allocate),
/// shared as `Arc<Dcb>`, destroyed only by the zombie reaper once every
/// worker that could reference it has passed a safe point.
pub struct Dcb {
    role: DcbRole,
    /// The descriptor, or -1 before one is attached.
    fd: AtomicI32,
    /// Lifecycle state. This mutex is the DCB init-lock: it serialises
    /// state transitions and the critical sequence in close.
    state: Mutex<DcbState>,
    protocol: OnceLock<Arc<dyn Protocol>>,
    session: Mutex<Option<Arc<Session>>>,
    protocol_data: Mutex<Option<Box<dyn Any + Send>>>,
    app_data: Mutex<Option<Box<dyn Any + Send>>>,
    remote: Mutex<Option<SocketAddr>>,
    writeq: Mutex<BufferChain>,
    delayq: Mutex<BufferChain>,
    authq: Mutex<BufferChain>,
    stats: DcbStats,
    thread_mask: ThreadMask,
    registry_key: AtomicUsize,
    max_buffer_size: usize,
}

impl Dcb {
    pub(crate) fn new(role: DcbRole, max_buffer_size: usize) -> Self {
        Self {
            role,
            fd: AtomicI32::new(-1),
            state: Mutex::new(DcbState::Alloc),
            protocol: OnceLock::new(),
            session: Mutex::new(None),
            protocol_data: Mutex::new(None),
            app_data: Mutex::new(None),
            remote: Mutex::new(None),
            writeq: Mutex::new(BufferChain::new()),
            delayq: Mutex::new(BufferChain::new()),
            authq: Mutex::new(BufferChain::new()),
            stats: DcbStats::default(),
            thread_mask: ThreadMask::new(),
            registry_key: AtomicUsize::new(NO_KEY),
            max_buffer_size,
        }
    }

    pub fn role(&self) -> DcbRole {
        self.role
    }

    /// The descriptor, or -1 if none is attached.
    pub fn fd(&self) -> RawFd {
        self.fd.load(Ordering::Relaxed)
    }

    /// Attach the descriptor obtained by a protocol connect/accept.
    pub fn attach_fd(&self, fd: RawFd) {
        self.fd.store(fd, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DcbState {
        *self.state.lock()
    }

    /// Attempt a state transition under the init-lock.
    ///
    /// Returns `(success, previous_state)`; an illegal transition fails
    /// and leaves the state unchanged. The poll subsystem uses this to
    /// move a DCB into `Polling`/`Listening` when registering it.
    pub fn set_state(&self, new_state: DcbState) -> (bool, DcbState) {
        let mut state = self.state.lock();
        let (ok, prev) = state::transition(&mut state, new_state);
        let now = *state;
        drop(state);
        if ok && now != prev {
            trace!("dcb fd {} state {prev} -> {now}", self.fd());
        }
        (ok, prev)
    }

    /// The init-lock guard, for compound critical sections such as close.
    pub(crate) fn state_guard(&self) -> MutexGuard<'_, DcbState> {
        self.state.lock()
    }

    /// Install the protocol operation table. Succeeds once; later calls
    /// return false and change nothing.
    pub fn set_protocol(&self, module: Arc<dyn Protocol>) -> bool {
        self.protocol.set(module).is_ok()
    }

    /// The protocol operation table, if one has been installed.
    pub fn protocol(&self) -> Option<Arc<dyn Protocol>> {
        self.protocol.get().cloned()
    }

    pub(crate) fn attach_session(&self, session: Arc<Session>) {
        *self.session.lock() = Some(session);
    }

    pub(crate) fn take_session(&self) -> Option<Arc<Session>> {
        self.session.lock().take()
    }

    /// The session this DCB belongs to, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// Whether `dcb` is its session's client descriptor.
    pub fn is_client(dcb: &Arc<Self>) -> bool {
        dcb.session().is_some_and(|session| session.is_client(dcb))
    }

    pub fn set_protocol_data(&self, data: Box<dyn Any + Send>) {
        *self.protocol_data.lock() = Some(data);
    }

    pub fn take_protocol_data(&self) -> Option<Box<dyn Any + Send>> {
        self.protocol_data.lock().take()
    }

    pub fn set_app_data(&self, data: Box<dyn Any + Send>) {
        *self.app_data.lock() = Some(data);
    }

    pub fn take_app_data(&self) -> Option<Box<dyn Any + Send>> {
        self.app_data.lock().take()
    }

    pub fn set_remote(&self, addr: SocketAddr) {
        *self.remote.lock() = Some(addr);
    }

    /// Peer address, if known.
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock()
    }

    pub(crate) fn clear_remote(&self) {
        *self.remote.lock() = None;
    }

    pub fn stats(&self) -> &DcbStats {
        &self.stats
    }

    /// The zombie-reaper worker mask. Meaningful only once the DCB has
    /// been closed.
    pub fn thread_mask(&self) -> &ThreadMask {
        &self.thread_mask
    }

    pub(crate) fn set_registry_key(&self, key: usize) {
        self.registry_key.store(key, Ordering::Relaxed);
    }

    pub(crate) fn take_registry_key(&self) -> usize {
        self.registry_key.swap(NO_KEY, Ordering::Relaxed)
    }

    /// Bytes currently queued on the write queue.
    pub fn writeq_len(&self) -> usize {
        self.writeq.lock().len()
    }

    /// Park a chain on the delay queue (backend pre-auth buffering).
    pub fn append_delayq(&self, data: BufferChain) {
        self.delayq.lock().append(data);
    }

    /// Detach the delay queue.
    pub fn take_delayq(&self) -> BufferChain {
        std::mem::take(&mut *self.delayq.lock())
    }

    /// Park a chain on the auth queue.
    pub fn append_authq(&self, data: BufferChain) {
        self.authq.lock().append(data);
    }

    /// Detach the auth queue.
    pub fn take_authq(&self) -> BufferChain {
        std::mem::take(&mut *self.authq.lock())
    }

    // ── I/O paths ───────────────────────────────────────────────────

    /// Read everything the kernel has buffered for this descriptor,
    /// appending it to `head` in segments of at most the configured
    /// maximum buffer size.
    ///
    /// Returns the bytes appended. `Ok(0)` on a readable event means the
    /// peer closed. EAGAIN/EWOULDBLOCK ends the loop and reports the
    /// bytes read so far; any other errno is an error. No DCB lock is
    /// held across the read syscall.
    pub fn read(&self, head: &mut BufferChain) -> Result<usize, Error> {
        let fd = self.fd();
        let mut total = 0usize;

        let mut avail = ready_bytes(fd).map_err(|err| {
            error!("dcb fd {fd}: FIONREAD failed: {err}");
            Error::Io(err)
        })?;

        while avail > 0 {
            let chunk = avail.min(self.max_buffer_size);
            let mut buffer = BytesMut::zeroed(chunk);

            let n = loop {
                let rc = unsafe {
                    libc::read(fd, buffer.as_mut_ptr() as *mut libc::c_void, chunk)
                };
                self.stats.record_read();
                if rc >= 0 {
                    break rc as usize;
                }
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(total);
                }
                error!("dcb fd {fd}: read failed: {err}");
                return Err(Error::Io(err));
            };

            if n == 0 {
                // Peer closed.
                return Ok(total);
            }

            buffer.truncate(n);
            head.push(buffer.freeze());
            total += n;
            metrics::BYTES_READ.add(n as u64);

            // The amount buffered may have changed while we were reading.
            avail = ready_bytes(fd).map_err(|err| {
                error!("dcb fd {fd}: FIONREAD failed: {err}");
                Error::Io(err)
            })?;
        }

        Ok(total)
    }

    /// Write a chain to the descriptor, queueing whatever cannot be sent
    /// immediately.
    ///
    /// If data is already queued, the chain is appended behind it and a
    /// later drain will send it; otherwise segments are sent until a
    /// short write or EAGAIN leaves the remainder queued. Both outcomes
    /// are success. Only an errno other than EAGAIN/EWOULDBLOCK is an
    /// error, and even then the remainder stays queued — the caller
    /// decides whether to close. Racing writers serialise on the writeq
    /// lock, so bytes hit the wire in submission order.
    pub fn write(&self, data: BufferChain) -> Result<(), Error> {
        let fd = self.fd();
        let mut writeq = self.writeq.lock();

        if !writeq.is_empty() {
            // A drain is already owed for the queued data; just add ours.
            writeq.append(data);
            self.stats.record_buffered();
            metrics::WRITES_BUFFERED.increment();
            trace!(
                "dcb fd {fd}: appended to write queue, {} writes buffered",
                self.stats.buffered_writes()
            );
            return Ok(());
        }

        let mut queue = data;
        let mut failure: Option<io::Error> = None;

        while !queue.is_empty() {
            let segment_len;
            let result;
            {
                let segment = queue.front().unwrap();
                segment_len = segment.len();
                result = write_raw(fd, segment);
            }
            self.stats.record_write();

            match result {
                Ok(n) => {
                    metrics::BYTES_WRITTEN.add(n as u64);
                    queue.consume(n);
                    if n < segment_len {
                        break;
                    }
                }
                Err(err) => {
                    if err.kind() != io::ErrorKind::WouldBlock {
                        error!("dcb fd {fd}: write failed: {err}");
                        failure = Some(err);
                    }
                    break;
                }
            }
        }

        if !queue.is_empty() {
            self.stats.record_buffered();
            metrics::WRITES_BUFFERED.increment();
        }
        *writeq = queue;
        drop(writeq);

        match failure {
            Some(err) => Err(Error::WriteFailed(err)),
            None => Ok(()),
        }
    }

    /// Drain the write queue on a writable event.
    ///
    /// Sends from the head until the queue empties or a short/EAGAIN
    /// write occurs. Returns the bytes written by this invocation.
    pub fn drain(&self) -> usize {
        let fd = self.fd();
        let mut writeq = self.writeq.lock();
        let mut total = 0usize;

        while !writeq.is_empty() {
            let segment_len;
            let result;
            {
                let segment = writeq.front().unwrap();
                segment_len = segment.len();
                result = write_raw(fd, segment);
            }

            match result {
                Ok(n) => {
                    metrics::BYTES_WRITTEN.add(n as u64);
                    writeq.consume(n);
                    total += n;
                    if n < segment_len {
                        break;
                    }
                }
                Err(err) => {
                    if err.kind() != io::ErrorKind::WouldBlock {
                        error!("dcb fd {fd}: drain write failed: {err}");
                    }
                    break;
                }
            }
        }

        total
    }

    /// Format text into a single-segment chain and hand it to the DCB's
    /// protocol `write` operation; diagnostics use this to emit reports
    /// to an administrative connection. Falls back to the plain write
    /// queue when no protocol table is installed.
    pub fn printf(dcb: &Arc<Self>, args: fmt::Arguments<'_>) -> Result<(), Error> {
        let text = args.to_string();
        let chain = BufferChain::from_slice(text.as_bytes());
        match dcb.protocol() {
            Some(module) => module.write(dcb, chain),
            None => dcb.write(chain),
        }
    }
}

/// Bytes immediately readable on `fd`, per FIONREAD.
fn ready_bytes(fd: RawFd) -> io::Result<usize> {
    let mut avail: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut avail as *mut libc::c_int) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(avail.max(0) as usize)
}

/// `write(2)` with EINTR retry.
fn write_raw(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    loop {
        let rc = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
