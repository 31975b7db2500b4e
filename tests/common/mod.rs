//! Test doubles and socket helpers shared by the integration suites.
#![allow(dead_code)]

use std::any::Any;
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gateline::{
    BufferChain, Config, Dcb, DcbManager, DcbRole, Error, Poller, Protocol, Router, Server,
    Session,
};

/// Poller double: records add/remove calls and serves a fixed worker mask.
pub struct RecordingPoller {
    mask: AtomicU64,
    pub added: AtomicUsize,
    pub removed: AtomicUsize,
}

impl RecordingPoller {
    pub fn with_mask(mask: u64) -> Arc<Self> {
        Arc::new(Self {
            mask: AtomicU64::new(mask),
            added: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        })
    }
}

impl Poller for RecordingPoller {
    fn add(&self, _dcb: &Arc<Dcb>) -> io::Result<()> {
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, _dcb: &Arc<Dcb>) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }

    fn live_worker_mask(&self) -> u64 {
        self.mask.load(Ordering::SeqCst)
    }
}

/// Router double counting `close_session` invocations.
pub struct CountingRouter {
    pub closed: AtomicUsize,
}

impl CountingRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicUsize::new(0),
        })
    }
}

impl Router for CountingRouter {
    fn close_session(
        &self,
        _instance: &(dyn Any + Send + Sync),
        _router_session: Box<dyn Any + Send>,
    ) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Protocol double whose `connect` hands out one end of a socket pair and
/// parks the other end for the test to read from.
pub struct LoopbackProtocol {
    peers: Mutex<Vec<UnixStream>>,
}

impl LoopbackProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: Mutex::new(Vec::new()),
        })
    }

    /// The peer stream created by the most recent `connect`.
    pub fn take_peer(&self) -> UnixStream {
        self.peers.lock().unwrap().pop().expect("no connect ran")
    }
}

impl Protocol for LoopbackProtocol {
    fn read(&self, dcb: &Arc<Dcb>) -> Result<(), Error> {
        let mut chain = BufferChain::new();
        dcb.read(&mut chain).map(|_| ())
    }

    fn connect(
        &self,
        _dcb: &Arc<Dcb>,
        _server: &Arc<Server>,
        _session: &Arc<Session>,
    ) -> io::Result<RawFd> {
        let (ours, theirs) = UnixStream::pair()?;
        ours.set_nonblocking(true)?;
        self.peers.lock().unwrap().push(theirs);
        Ok(ours.into_raw_fd())
    }
}

/// Build a manager over a recording poller with the given worker mask.
pub fn manager_with_mask(mask: u64) -> (Arc<DcbManager>, Arc<RecordingPoller>) {
    let poller = RecordingPoller::with_mask(mask);
    let manager =
        Arc::new(DcbManager::new(Config::default(), poller.clone()).expect("valid config"));
    (manager, poller)
}

/// Session backed by a counting router, carrying a trivial router session.
pub fn session_with_router() -> (Arc<Session>, Arc<CountingRouter>) {
    let router = CountingRouter::new();
    let session = Session::new(router.clone(), Arc::new(()), Some(Box::new(0u32)));
    (session, router)
}

/// Allocate a DCB attached to one end of a fresh socket pair.
pub fn socket_dcb(manager: &DcbManager) -> (Arc<Dcb>, UnixStream) {
    let (ours, theirs) = UnixStream::pair().expect("socketpair");
    ours.set_nonblocking(true).expect("nonblocking");
    let dcb = manager.allocate(DcbRole::RequestHandler);
    dcb.attach_fd(ours.into_raw_fd());
    (dcb, theirs)
}

/// Shrink a socket's send buffer to force short writes.
pub fn set_sndbuf(fd: RawFd, bytes: libc::c_int) {
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &bytes as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Flatten a chain for content assertions.
pub fn gather(chain: &BufferChain) -> Vec<u8> {
    chain
        .segments()
        .flat_map(|segment| segment.iter().copied())
        .collect()
}
