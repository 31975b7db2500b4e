//! Sessions and the router seam.
//!
//! A session ties a client DCB to the routing layer above. The session
//! owns its router session; the DCB holds a handle to the session and
//! surrenders it during final free, which drives the one teardown
//! ordering the router cares about: the router session is swapped out
//! under the session lock and handed to [`Router::close_session`]
//! exactly once, before the session itself goes away.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::trace;
use parking_lot::Mutex;

use crate::dcb::Dcb;

/// Routing layer callback surface.
pub trait Router: Send + Sync {
    /// Release a router session. Called exactly once per session, during
    /// the final free of a DCB that carried it.
    fn close_session(
        &self,
        instance: &(dyn Any + Send + Sync),
        router_session: Box<dyn Any + Send>,
    );
}

/// A client session shared between DCBs and the routing layer.
pub struct Session {
    router: Arc<dyn Router>,
    router_instance: Arc<dyn Any + Send + Sync>,
    /// The router session slot. Its mutex is the session lock.
    router_session: Mutex<Option<Box<dyn Any + Send>>>,
    closing: AtomicBool,
    client: Mutex<Weak<Dcb>>,
}

impl Session {
    /// Create a session bound to a router instance. The router session
    /// may be attached later via [`set_router_session`](Self::set_router_session)
    /// if the routing layer creates it after the backend connects.
    pub fn new(
        router: Arc<dyn Router>,
        router_instance: Arc<dyn Any + Send + Sync>,
        router_session: Option<Box<dyn Any + Send>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            router_instance,
            router_session: Mutex::new(router_session),
            closing: AtomicBool::new(false),
            client: Mutex::new(Weak::new()),
        })
    }

    /// Attach the router session.
    pub fn set_router_session(&self, router_session: Box<dyn Any + Send>) {
        *self.router_session.lock() = Some(router_session);
    }

    /// Whether a router session is still attached.
    pub fn has_router_session(&self) -> bool {
        self.router_session.lock().is_some()
    }

    /// Record the session's client DCB.
    pub fn set_client(&self, dcb: &Arc<Dcb>) {
        *self.client.lock() = Arc::downgrade(dcb);
    }

    /// Whether `dcb` is this session's client descriptor.
    pub fn is_client(&self, dcb: &Arc<Dcb>) -> bool {
        self.client
            .lock()
            .upgrade()
            .is_some_and(|client| Arc::ptr_eq(&client, dcb))
    }

    /// Attempt to link a new DCB to this session. Fails once teardown has
    /// begun.
    pub fn link_dcb(&self) -> bool {
        !self.closing.load(Ordering::Acquire)
    }

    /// Begin teardown: refuse further DCB links.
    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Whether teardown has begun.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Swap the router session out under the session lock and hand it to
    /// the router. Safe to call any number of times; the router sees the
    /// session exactly once.
    pub(crate) fn close_router_session(&self) {
        let router_session = self.router_session.lock().take();
        match router_session {
            Some(router_session) => {
                self.router
                    .close_session(self.router_instance.as_ref(), router_session);
            }
            None => trace!("session teardown: no router session attached"),
        }
    }
}
