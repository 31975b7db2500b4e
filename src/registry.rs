//! Global registry of live DCBs.
//!
//! Every allocated DCB is inserted here and stays until final free, so
//! diagnostics can enumerate everything the process currently holds. The
//! slab key is stored on the DCB, giving O(1) unlink without an intrusive
//! list.

use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;

use crate::dcb::Dcb;

/// Sentinel for "not in the registry".
pub(crate) const NO_KEY: usize = usize::MAX;

pub(crate) struct Registry {
    dcbs: Mutex<Slab<Arc<Dcb>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            dcbs: Mutex::new(Slab::new()),
        }
    }

    /// Insert a freshly allocated DCB, recording its key for unlink.
    pub(crate) fn insert(&self, dcb: &Arc<Dcb>) {
        let mut dcbs = self.dcbs.lock();
        let key = dcbs.insert(dcb.clone());
        dcb.set_registry_key(key);
    }

    /// Remove a DCB. Called only from final free. Returns whether the DCB
    /// was present.
    pub(crate) fn unlink(&self, dcb: &Arc<Dcb>) -> bool {
        let key = dcb.take_registry_key();
        if key == NO_KEY {
            return false;
        }
        let mut dcbs = self.dcbs.lock();
        match dcbs.try_remove(key) {
            Some(entry) => {
                debug_assert!(Arc::ptr_eq(&entry, dcb), "registry key collision");
                true
            }
            None => false,
        }
    }

    /// Walk every live DCB under the registry lock. The visitor must not
    /// allocate or free DCBs.
    pub(crate) fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<Dcb>),
    {
        let dcbs = self.dcbs.lock();
        for (_, dcb) in dcbs.iter() {
            visitor(dcb);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.dcbs.lock().len()
    }
}
