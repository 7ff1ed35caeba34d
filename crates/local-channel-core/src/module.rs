//! Module usage accounting
//!
//! Every live endpoint holds a [`ModuleRef`]; the driver can not be unloaded
//! cleanly while any are outstanding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Usage counter for a loaded module
#[derive(Debug, Default)]
pub struct ModuleUsage {
    name: String,
    users: AtomicUsize,
}

impl ModuleUsage {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            users: AtomicUsize::new(0),
        })
    }

    /// Take a module-busy reference
    pub fn acquire(self: &Arc<Self>) -> ModuleRef {
        self.users.fetch_add(1, Ordering::AcqRel);
        ModuleRef {
            usage: Arc::clone(self),
        }
    }

    pub fn users(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A module-busy reference, released on drop
#[derive(Debug)]
pub struct ModuleRef {
    usage: Arc<ModuleUsage>,
}

impl Drop for ModuleRef {
    fn drop(&mut self) {
        self.usage.users.fetch_sub(1, Ordering::AcqRel);
    }
}
