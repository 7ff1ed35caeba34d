//! Dialplan boundary
//!
//! The local channel only needs two things from the PBX: whether an
//! extension exists, and a way to start dialplan execution on a channel.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::channel::ChannelRef;
use crate::error::{LocalChannelError, Result};

/// Dialplan lookups and execution used by the local channel
pub trait Dialplan: Send + Sync {
    /// Whether `exten` exists at `priority` in `context` for this caller
    fn exists_extension(&self, context: &str, exten: &str, priority: u32, caller_id: Option<&str>) -> bool;

    /// Start running the dialplan on `chan` in its own thread of control.
    ///
    /// Called with `chan`, its owner and their pair locked, so execution
    /// must be handed off rather than run inline.
    fn start_pbx(&self, chan: &ChannelRef) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExtensionKey {
    context: String,
    exten: String,
    caller_id: Option<String>,
}

/// An in-memory dialplan
///
/// Extensions exist at every priority. An extension registered with a caller
/// id only matches that caller.
#[derive(Debug, Default)]
pub struct StaticDialplan {
    extensions: Mutex<HashSet<ExtensionKey>>,
    started: Mutex<Vec<ChannelRef>>,
    fail_start: Mutex<bool>,
}

impl StaticDialplan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`StaticDialplan::add_extension`]
    pub fn with_extension(self, context: &str, exten: &str) -> Self {
        self.add_extension(context, exten);
        self
    }

    pub fn add_extension(&self, context: &str, exten: &str) {
        self.extensions.lock().insert(ExtensionKey {
            context: context.to_string(),
            exten: exten.to_string(),
            caller_id: None,
        });
    }

    /// Register an extension that only matches calls from `caller_id`
    pub fn add_caller_extension(&self, context: &str, exten: &str, caller_id: &str) {
        self.extensions.lock().insert(ExtensionKey {
            context: context.to_string(),
            exten: exten.to_string(),
            caller_id: Some(caller_id.to_string()),
        });
    }

    /// Make subsequent `start_pbx` calls fail
    pub fn set_fail_start(&self, fail: bool) {
        *self.fail_start.lock() = fail;
    }

    /// Channels the dialplan was started on, oldest first
    pub fn started(&self) -> Vec<ChannelRef> {
        self.started.lock().clone()
    }
}

impl Dialplan for StaticDialplan {
    fn exists_extension(&self, context: &str, exten: &str, _priority: u32, caller_id: Option<&str>) -> bool {
        let extensions = self.extensions.lock();
        let mut key = ExtensionKey {
            context: context.to_string(),
            exten: exten.to_string(),
            caller_id: None,
        };
        if extensions.contains(&key) {
            return true;
        }
        key.caller_id = caller_id.map(str::to_string);
        key.caller_id.is_some() && extensions.contains(&key)
    }

    fn start_pbx(&self, chan: &ChannelRef) -> Result<()> {
        if *self.fail_start.lock() {
            return Err(LocalChannelError::PbxStart(chan.name().to_string()));
        }
        debug!("Starting dialplan on '{}'", chan.name());
        self.started.lock().push(chan.clone());
        Ok(())
    }
}
