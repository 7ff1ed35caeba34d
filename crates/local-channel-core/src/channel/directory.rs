//! Named channel allocation and lookup

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{Channel, ChannelRef, ChannelState, ChannelTech};
use crate::error::{LocalChannelError, Result};

/// Parameters for a new channel
#[derive(Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub state: ChannelState,
    pub context: String,
    pub exten: String,
    pub linkedid: Option<String>,
    pub accountcode: String,
    pub amaflags: u32,
    pub tech: Option<Arc<dyn ChannelTech>>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ChannelState::Down,
            context: String::new(),
            exten: String::new(),
            linkedid: None,
            accountcode: String::new(),
            amaflags: 0,
            tech: None,
        }
    }

    pub fn with_state(mut self, state: ChannelState) -> Self {
        self.state = state;
        self
    }

    pub fn with_location(mut self, exten: impl Into<String>, context: impl Into<String>) -> Self {
        self.exten = exten.into();
        self.context = context.into();
        self
    }

    pub fn with_linkedid(mut self, linkedid: Option<String>) -> Self {
        self.linkedid = linkedid;
        self
    }

    pub fn with_tech(mut self, tech: Arc<dyn ChannelTech>) -> Self {
        self.tech = Some(tech);
        self
    }
}

/// All live channels, by name
pub struct ChannelDirectory {
    channels: DashMap<String, ChannelRef>,
    max_channels: Option<usize>,
    allocated: AtomicU64,
}

impl ChannelDirectory {
    pub fn new(max_channels: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
            max_channels,
            allocated: AtomicU64::new(0),
        })
    }

    /// Allocate and register a channel
    pub fn alloc(self: &Arc<Self>, spec: ChannelSpec) -> Result<ChannelRef> {
        if let Some(max) = self.max_channels {
            if self.channels.len() >= max {
                warn!("Channel limit of {} reached, refusing '{}'", max, spec.name);
                return Err(LocalChannelError::allocation(format!("channel limit {} reached", max)));
            }
        }

        let name = spec.name.clone();
        let chan = Channel::from_spec(spec, Arc::downgrade(self));
        match self.channels.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                Err(LocalChannelError::allocation(format!("channel '{}' already exists", e.key())))
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::clone(&chan));
                self.allocated.fetch_add(1, Ordering::Relaxed);
                debug!("Allocated channel '{}'", chan.name());
                Ok(chan)
            }
        }
    }

    /// Drop a channel that was never handed out, without running its hangup
    pub fn release(&self, chan: &ChannelRef) {
        chan.take_tech_pvt();
        self.unlink(chan);
    }

    pub(crate) fn unlink(&self, chan: &ChannelRef) {
        self.channels.remove_if(chan.name(), |_, current| Arc::ptr_eq(current, chan));
    }

    pub fn get_by_name(&self, name: &str) -> Option<ChannelRef> {
        self.channels.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels allocated over the directory's lifetime
    pub fn total_allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_hangup_unlinks() {
        let directory = ChannelDirectory::new(None);
        let chan = directory.alloc(ChannelSpec::new("SIP/alice-0001")).unwrap();
        assert!(directory.get_by_name("SIP/alice-0001").is_some());
        chan.hangup().unwrap();
        assert!(directory.get_by_name("SIP/alice-0001").is_none());
        assert_eq!(directory.total_allocated(), 1);
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let directory = ChannelDirectory::new(Some(1));
        let _a = directory.alloc(ChannelSpec::new("SIP/a")).unwrap();
        assert!(matches!(
            directory.alloc(ChannelSpec::new("SIP/b")),
            Err(LocalChannelError::Allocation(_))
        ));

        let directory = ChannelDirectory::new(None);
        let _a = directory.alloc(ChannelSpec::new("SIP/a")).unwrap();
        assert!(directory.alloc(ChannelSpec::new("SIP/a")).is_err());
        assert_eq!(directory.len(), 1);
    }
}
