//! The shared structure linking the two endpoints of a local channel

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dial_string::DialString;
use super::registry::LocalRegistry;
use crate::channel::{ChannelDirectory, ChannelRef, ChannelSpec, ChannelState, ChannelTech};
use crate::config::{JitterBufferConfig, LocalChannelConfig, LockingConfig};
use crate::error::{LocalChannelError, Result};
use crate::events::{EventEmitter, LocalChannelEvent};
use crate::format::FormatCapabilities;
use crate::module::{ModuleRef, ModuleUsage};

/// Pair identity
pub type PairId = Uuid;

/// A held pair lock
pub type PairGuard = ArcMutexGuard<RawMutex, PairState>;

/// Attempts at finding an unused pair name before giving up
const NAME_ATTEMPTS: usize = 64;

/// Pair flag bits
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PairFlags(u8);

impl PairFlags {
    /// The dialplan was started on the outbound endpoint
    pub const LAUNCHED_PBX: Self = Self(1 << 0);
    /// The pair already masqueraded itself out of a bridge
    pub const ALREADY_MASQUED: Self = Self(1 << 1);
    /// Never optimize the pair away
    pub const NO_OPTIMIZATION: Self = Self(1 << 2);
    /// Report the far side of the pair as bridge peer
    pub const BRIDGE: Self = Self(1 << 3);
    /// Relay hold/unhold instead of playing music on hold
    pub const MOH_PASSTHRU: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for PairFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::LAUNCHED_PBX, "LAUNCHED_PBX"),
            (Self::ALREADY_MASQUED, "ALREADY_MASQUED"),
            (Self::NO_OPTIMIZATION, "NO_OPTIMIZATION"),
            (Self::BRIDGE, "BRIDGE"),
            (Self::MOH_PASSTHRU, "MOH_PASSTHRU"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PairFlags({})", set.join(" | "))
    }
}

/// Which side of the pair an endpoint is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    /// `;1`, handed back to whoever requested the channel
    Owner,
    /// `;2`, runs the dialplan
    Chan,
}

impl EndpointRole {
    /// Frames written on the outbound side travel towards the owner
    pub fn is_outbound(self) -> bool {
        self == EndpointRole::Chan
    }

    pub fn opposite(self) -> Self {
        match self {
            EndpointRole::Owner => EndpointRole::Chan,
            EndpointRole::Chan => EndpointRole::Owner,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            EndpointRole::Owner => ";1",
            EndpointRole::Chan => ";2",
        }
    }
}

/// Technology private value carried by both endpoints
#[derive(Debug)]
pub struct LocalPvt {
    pub pair: Arc<LocalPair>,
    pub role: EndpointRole,
}

impl LocalPvt {
    /// The local private value of `chan`, if it is a live local endpoint
    pub fn of(chan: &ChannelRef) -> Option<Arc<LocalPvt>> {
        chan.tech_pvt::<LocalPvt>()
    }
}

/// Mutable pair state, protected by the pair lock
#[derive(Debug)]
pub struct PairState {
    pub owner: Option<ChannelRef>,
    pub chan: Option<ChannelRef>,
    pub flags: PairFlags,
    /// Requested format capabilities
    pub reqcap: Option<FormatCapabilities>,
    pub jb_conf: JitterBufferConfig,
    pub(crate) u_owner: Option<ModuleRef>,
    pub(crate) u_chan: Option<ModuleRef>,
    /// Frame deliveries currently running with the pair unlocked
    pub(crate) relays_in_flight: u32,
    /// Both endpoints hung up while a relay was in flight
    pub(crate) cancel_pending: bool,
}

impl PairState {
    pub fn endpoint(&self, role: EndpointRole) -> Option<&ChannelRef> {
        match role {
            EndpointRole::Owner => self.owner.as_ref(),
            EndpointRole::Chan => self.chan.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, role: EndpointRole) -> &mut Option<ChannelRef> {
        match role {
            EndpointRole::Owner => &mut self.owner,
            EndpointRole::Chan => &mut self.chan,
        }
    }

    /// Both endpoint slots are empty
    pub fn is_vacant(&self) -> bool {
        self.owner.is_none() && self.chan.is_none()
    }
}

/// A local channel pair
pub struct LocalPair {
    id: PairId,
    seq: u64,
    name: String,
    exten: String,
    context: String,
    state: Arc<Mutex<PairState>>,
    locking: LockingConfig,
    destroyed: AtomicBool,
    registry: Weak<LocalRegistry>,
    events: EventEmitter,
}

impl fmt::Debug for LocalPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPair")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl LocalPair {
    /// Allocate a pair for `dial` and link it into the registry
    pub(crate) fn create(
        dial: &DialString,
        caps: FormatCapabilities,
        config: &LocalChannelConfig,
        registry: &Arc<LocalRegistry>,
        events: EventEmitter,
    ) -> Result<Arc<Self>> {
        let id = Uuid::new_v4();
        let name = (0..NAME_ATTEMPTS)
            .map(|_| format!("Local/{}@{}-{:04x}", dial.exten, dial.context, rand::random::<u16>()))
            .find(|candidate| registry.reserve_name(candidate, id))
            .ok_or_else(|| LocalChannelError::allocation(format!("no free name for Local/{}", dial)))?;

        let mut flags = PairFlags::empty();
        let mut jb_conf = config.jitterbuffer.clone();
        if dial.options.no_optimization {
            flags.insert(PairFlags::NO_OPTIMIZATION);
        }
        if dial.options.jitterbuffer {
            jb_conf.enabled = true;
        }
        if dial.options.bridge {
            flags.insert(PairFlags::BRIDGE);
        }
        if dial.options.moh_passthru {
            flags.insert(PairFlags::MOH_PASSTHRU);
        }

        let pair = Arc::new(Self {
            id,
            seq: registry.next_seq(),
            name,
            exten: dial.exten.clone(),
            context: dial.context.clone(),
            state: Arc::new(Mutex::new(PairState {
                owner: None,
                chan: None,
                flags,
                reqcap: Some(caps),
                jb_conf,
                u_owner: None,
                u_chan: None,
                relays_in_flight: 0,
                cancel_pending: false,
            })),
            locking: config.locking,
            destroyed: AtomicBool::new(false),
            registry: Arc::downgrade(registry),
            events,
        });
        registry.link(&pair);

        info!("Created local pair {} for {}", pair.name, dial);
        pair.events.emit(LocalChannelEvent::PairCreated {
            pair: pair.id,
            name: pair.name.clone(),
            exten: pair.exten.clone(),
            context: pair.context.clone(),
        });
        Ok(pair)
    }

    pub fn id(&self) -> PairId {
        self.id
    }

    /// Creation order
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exten(&self) -> &str {
        &self.exten
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn locking(&self) -> &LockingConfig {
        &self.locking
    }

    pub(crate) fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Lock the pair
    pub fn lock(&self) -> PairGuard {
        self.state.lock_arc()
    }

    pub fn try_lock(&self) -> Option<PairGuard> {
        self.state.try_lock_arc()
    }

    pub fn flags(&self) -> PairFlags {
        self.state.lock().flags
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tear the pair down. Only the first call has any effect.
    pub(crate) fn destroy(&self, state: &mut PairState) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        state.reqcap = None;
        state.u_owner = None;
        state.u_chan = None;
        if let Some(registry) = self.registry.upgrade() {
            registry.unlink(self);
        }
        info!("Destroyed local pair {}", self.name);
        self.events.emit(LocalChannelEvent::PairDestroyed { pair: self.id });
    }

    /// Allocate the owner (`;1`) and outbound (`;2`) endpoints. The owner is
    /// returned; on failure the pair is destroyed and nothing stays linked.
    pub(crate) fn spawn_endpoints(
        self: &Arc<Self>,
        state: ChannelState,
        linkedid: Option<String>,
        directory: &Arc<ChannelDirectory>,
        tech: Arc<dyn ChannelTech>,
        module: &Arc<ModuleUsage>,
    ) -> Result<ChannelRef> {
        let spec = |role: EndpointRole| {
            ChannelSpec::new(format!("{}{}", self.name, role.suffix()))
                .with_location(self.exten.clone(), self.context.clone())
                .with_tech(Arc::clone(&tech))
        };

        let owner = match directory.alloc(spec(EndpointRole::Owner).with_state(state).with_linkedid(linkedid)) {
            Ok(owner) => owner,
            Err(e) => {
                warn!("Unable to allocate owner channel for {}: {}", self.name, e);
                self.destroy(&mut self.lock());
                return Err(e);
            }
        };
        let owner_linkedid = owner.lock().linkedid.clone();
        let chan = match directory.alloc(
            spec(EndpointRole::Chan)
                .with_state(ChannelState::Ring)
                .with_linkedid(Some(owner_linkedid)),
        ) {
            Ok(chan) => chan,
            Err(e) => {
                warn!("Unable to allocate outbound channel for {}: {}", self.name, e);
                directory.release(&owner);
                self.destroy(&mut self.lock());
                return Err(e);
            }
        };

        let (caps, jb_conf) = {
            let pair = self.lock();
            (pair.reqcap.clone().unwrap_or_default(), pair.jb_conf.clone())
        };
        for (endpoint, role) in [(&owner, EndpointRole::Owner), (&chan, EndpointRole::Chan)] {
            let mut inner = endpoint.lock();
            inner.read_format = caps.best();
            inner.write_format = caps.best();
            inner.native_formats = caps.clone();
            if role == EndpointRole::Owner {
                inner.jitterbuffer = Some(jb_conf.clone());
            }
            drop(inner);
            endpoint.set_tech_pvt(Some(Arc::new(LocalPvt {
                pair: Arc::clone(self),
                role,
            })));
        }

        let mut pair = self.lock();
        pair.u_owner = Some(module.acquire());
        pair.u_chan = Some(module.acquire());
        pair.owner = Some(Arc::clone(&owner));
        pair.chan = Some(chan);
        debug!("Spawned endpoints for {}", self.name);
        Ok(owner)
    }
}
