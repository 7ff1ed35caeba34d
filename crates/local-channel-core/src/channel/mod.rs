//! Generic channel layer
//!
//! The pieces of the channel abstraction the local proxy channel relies on:
//! a per-channel lock, a read queue, the current bridge peer, party state,
//! variables, hangup flags and the masquerade primitive. A channel's
//! behaviour is supplied by its [`ChannelTech`].
//!
//! Lock discipline: [`Channel::lock`] returns an owning guard so a held lock
//! also keeps the channel alive. The bridge peer and the technology private
//! value sit behind their own leaf locks and may be read while other locks
//! are held.

pub mod directory;
pub mod party;
pub mod tech;

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{ArcMutexGuard, Condvar, Mutex, RawMutex};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::JitterBufferConfig;
use crate::error::{LocalChannelError, Result};
use crate::format::{Format, FormatCapabilities};
use crate::frame::{ControlType, Frame};

pub use directory::{ChannelDirectory, ChannelSpec};
pub use party::{PartyCaller, PartyConnectedLine, PartyDialed, PartyId, PartyRedirecting};
pub use tech::{ChannelOption, ChannelTech, OptionValue, QueryOption};

/// Shared handle to a channel
pub type ChannelRef = Arc<Channel>;

/// A held channel lock
pub type ChannelGuard = ArcMutexGuard<RawMutex, ChannelInner>;

/// Technology private value attached to a channel
pub type TechPvt = Arc<dyn Any + Send + Sync>;

/// Externally visible channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Down,
    Reserved,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Down => "Down",
            ChannelState::Reserved => "Rsrvd",
            ChannelState::OffHook => "OffHook",
            ChannelState::Dialing => "Dialing",
            ChannelState::Ring => "Ring",
            ChannelState::Ringing => "Ringing",
            ChannelState::Up => "Up",
            ChannelState::Busy => "Busy",
        };
        f.write_str(s)
    }
}

/// Why a soft hangup was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftHangupCause {
    /// Queued by a channel driver
    Dev,
    /// The owning module is being unloaded
    AppUnload,
    Explicit,
    Timeout,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum T38State {
    #[default]
    Unavailable,
    Unknown,
    Negotiating,
    Rejected,
    Enabled,
}

/// A recording attached to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub filename: String,
}

/// An audio hook (spy, whisper, manipulate) attached to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHook {
    pub source: String,
}

/// GROUP() assignment counted against a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAssignment {
    pub category: Option<String>,
    pub group: String,
}

/// State protected by the channel lock
pub struct ChannelInner {
    pub state: ChannelState,
    pub context: String,
    pub exten: String,
    pub priority: u32,
    pub linkedid: String,

    pub caller: PartyCaller,
    pub connected: PartyConnectedLine,
    pub redirecting: PartyRedirecting,
    pub dialed: PartyDialed,

    /// Dialplan variables, in insertion order
    pub variables: IndexMap<String, String>,

    pub hangup_cause: u32,
    pub soft_hangup: Option<SoftHangupCause>,
    pub answered_elsewhere: bool,

    pub monitor: Option<Monitor>,
    pub audiohooks: Vec<AudioHook>,
    pub groups: Vec<GroupAssignment>,
    /// Music-on-hold class currently playing
    pub moh: Option<String>,
    pub t38_state: T38State,

    pub language: String,
    pub accountcode: String,
    pub musicclass: String,
    pub amaflags: u32,

    pub native_formats: FormatCapabilities,
    pub read_format: Option<Format>,
    pub write_format: Option<Format>,
    pub jitterbuffer: Option<JitterBufferConfig>,

    zombie: bool,
    readq: VecDeque<Frame>,
    readq_signal: Arc<Condvar>,
}

impl ChannelInner {
    fn new(spec: &ChannelSpec, readq_signal: Arc<Condvar>) -> Self {
        Self {
            state: spec.state,
            context: spec.context.clone(),
            exten: spec.exten.clone(),
            priority: 1,
            linkedid: spec.linkedid.clone().unwrap_or_default(),
            caller: PartyCaller::default(),
            connected: PartyConnectedLine::default(),
            redirecting: PartyRedirecting::default(),
            dialed: PartyDialed::default(),
            variables: IndexMap::new(),
            hangup_cause: 0,
            soft_hangup: None,
            answered_elsewhere: false,
            monitor: None,
            audiohooks: Vec::new(),
            groups: Vec::new(),
            moh: None,
            t38_state: T38State::default(),
            language: String::new(),
            accountcode: spec.accountcode.clone(),
            musicclass: String::new(),
            amaflags: spec.amaflags,
            native_formats: FormatCapabilities::new(),
            read_format: None,
            write_format: None,
            jitterbuffer: None,
            zombie: false,
            readq: VecDeque::new(),
            readq_signal,
        }
    }

    /// Append a frame to the read queue and wake any reader
    pub fn queue_frame(&mut self, frame: Frame) {
        trace!("Queueing {:?}", frame);
        self.readq.push_back(frame);
        self.readq_signal.notify_all();
    }

    /// Request a hangup and queue a HANGUP frame for the reader
    pub fn queue_hangup(&mut self) {
        self.soft_hangup.get_or_insert(SoftHangupCause::Dev);
        self.queue_frame(Frame::control(ControlType::Hangup));
    }

    /// Request a hangup and wake the reader
    pub fn soft_hangup(&mut self, cause: SoftHangupCause) {
        self.soft_hangup = Some(cause);
        self.queue_frame(Frame::Null);
    }

    pub fn check_hangup(&self) -> bool {
        self.zombie || self.soft_hangup.is_some()
    }

    pub fn is_zombie(&self) -> bool {
        self.zombie
    }

    pub fn readq_len(&self) -> usize {
        self.readq.len()
    }

    pub fn has_pending_frames(&self) -> bool {
        !self.readq.is_empty()
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.readq.pop_front()
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn start_moh(&mut self, class: Option<&str>) {
        let class = match class {
            Some(c) if !c.is_empty() => c.to_string(),
            _ if !self.musicclass.is_empty() => self.musicclass.clone(),
            _ => "default".to_string(),
        };
        debug!("Starting music on hold, class {}", class);
        self.moh = Some(class);
    }

    pub fn stop_moh(&mut self) {
        self.moh = None;
    }
}

/// A channel
pub struct Channel {
    id: Uuid,
    name: String,
    tech: Option<Arc<dyn ChannelTech>>,
    inner: Arc<Mutex<ChannelInner>>,
    readq_signal: Arc<Condvar>,
    bridge: Mutex<Option<Weak<Channel>>>,
    tech_pvt: Mutex<Option<TechPvt>>,
    generator: AtomicBool,
    directory: Weak<ChannelDirectory>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("tech", &self.tech_name())
            .finish()
    }
}

impl Channel {
    pub(crate) fn from_spec(spec: ChannelSpec, directory: Weak<ChannelDirectory>) -> ChannelRef {
        let readq_signal = Arc::new(Condvar::new());
        let id = Uuid::new_v4();
        let mut inner = ChannelInner::new(&spec, Arc::clone(&readq_signal));
        if inner.linkedid.is_empty() {
            inner.linkedid = id.to_string();
        }
        Arc::new(Self {
            id,
            name: spec.name,
            tech: spec.tech,
            inner: Arc::new(Mutex::new(inner)),
            readq_signal,
            bridge: Mutex::new(None),
            tech_pvt: Mutex::new(None),
            generator: AtomicBool::new(false),
            directory,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tech(&self) -> Option<&Arc<dyn ChannelTech>> {
        self.tech.as_ref()
    }

    pub fn tech_name(&self) -> &'static str {
        self.tech.as_ref().map(|t| t.name()).unwrap_or("")
    }

    /// Lock the channel
    pub fn lock(&self) -> ChannelGuard {
        self.inner.lock_arc()
    }

    /// Lock the channel if nobody else holds it
    pub fn try_lock(&self) -> Option<ChannelGuard> {
        self.inner.try_lock_arc()
    }

    /// Technology private value, if it is a `T`
    pub fn tech_pvt<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let pvt = self.tech_pvt.lock().clone()?;
        pvt.downcast::<T>().ok()
    }

    pub fn set_tech_pvt(&self, pvt: Option<TechPvt>) {
        *self.tech_pvt.lock() = pvt;
    }

    pub fn take_tech_pvt(&self) -> Option<TechPvt> {
        self.tech_pvt.lock().take()
    }

    /// Whether a synchronous generator is producing audio on this channel
    pub fn has_generator(&self) -> bool {
        self.generator.load(Ordering::Acquire)
    }

    pub fn set_generator(&self, active: bool) {
        self.generator.store(active, Ordering::Release);
    }

    /// The channel this one is directly bridged to
    pub fn bridge_peer(&self) -> Option<ChannelRef> {
        self.bridge.lock().as_ref().and_then(Weak::upgrade)
    }

    fn clear_bridge_if(&self, peer: &ChannelRef) {
        let mut bridge = self.bridge.lock();
        let points_at_peer = bridge
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|current| Arc::ptr_eq(&current, peer))
            .unwrap_or(true);
        if points_at_peer {
            *bridge = None;
        }
    }

    /// Bridge two channels directly, breaking any bridge either was in
    pub fn bridge(a: &ChannelRef, b: &ChannelRef) {
        a.unbridge();
        b.unbridge();
        *a.bridge.lock() = Some(Arc::downgrade(b));
        *b.bridge.lock() = Some(Arc::downgrade(a));
        debug!("Bridged {} <-> {}", a.name(), b.name());
    }

    /// Leave the current bridge
    pub fn unbridge(self: &Arc<Self>) {
        let peer = self.bridge.lock().take().and_then(|w| w.upgrade());
        if let Some(peer) = peer {
            peer.clear_bridge_if(self);
        }
    }

    /// The channel on the far side of the bridge, asking the peer's
    /// technology who it really fronts for
    pub fn bridged_channel(self: &Arc<Self>) -> Option<ChannelRef> {
        let peer = self.bridge_peer()?;
        match peer.tech() {
            Some(tech) => tech.bridged_channel(self, &peer),
            None => Some(peer),
        }
    }

    /// Push a frame onto this channel's read queue
    pub fn queue_frame(&self, frame: Frame) {
        self.inner.lock().queue_frame(frame);
    }

    /// Push a frame, running `prepare` under the channel lock first
    pub fn queue_frame_with<F>(&self, frame: Frame, prepare: F)
    where
        F: FnOnce(&mut ChannelInner),
    {
        let mut inner = self.inner.lock();
        if frame.is_control(ControlType::Ringing) {
            inner.state = ChannelState::Ringing;
        }
        prepare(&mut inner);
        inner.queue_frame(frame);
    }

    pub fn queue_hangup(&self) {
        self.inner.lock().queue_hangup();
    }

    pub fn soft_hangup(&self, cause: SoftHangupCause) {
        self.inner.lock().soft_hangup(cause);
    }

    pub fn readq_len(&self) -> usize {
        self.inner.lock().readq_len()
    }

    /// Take the next queued frame without waiting
    pub fn try_read(&self) -> Option<Frame> {
        self.inner.lock().pop_frame()
    }

    /// Wait up to `timeout` for a frame
    pub fn read_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.pop_frame() {
                return Some(frame);
            }
            if self.readq_signal.wait_until(&mut inner, deadline).timed_out() {
                return inner.pop_frame();
            }
        }
    }

    /// Take every queued frame
    pub fn drain_frames(&self) -> Vec<Frame> {
        self.inner.lock().readq.drain(..).collect()
    }

    fn live_guard(&self) -> Result<ChannelGuard> {
        let guard = self.lock();
        if guard.zombie {
            return Err(LocalChannelError::no_longer_valid(format!("{} is hung up", self.name)));
        }
        Ok(guard)
    }

    /// Write a frame to the channel's technology
    pub fn write(self: &Arc<Self>, frame: Frame) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.write(self, &mut guard, frame),
            None => Ok(()),
        }
    }

    /// Indicate a condition. Connected line and redirecting payloads are
    /// deltas and are folded into the channel's own party state first.
    pub fn indicate(self: &Arc<Self>, condition: ControlType, data: Bytes) -> Result<()> {
        let mut guard = self.live_guard()?;
        match condition {
            ControlType::ConnectedLine if !data.is_empty() => {
                let update = PartyConnectedLine::decode(&data)?;
                guard.connected.merge(&update);
            }
            ControlType::Redirecting if !data.is_empty() => {
                let update = PartyRedirecting::decode(&data)?;
                guard.redirecting.merge(&update);
            }
            _ => {}
        }
        match &self.tech {
            Some(tech) => tech.indicate(self, &mut guard, condition, data),
            None => Ok(()),
        }
    }

    pub fn call(self: &Arc<Self>, dest: &str, timeout: Option<Duration>) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.call(self, &mut guard, dest, timeout),
            None => Ok(()),
        }
    }

    pub fn answer(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.live_guard()?;
        if let Some(tech) = &self.tech {
            tech.answer(self, &mut guard)?;
        }
        guard.state = ChannelState::Up;
        Ok(())
    }

    pub fn send_digit_begin(self: &Arc<Self>, digit: char) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.send_digit_begin(self, &mut guard, digit),
            None => Ok(()),
        }
    }

    pub fn send_digit_end(self: &Arc<Self>, digit: char, duration_ms: u32) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.send_digit_end(self, &mut guard, digit, duration_ms),
            None => Ok(()),
        }
    }

    pub fn send_text(self: &Arc<Self>, text: &str) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.send_text(self, &mut guard, text),
            None => Ok(()),
        }
    }

    pub fn send_html(self: &Arc<Self>, subclass: i32, data: Bytes) -> Result<()> {
        let mut guard = self.live_guard()?;
        match &self.tech {
            Some(tech) => tech.send_html(self, &mut guard, subclass, data),
            None => Ok(()),
        }
    }

    pub fn query_option(self: &Arc<Self>, option: QueryOption) -> Result<OptionValue> {
        let mut guard = self.lock();
        match &self.tech {
            Some(tech) => tech.query_option(self, &mut guard, option),
            None => match option {
                QueryOption::T38State => Ok(OptionValue::T38State(guard.t38_state)),
            },
        }
    }

    pub fn set_option(self: &Arc<Self>, option: ChannelOption) -> Result<()> {
        let mut guard = self.lock();
        match &self.tech {
            Some(tech) => tech.set_option(self, &mut guard, option),
            None => Err(LocalChannelError::UnsupportedOption(format!("{:?}", option))),
        }
    }

    /// Hang the channel up: run the technology hangup, leave any bridge
    /// and drop out of the directory. Hanging up twice is a no-op.
    pub fn hangup(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.lock();
        if guard.zombie {
            return Ok(());
        }
        let res = match &self.tech {
            Some(tech) => tech.hangup(self, &mut guard),
            None => Ok(()),
        };
        guard.zombie = true;
        guard.state = ChannelState::Down;
        drop(guard);

        self.unbridge();
        self.tech_pvt.lock().take();
        if let Some(directory) = self.directory.upgrade() {
            directory.unlink(self);
        }
        debug!("Hungup '{}'", self.name);
        res
    }
}

/// Make `target` assume the identity of `source`: `source` leaves whatever
/// bridge it was in and is bridged to `target`, and the two exchange party
/// state, monitor and audio hooks. Both channels must be locked by the
/// caller.
pub fn masquerade(target: &ChannelRef, target_inner: &mut ChannelInner, source: &ChannelRef, source_inner: &mut ChannelInner) {
    if let Some(previous) = source.bridge_peer() {
        if !Arc::ptr_eq(&previous, target) {
            previous.clear_bridge_if(source);
        }
    }
    if let Some(previous) = target.bridge_peer() {
        if !Arc::ptr_eq(&previous, source) {
            previous.clear_bridge_if(target);
        }
    }
    *source.bridge.lock() = Some(Arc::downgrade(target));
    *target.bridge.lock() = Some(Arc::downgrade(source));

    std::mem::swap(&mut target_inner.caller, &mut source_inner.caller);
    std::mem::swap(&mut target_inner.redirecting, &mut source_inner.redirecting);
    std::mem::swap(&mut target_inner.dialed, &mut source_inner.dialed);
    std::mem::swap(&mut target_inner.monitor, &mut source_inner.monitor);
    std::mem::swap(&mut target_inner.audiohooks, &mut source_inner.audiohooks);

    debug!("Masqueraded '{}' into '{}'", source.name(), target.name());
}

/// Hand `old`'s technology private value to `new` and let the technology
/// repoint its references, as the masquerade machinery does after a swap.
pub fn fixup(old: &ChannelRef, new: &ChannelRef) -> Result<()> {
    if let Some(pvt) = old.take_tech_pvt() {
        new.set_tech_pvt(Some(pvt));
    }
    let mut guard = new.lock();
    match new.tech() {
        Some(tech) => tech.fixup(old, new, &mut guard),
        None => Ok(()),
    }
}
