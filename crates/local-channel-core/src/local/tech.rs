//! Channel technology callbacks for both endpoints of a local pair

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::locking::{lock_pair_and_endpoints, PairLocks};
use super::optimizer;
use super::pair::{EndpointRole, LocalPair, LocalPvt, PairFlags, PairGuard};
use super::relay;
use crate::channel::{
    ChannelGuard, ChannelOption, ChannelRef, ChannelTech, OptionValue, PartyCaller, PartyConnectedLine, QueryOption,
};
use crate::dialplan::Dialplan;
use crate::error::{LocalChannelError, Result};
use crate::events::LocalChannelEvent;
use crate::frame::{ControlType, Frame};

/// Technology name of local channels
pub const LOCAL_TECH_NAME: &str = "Local";

/// The `Local` channel technology
pub struct LocalTech {
    dialplan: Arc<dyn Dialplan>,
}

fn pvt_of(chan: &ChannelRef) -> Result<Arc<LocalPvt>> {
    LocalPvt::of(chan).ok_or_else(|| LocalChannelError::no_longer_valid(format!("'{}' has no local pair", chan.name())))
}

/// Lock the pair, failing if `ast` no longer occupies its slot
fn lock_pair(pvt: &LocalPvt, ast: &ChannelRef) -> Result<PairGuard> {
    let state = pvt.pair.lock();
    if state.endpoint(pvt.role).is_some_and(|c| Arc::ptr_eq(c, ast)) {
        Ok(state)
    } else {
        Err(LocalChannelError::no_longer_valid(format!(
            "'{}' is no longer part of {}",
            ast.name(),
            pvt.pair.name()
        )))
    }
}

impl LocalTech {
    pub fn new(dialplan: Arc<dyn Dialplan>) -> Self {
        Self { dialplan }
    }

    fn relay(&self, ast: &ChannelRef, guard: &mut ChannelGuard, frame: Frame) -> Result<()> {
        let pvt = pvt_of(ast)?;
        let mut state = lock_pair(&pvt, ast)?;
        relay::queue_frame(&pvt.pair, &mut state, pvt.role, frame, Some(guard), |_| {})
    }

    /// Copy the owner's call setup onto the outbound endpoint and start the
    /// dialplan on it
    fn launch(&self, ast: &ChannelRef, pair: &Arc<LocalPair>) -> Result<()> {
        let mut locks = lock_pair_and_endpoints(pair)?;
        let (Some(owner), Some(chan)) = (locks.owner.as_ref(), locks.chan.as_mut()) else {
            return Err(LocalChannelError::no_longer_valid(format!(
                "{} lost an endpoint during call setup",
                pair.name()
            )));
        };
        if !Arc::ptr_eq(&owner.chan, ast) {
            return Err(LocalChannelError::no_longer_valid(format!(
                "'{}' is not the owner of {}",
                ast.name(),
                pair.name()
            )));
        }

        let o = &owner.guard;
        let c = &mut chan.guard;
        c.redirecting = o.redirecting.clone();
        c.dialed = o.dialed.clone();
        c.caller = PartyCaller::from_connected(&o.connected);
        c.connected = PartyConnectedLine::from_caller(&o.caller);
        c.language = o.language.clone();
        c.accountcode = o.accountcode.clone();
        c.musicclass = o.musicclass.clone();
        if o.answered_elsewhere {
            c.answered_elsewhere = true;
        }
        for (name, value) in &o.variables {
            c.set_variable(name.clone(), value.clone());
        }

        let caller_number = o.caller.id.number.clone();
        if !self.dialplan.exists_extension(&c.context, &c.exten, 1, caller_number.as_deref()) {
            info!(
                "No such extension/context {}@{} while calling Local channel",
                c.exten, c.context
            );
            return Err(LocalChannelError::NoSuchExtension {
                exten: c.exten.clone(),
                context: c.context.clone(),
            });
        }

        self.dialplan.start_pbx(&chan.chan)?;
        locks.pair.flags.insert(PairFlags::LAUNCHED_PBX);
        pair.events().emit(LocalChannelEvent::PbxLaunched { pair: pair.id() });
        Ok(())
    }

    fn hangup_endpoint(&self, ast: &ChannelRef, pvt: &LocalPvt, answered_elsewhere: bool, cause: u32) -> Result<()> {
        let pair = &pvt.pair;
        let role = pvt.role;
        let mut locks = lock_pair_and_endpoints(pair)?;

        if !locks.pair.endpoint(role).is_some_and(|c| Arc::ptr_eq(c, ast)) {
            // Already detached while the lock was let go
            debug!("'{}' already gone from {}", ast.name(), pair.name());
            return Ok(());
        }

        if answered_elsewhere {
            if let Some(chan) = locks.chan.as_mut() {
                chan.guard.answered_elsewhere = true;
                debug!("This local call has the ANSWERED_ELSEWHERE flag set.");
            }
        }

        match role {
            EndpointRole::Chan => {
                let status = locks
                    .chan
                    .as_ref()
                    .and_then(|c| c.guard.variable("DIALSTATUS").map(str::to_string));
                if let (Some(status), Some(owner)) = (status, locks.owner.as_mut()) {
                    owner.guard.hangup_cause = cause;
                    owner.guard.set_variable("CHANLOCALSTATUS", status);
                }
                locks.pair.chan = None;
                locks.pair.flags.remove(PairFlags::LAUNCHED_PBX);
                locks.pair.u_chan = None;
            }
            EndpointRole::Owner => {
                locks.pair.u_owner = None;
                if let Some(chan) = locks.chan.as_mut() {
                    chan.guard.queue_hangup();
                }
                locks.pair.owner = None;
            }
        }
        ast.set_tech_pvt(None);

        let PairLocks { pair: mut state, owner, chan } = locks;
        drop(owner);
        drop(chan);

        if state.is_vacant() {
            if state.relays_in_flight > 0 {
                debug!("Glare on {}, leaving destruction to the in-flight relay", pair.name());
                state.cancel_pending = true;
            } else {
                pair.destroy(&mut state);
            }
            return Ok(());
        }

        if !state.flags.contains(PairFlags::LAUNCHED_PBX) {
            if let Some(ochan) = state.chan.clone() {
                // Nothing on the other side would process a queued hangup
                drop(state);
                return ochan.hangup();
            }
        }

        match relay::queue_frame(pair, &mut state, role, Frame::hangup(cause), None, |_| {}) {
            Err(LocalChannelError::PairGone) => Ok(()),
            other => other,
        }
    }
}

impl ChannelTech for LocalTech {
    fn name(&self) -> &'static str {
        LOCAL_TECH_NAME
    }

    fn call(&self, ast: &ChannelRef, guard: &mut ChannelGuard, dest: &str, _timeout: Option<Duration>) -> Result<()> {
        let pvt = pvt_of(ast)?;
        if pvt.role != EndpointRole::Owner {
            return Err(LocalChannelError::no_longer_valid(format!(
                "'{}' is not the owner of {}",
                ast.name(),
                pvt.pair.name()
            )));
        }
        debug!("Calling {} via '{}'", dest, ast.name());
        ChannelGuard::unlocked(guard, || self.launch(ast, &pvt.pair))
    }

    fn hangup(&self, ast: &ChannelRef, guard: &mut ChannelGuard) -> Result<()> {
        let Some(pvt) = LocalPvt::of(ast) else {
            return Ok(());
        };
        let answered_elsewhere = guard.answered_elsewhere;
        let cause = guard.hangup_cause;
        ChannelGuard::unlocked(guard, || self.hangup_endpoint(ast, &pvt, answered_elsewhere, cause))
    }

    fn answer(&self, ast: &ChannelRef, guard: &mut ChannelGuard) -> Result<()> {
        let pvt = pvt_of(ast)?;
        if !pvt.role.is_outbound() {
            warn!("Huh?  Local is being asked to answer?");
            return Err(LocalChannelError::NotOutbound(ast.name().to_string()));
        }
        self.relay(ast, guard, Frame::control(ControlType::Answer))
    }

    fn write(&self, ast: &ChannelRef, guard: &mut ChannelGuard, frame: Frame) -> Result<()> {
        let pvt = pvt_of(ast)?;
        let mut state = lock_pair(&pvt, ast)?;
        if pvt.role.is_outbound() && frame.is_media() {
            optimizer::check_bridge(&pvt.pair, &mut state, ast, guard);
        }
        if state.flags.contains(PairFlags::ALREADY_MASQUED) {
            debug!("Not posting to queue since already masqueraded on '{}'", ast.name());
            return Ok(());
        }
        relay::queue_frame(&pvt.pair, &mut state, pvt.role, frame, Some(guard), |_| {})
    }

    fn indicate(&self, ast: &ChannelRef, guard: &mut ChannelGuard, condition: ControlType, data: Bytes) -> Result<()> {
        let pvt = pvt_of(ast)?;
        let mut state = lock_pair(&pvt, ast)?;
        let moh_passthru = state.flags.contains(PairFlags::MOH_PASSTHRU);
        let outbound = pvt.role.is_outbound();

        match condition {
            ControlType::Hold if !moh_passthru => {
                let class = std::str::from_utf8(&data).ok();
                guard.start_moh(class);
                Ok(())
            }
            ControlType::Unhold if !moh_passthru => {
                guard.stop_moh();
                Ok(())
            }
            ControlType::ConnectedLine => {
                if state.endpoint(pvt.role.opposite()).is_none() {
                    return Ok(());
                }
                // Relay the accumulated state; the delta alone loses fields
                let frame = Frame::control_with_data(condition, guard.connected.encode()?);
                if outbound {
                    let caller = PartyCaller::from_connected(&guard.connected);
                    relay::queue_frame(&pvt.pair, &mut state, pvt.role, frame, Some(guard), move |other| {
                        other.caller = caller;
                    })
                } else {
                    relay::queue_frame(&pvt.pair, &mut state, pvt.role, frame, Some(guard), |_| {})
                }
            }
            ControlType::Redirecting => {
                if state.endpoint(pvt.role.opposite()).is_none() {
                    return Ok(());
                }
                let frame = Frame::control_with_data(condition, guard.redirecting.encode()?);
                relay::queue_frame(&pvt.pair, &mut state, pvt.role, frame, Some(guard), |_| {})
            }
            _ => relay::queue_frame(
                &pvt.pair,
                &mut state,
                pvt.role,
                Frame::control_with_data(condition, data),
                Some(guard),
                |_| {},
            ),
        }
    }

    fn fixup(&self, old: &ChannelRef, new: &ChannelRef, new_guard: &mut ChannelGuard) -> Result<()> {
        let pvt = pvt_of(new)?;
        let mut state = pvt.pair.lock();

        if !state.endpoint(pvt.role).is_some_and(|c| Arc::ptr_eq(c, old)) {
            warn!(
                "Old channel wasn't '{}' but was {:?}/{:?}",
                old.name(),
                state.owner.as_ref().map(|c| c.name().to_string()),
                state.chan.as_ref().map(|c| c.name().to_string())
            );
            return Err(LocalChannelError::no_longer_valid(format!(
                "'{}' is not part of {}",
                old.name(),
                pvt.pair.name()
            )));
        }

        let (owner, chan) = match pvt.role {
            EndpointRole::Owner => (Some(new.clone()), state.chan.clone()),
            EndpointRole::Chan => (state.owner.clone(), Some(new.clone())),
        };
        if let (Some(owner), Some(chan)) = (owner, chan) {
            let bridged_to = |a: &ChannelRef, b: &ChannelRef| a.bridge_peer().is_some_and(|p| Arc::ptr_eq(&p, b));
            if !new_guard.check_hangup() && (bridged_to(&owner, &chan) || bridged_to(&chan, &owner)) {
                warn!("You can not bridge a Local channel to itself!");
                drop(state);
                new_guard.queue_hangup();
                // The old endpoint stays in the slot and keeps the pair
                if let Some(pvt) = new.take_tech_pvt() {
                    old.set_tech_pvt(Some(pvt));
                }
                return Err(LocalChannelError::SelfBridge);
            }
        }

        *state.slot_mut(pvt.role) = Some(new.clone());
        debug!("Fixed up {} from '{}' to '{}'", pvt.pair.name(), old.name(), new.name());
        Ok(())
    }

    fn send_digit_begin(&self, ast: &ChannelRef, guard: &mut ChannelGuard, digit: char) -> Result<()> {
        self.relay(ast, guard, Frame::DtmfBegin { digit })
    }

    fn send_digit_end(&self, ast: &ChannelRef, guard: &mut ChannelGuard, digit: char, duration_ms: u32) -> Result<()> {
        self.relay(ast, guard, Frame::DtmfEnd { digit, duration_ms })
    }

    fn send_text(&self, ast: &ChannelRef, guard: &mut ChannelGuard, text: &str) -> Result<()> {
        self.relay(ast, guard, Frame::Text(text.to_string()))
    }

    fn send_html(&self, ast: &ChannelRef, guard: &mut ChannelGuard, subclass: i32, data: Bytes) -> Result<()> {
        self.relay(ast, guard, Frame::Html { subclass, data })
    }

    fn query_option(&self, ast: &ChannelRef, guard: &mut ChannelGuard, option: QueryOption) -> Result<OptionValue> {
        let pvt = pvt_of(ast)?;
        let other = {
            let state = lock_pair(&pvt, ast)?;
            state.endpoint(pvt.role.opposite()).cloned()
        };
        let other = other.ok_or_else(|| {
            LocalChannelError::no_longer_valid(format!("other side of '{}' went away", ast.name()))
        })?;
        // Can't query unless the other side is bridged
        let bridged = other
            .bridged_channel()
            .ok_or_else(|| LocalChannelError::not_found(format!("'{}' is not bridged", other.name())))?;
        ChannelGuard::unlocked(guard, || bridged.query_option(option))
    }

    fn set_option(&self, ast: &ChannelRef, guard: &mut ChannelGuard, option: ChannelOption) -> Result<()> {
        let ChannelOption::ChannelWrite { name, value } = option;
        let pvt = pvt_of(ast)?;
        let other = {
            let state = lock_pair(&pvt, ast)?;
            state.endpoint(pvt.role.opposite()).cloned()
        };
        let Some(other) = other else {
            warn!("Could not update other side of '{}', other side went away.", ast.name());
            return Err(LocalChannelError::no_longer_valid(format!(
                "other side of '{}' went away",
                ast.name()
            )));
        };
        ChannelGuard::unlocked(guard, || other.lock().set_variable(name, value));
        Ok(())
    }

    fn bridged_channel(&self, chan: &ChannelRef, bridge: &ChannelRef) -> Option<ChannelRef> {
        let Some(pvt) = LocalPvt::of(bridge) else {
            debug!(
                "Asked for bridged channel on '{}'/'{}', returning <none>",
                chan.name(),
                bridge.name()
            );
            return None;
        };
        let state = pvt.pair.lock();
        if !state.flags.contains(PairFlags::BRIDGE) {
            return Some(bridge.clone());
        }
        match state.endpoint(pvt.role.opposite()) {
            Some(other) => Some(other.bridge_peer().unwrap_or_else(|| other.clone())),
            None => Some(bridge.clone()),
        }
    }
}
