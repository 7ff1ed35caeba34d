//! Collapsing a pair out of an established bridge
//!
//! When the outbound endpoint is bridged to a real channel, the owner can
//! take over that channel's identity and the pair drops out of the media
//! path. Every lock here is a try-lock: if anything is busy the attempt is
//! abandoned and retried on the next media write.

use std::sync::Arc;

use tracing::{debug, info};

use super::pair::{LocalPair, PairFlags, PairGuard};
use crate::channel::{self, ChannelInner, ChannelRef};
use crate::events::LocalChannelEvent;

fn can_optimize(state: &PairGuard) -> bool {
    !state.flags.contains(PairFlags::ALREADY_MASQUED)
        && !state.flags.contains(PairFlags::NO_OPTIMIZATION)
        && state.owner.is_some()
        && state.chan.is_some()
}

/// Attempt the collapse. Called on the outbound endpoint with that endpoint
/// and the pair locked. Returns true if the masquerade was performed.
pub(crate) fn check_bridge(pair: &LocalPair, state: &mut PairGuard, chan: &ChannelRef, chan_inner: &mut ChannelInner) -> bool {
    if !can_optimize(state) {
        return false;
    }

    // Only one hop: the direct peer must be what the peer's technology
    // reports as well
    let Some(peer) = chan.bridge_peer() else {
        return false;
    };
    let reported = PairGuard::unlocked(state, || chan.bridged_channel());
    if !reported.is_some_and(|r| Arc::ptr_eq(&r, &peer)) {
        return false;
    }
    if !can_optimize(state)
        || !state.chan.as_ref().is_some_and(|c| Arc::ptr_eq(c, chan))
        || !chan.bridge_peer().is_some_and(|p| Arc::ptr_eq(&p, &peer))
    {
        return false;
    }
    let Some(owner) = state.owner.clone() else {
        return false;
    };
    if Arc::ptr_eq(&owner, &peer) {
        return false;
    }

    let Some(mut peer_inner) = peer.try_lock() else {
        return false;
    };
    if peer_inner.check_hangup() {
        return false;
    }
    let Some(mut owner_inner) = owner.try_lock() else {
        return false;
    };
    if owner_inner.check_hangup() || owner_inner.has_pending_frames() {
        debug!("Not optimizing {}: owner busy", pair.name());
        return false;
    }

    // The masquerade swaps these back, so pre-swapping leaves them where
    // they belong afterwards
    if owner_inner.monitor.is_some() && peer_inner.monitor.is_none() {
        std::mem::swap(&mut owner_inner.monitor, &mut peer_inner.monitor);
    }
    if !chan_inner.audiohooks.is_empty() {
        std::mem::swap(&mut chan_inner.audiohooks, &mut owner_inner.audiohooks);
    }
    if owner_inner.caller.is_set() {
        std::mem::swap(&mut owner_inner.caller, &mut peer_inner.caller);
    }
    if owner_inner.redirecting.is_set() {
        std::mem::swap(&mut owner_inner.redirecting, &mut peer_inner.redirecting);
    }
    if owner_inner.dialed.is_set() {
        std::mem::swap(&mut owner_inner.dialed, &mut peer_inner.dialed);
    }
    owner_inner.groups = std::mem::take(&mut chan_inner.groups);

    channel::masquerade(&owner, &mut owner_inner, &peer, &mut peer_inner);
    state.flags.insert(PairFlags::ALREADY_MASQUED);

    info!("Optimized {} out of bridge: '{}' now bridged to '{}'", pair.name(), peer.name(), owner.name());
    pair.events().emit(LocalChannelEvent::Optimized {
        pair: pair.id(),
        owner: owner.name().to_string(),
        peer: peer.name().to_string(),
    });
    true
}
