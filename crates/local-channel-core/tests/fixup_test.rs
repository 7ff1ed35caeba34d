//! Endpoint replacement after a masquerade

mod common;

use std::sync::Arc;

use common::{drain_seqnos, voice, Harness};
use local_channel_core::channel;
use local_channel_core::local::LocalPvt;
use local_channel_core::prelude::*;
use pretty_assertions::assert_eq;

fn local_channel(harness: &Harness, name: &str) -> ChannelRef {
    let tech: Arc<dyn ChannelTech> = harness.driver.tech().clone();
    harness.driver.directory().alloc(ChannelSpec::new(name).with_tech(tech)).unwrap()
}

#[test]
fn test_fixup_repoints_slot() {
    let harness = Harness::new();
    let e = harness.dial("100@default/n");
    let replacement = local_channel(&harness, "Local/replacement");

    channel::fixup(&e.owner, &replacement).unwrap();

    let state = e.pair.lock();
    assert!(Arc::ptr_eq(state.owner.as_ref().unwrap(), &replacement));
    drop(state);
    assert!(LocalPvt::of(&e.owner).is_none());
    assert_eq!(LocalPvt::of(&replacement).unwrap().role, EndpointRole::Owner);

    e.chan.write(voice(1)).unwrap();
    assert_eq!(drain_seqnos(&replacement), vec![1]);
    replacement.write(voice(2)).unwrap();
    assert_eq!(drain_seqnos(&e.chan), vec![2]);

    // The displaced channel no longer speaks for the pair
    assert!(e.owner.write(voice(3)).unwrap_err().is_hangup_race());
    e.owner.hangup().unwrap();
    assert!(!e.pair.is_destroyed());

    replacement.hangup().unwrap();
    e.chan.hangup().unwrap();
    assert!(e.pair.is_destroyed());
    assert_eq!(harness.driver.module_usage().users(), 0);
}

#[test]
fn test_fixup_rejects_self_bridge() {
    let harness = Harness::new();
    let e = harness.dial("100@default");
    let replacement = local_channel(&harness, "Local/replacement");
    Channel::bridge(&replacement, &e.chan);

    let err = channel::fixup(&e.owner, &replacement).unwrap_err();
    assert_eq!(err, LocalChannelError::SelfBridge);

    assert!(replacement.lock().check_hangup());
    let state = e.pair.lock();
    assert!(Arc::ptr_eq(state.owner.as_ref().unwrap(), &e.owner));
    drop(state);
    assert!(LocalPvt::of(&replacement).is_none());
    let pvt = LocalPvt::of(&e.owner).unwrap();
    assert!(Arc::ptr_eq(&pvt.pair, &e.pair));

    // The pair still works through the original owner
    e.owner.send_text("still here").unwrap();
    assert_eq!(e.chan.try_read(), Some(Frame::Text("still here".into())));
}

#[test]
fn test_fixup_of_hung_up_replacement_is_allowed() {
    let harness = Harness::new();
    let e = harness.dial("100@default");
    let replacement = local_channel(&harness, "Local/replacement");
    Channel::bridge(&replacement, &e.chan);
    replacement.soft_hangup(SoftHangupCause::Explicit);

    channel::fixup(&e.owner, &replacement).unwrap();
    assert!(Arc::ptr_eq(e.pair.lock().owner.as_ref().unwrap(), &replacement));
}

#[test]
fn test_fixup_from_unrelated_channel() {
    let harness = Harness::new();
    let _e = harness.dial("100@default");
    let stranger = harness.device("SIP/stranger-0001");
    let replacement = local_channel(&harness, "Local/replacement");

    let err = channel::fixup(&stranger, &replacement).unwrap_err();
    assert!(err.is_hangup_race());
}
