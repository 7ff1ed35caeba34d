//! Collapsing a pair out of an established bridge

mod common;

use std::sync::Arc;

use common::{drain_seqnos, voice, Harness};
use local_channel_core::prelude::*;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

fn count_optimized(events: &mut broadcast::Receiver<LocalChannelEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, LocalChannelEvent::Optimized { .. }) {
            count += 1;
        }
    }
    count
}

fn bridged_to(a: &ChannelRef, b: &ChannelRef) -> bool {
    a.bridge_peer().is_some_and(|p| Arc::ptr_eq(&p, b))
}

#[test]
fn test_collapse_happens_exactly_once() {
    let harness = Harness::new();
    let mut events = harness.driver.subscribe();
    let e = harness.dial("200@default");
    let phone = harness.device("SIP/phone-0001");
    Channel::bridge(&e.chan, &phone);

    for seq in 0..20 {
        e.chan.write(voice(seq)).unwrap();
    }

    assert_eq!(count_optimized(&mut events), 1);
    assert!(e.pair.flags().contains(PairFlags::ALREADY_MASQUED));
    assert!(bridged_to(&phone, &e.owner));
    assert!(bridged_to(&e.owner, &phone));
    assert!(e.chan.bridge_peer().is_none());
    // Nothing crosses the pair once it is out of the path
    assert!(drain_seqnos(&e.owner).is_empty());

    let info = &harness.driver.channels()[0];
    assert!(info.optimized);
}

#[test]
fn test_no_optimization_option_keeps_pair_in_path() {
    let harness = Harness::new();
    let mut events = harness.driver.subscribe();
    let e = harness.dial("200@default/n");
    let phone = harness.device("SIP/phone-0001");
    Channel::bridge(&e.chan, &phone);

    for seq in 0..100 {
        e.chan.write(voice(seq)).unwrap();
    }

    assert_eq!(count_optimized(&mut events), 0);
    assert!(bridged_to(&phone, &e.chan));
    assert_eq!(drain_seqnos(&e.owner), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_unbridged_outbound_is_not_collapsed() {
    let harness = Harness::new();
    let e = harness.dial("200@default");
    for seq in 0..5 {
        e.chan.write(voice(seq)).unwrap();
    }
    assert!(!e.pair.flags().contains(PairFlags::ALREADY_MASQUED));
    assert_eq!(drain_seqnos(&e.owner), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_busy_owner_defers_collapse() {
    let harness = Harness::new();
    let e = harness.dial("200@default");
    let phone = harness.device("SIP/phone-0001");

    // Queue something on the owner before the bridge is set up
    e.chan.write(voice(1)).unwrap();
    Channel::bridge(&e.chan, &phone);

    e.chan.write(voice(2)).unwrap();
    assert!(!e.pair.flags().contains(PairFlags::ALREADY_MASQUED));
    assert_eq!(drain_seqnos(&e.owner), vec![1, 2]);

    e.chan.write(voice(3)).unwrap();
    assert!(e.pair.flags().contains(PairFlags::ALREADY_MASQUED));
    assert!(drain_seqnos(&e.owner).is_empty());
}

#[test]
fn test_signalling_never_triggers_collapse() {
    let harness = Harness::new();
    let e = harness.dial("200@default");
    let phone = harness.device("SIP/phone-0001");
    Channel::bridge(&e.chan, &phone);

    e.chan.send_text("ping").unwrap();
    e.chan.send_digit_begin('1').unwrap();
    assert!(!e.pair.flags().contains(PairFlags::ALREADY_MASQUED));
    assert_eq!(e.owner.readq_len(), 2);
}

#[test]
fn test_optimize_away_lifts_no_optimization() {
    let harness = Harness::new();
    let mut events = harness.driver.subscribe();
    let e = harness.dial("200@default/n");
    let phone = harness.device("SIP/phone-0001");
    Channel::bridge(&e.chan, &phone);

    e.chan.write(voice(1)).unwrap();
    assert_eq!(count_optimized(&mut events), 0);
    assert_eq!(drain_seqnos(&e.owner), vec![1]);

    harness.driver.optimize_away(e.chan.name()).unwrap();
    e.chan.write(voice(2)).unwrap();
    assert_eq!(count_optimized(&mut events), 1);
    assert!(bridged_to(&phone, &e.owner));
}

#[test]
fn test_hangup_after_collapse_leaves_peer_alone() {
    let harness = Harness::new();
    let e = harness.dial("200@default");
    let phone = harness.device("SIP/phone-0001");
    Channel::bridge(&e.chan, &phone);
    e.chan.write(voice(1)).unwrap();
    assert!(e.pair.flags().contains(PairFlags::ALREADY_MASQUED));

    e.chan.hangup().unwrap();
    assert!(bridged_to(&phone, &e.owner));
    assert_eq!(phone.readq_len(), 0);
    assert!(!phone.lock().check_hangup());
    assert_eq!(harness.driver.device_state("200@default"), DeviceState::InUse);

    e.owner.hangup().unwrap();
    assert!(e.pair.is_destroyed());
    assert!(phone.bridge_peer().is_none());
    assert_eq!(harness.driver.device_state("200@default"), DeviceState::NotInUse);
}
