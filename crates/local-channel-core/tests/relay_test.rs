//! Frames and indications crossing a pair

mod common;

use bytes::Bytes;
use common::{drain_seqnos, voice, Harness};
use local_channel_core::channel::{ChannelOption, OptionValue, PartyRedirecting, QueryOption, T38State};
use local_channel_core::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn test_per_direction_order() {
    let harness = Harness::new();
    let e = harness.dial("100@default/n");

    for seq in 1..=3 {
        e.chan.write(voice(seq)).unwrap();
    }
    for seq in 10..=12 {
        e.owner.write(voice(seq)).unwrap();
    }

    assert_eq!(drain_seqnos(&e.owner), vec![1, 2, 3]);
    assert_eq!(drain_seqnos(&e.chan), vec![10, 11, 12]);
}

#[test]
fn test_reader_thread_sees_frames_in_order() {
    let harness = Harness::new();
    let e = harness.dial("100@default/n");

    let owner = e.owner.clone();
    let reader = std::thread::spawn(move || {
        let mut seen = Vec::new();
        while seen.len() < 50 {
            match owner.read_timeout(std::time::Duration::from_secs(5)) {
                Some(frame) => seen.extend(frame.seqno()),
                None => break,
            }
        }
        seen
    });
    for seq in 0..50 {
        e.chan.write(voice(seq)).unwrap();
    }
    assert_eq!(reader.join().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_answer_only_from_outbound() {
    let harness = Harness::new();
    let e = harness.dial("100@default");

    e.chan.answer().unwrap();
    assert_eq!(e.chan.lock().state, ChannelState::Up);
    assert_eq!(e.owner.try_read(), Some(Frame::control(ControlType::Answer)));

    assert!(matches!(e.owner.answer(), Err(LocalChannelError::NotOutbound(_))));
}

#[test]
fn test_ringing_updates_owner_state() {
    let harness = Harness::new();
    let e = harness.dial("100@default");
    e.chan.indicate(ControlType::Ringing, Bytes::new()).unwrap();
    assert_eq!(e.owner.lock().state, ChannelState::Ringing);
    assert!(e.owner.try_read().unwrap().is_control(ControlType::Ringing));
}

#[test]
fn test_connected_line_relays_accumulated_state() {
    let harness = Harness::new();
    let e = harness.dial("100@default");

    let name_only = PartyConnectedLine {
        id: PartyId::new(Some("Alice"), None),
        ..Default::default()
    };
    let number_only = PartyConnectedLine {
        id: PartyId::new(None, Some("2001")),
        ..Default::default()
    };
    e.chan.indicate(ControlType::ConnectedLine, name_only.encode().unwrap()).unwrap();
    e.chan.indicate(ControlType::ConnectedLine, number_only.encode().unwrap()).unwrap();

    let frames = e.owner.drain_frames();
    assert_eq!(frames.len(), 2);
    let Frame::Control { control, data } = &frames[1] else {
        panic!("expected a control frame, got {:?}", frames[1]);
    };
    assert_eq!(*control, ControlType::ConnectedLine);
    let relayed = PartyConnectedLine::decode(data).unwrap();
    assert_eq!(relayed.id, PartyId::new(Some("Alice"), Some("2001")));

    // The outbound side also updates the owner's caller
    assert_eq!(e.owner.lock().caller.id, PartyId::new(Some("Alice"), Some("2001")));
}

#[test]
fn test_redirecting_relays_accumulated_state() {
    let harness = Harness::new();
    let e = harness.dial("100@default");

    let first = PartyRedirecting {
        from: PartyId::new(None, Some("100")),
        count: 1,
        ..Default::default()
    };
    let second = PartyRedirecting {
        to: PartyId::new(None, Some("300")),
        ..Default::default()
    };
    e.owner.indicate(ControlType::Redirecting, first.encode().unwrap()).unwrap();
    e.owner.indicate(ControlType::Redirecting, second.encode().unwrap()).unwrap();

    let frames = e.chan.drain_frames();
    let Some(Frame::Control { data, .. }) = frames.last() else {
        panic!("no redirecting frame relayed");
    };
    let relayed = PartyRedirecting::decode(data).unwrap();
    assert_eq!(relayed.from.number.as_deref(), Some("100"));
    assert_eq!(relayed.to.number.as_deref(), Some("300"));
    assert_eq!(relayed.count, 1);
}

#[test]
fn test_hold_played_locally_unless_passthru() {
    let harness = Harness::new();

    let e = harness.dial("100@default");
    e.owner.indicate(ControlType::Hold, Bytes::from_static(b"jazz")).unwrap();
    assert_eq!(e.owner.lock().moh.as_deref(), Some("jazz"));
    assert_eq!(e.chan.readq_len(), 0);
    e.owner.indicate(ControlType::Unhold, Bytes::new()).unwrap();
    assert!(e.owner.lock().moh.is_none());

    let e = harness.dial("100@default/m");
    e.owner.indicate(ControlType::Hold, Bytes::new()).unwrap();
    assert!(e.owner.lock().moh.is_none());
    assert!(e.chan.try_read().unwrap().is_control(ControlType::Hold));
    e.owner.indicate(ControlType::Unhold, Bytes::new()).unwrap();
    assert!(e.chan.try_read().unwrap().is_control(ControlType::Unhold));
}

#[test]
fn test_digits_text_and_html() {
    let harness = Harness::new();
    let e = harness.dial("100@default");

    e.owner.send_digit_begin('5').unwrap();
    e.owner.send_digit_end('5', 120).unwrap();
    e.owner.send_text("hello").unwrap();
    e.owner.send_html(1, Bytes::from_static(b"<b>")).unwrap();

    assert_eq!(
        e.chan.drain_frames(),
        vec![
            Frame::DtmfBegin { digit: '5' },
            Frame::DtmfEnd {
                digit: '5',
                duration_ms: 120
            },
            Frame::Text("hello".into()),
            Frame::Html {
                subclass: 1,
                data: Bytes::from_static(b"<b>")
            },
        ]
    );
}

#[test]
fn test_generators_on_both_sides_stop_relay() {
    let harness = Harness::new();
    let e = harness.dial("100@default/n");
    e.owner.set_generator(true);
    e.chan.set_generator(true);
    e.chan.write(voice(1)).unwrap();
    assert_eq!(e.owner.readq_len(), 0);

    e.owner.set_generator(false);
    e.chan.write(voice(2)).unwrap();
    assert_eq!(drain_seqnos(&e.owner), vec![2]);
}

#[test]
fn test_t38_query_reaches_far_bridge() {
    let harness = Harness::new();
    let e = harness.dial("100@default");
    let phone = harness.device("SIP/phone-0001");

    assert!(e.chan.query_option(QueryOption::T38State).is_err());

    Channel::bridge(&phone, &e.owner);
    phone.lock().t38_state = T38State::Enabled;
    assert_eq!(
        e.chan.query_option(QueryOption::T38State).unwrap(),
        OptionValue::T38State(T38State::Enabled)
    );
}

#[test]
fn test_channel_write_option_targets_other_side() {
    let harness = Harness::new();
    let e = harness.dial("100@default");
    e.owner
        .set_option(ChannelOption::ChannelWrite {
            name: "CALLERID(name)".into(),
            value: "Carol".into(),
        })
        .unwrap();
    assert_eq!(e.chan.lock().variable("CALLERID(name)"), Some("Carol"));
    assert!(e.owner.lock().variable("CALLERID(name)").is_none());
}

#[test]
fn test_bridge_option_reports_far_side() {
    let harness = Harness::new();
    let phone = harness.device("SIP/phone-0001");
    let trunk = harness.device("SIP/trunk-0001");

    let plain = harness.dial("100@default");
    Channel::bridge(&phone, &plain.owner);
    Channel::bridge(&plain.chan, &trunk);
    assert!(std::sync::Arc::ptr_eq(&phone.bridged_channel().unwrap(), &plain.owner));

    let reporting = harness.dial("200@default/b");
    Channel::bridge(&phone, &reporting.owner);
    Channel::bridge(&reporting.chan, &trunk);
    assert!(std::sync::Arc::ptr_eq(&phone.bridged_channel().unwrap(), &trunk));

    // Nothing bridged on the far side: the far endpoint itself
    trunk.unbridge();
    assert!(std::sync::Arc::ptr_eq(&phone.bridged_channel().unwrap(), &reporting.chan));
}
