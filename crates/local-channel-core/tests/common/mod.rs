//! Shared fixtures for the local channel integration tests

#![allow(dead_code)]

use std::sync::Arc;

use local_channel_core::local::LocalPair;
use local_channel_core::prelude::*;
use local_channel_core::LockingConfig;

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Driver configuration with a bounded lock backoff so a livelock fails the
/// test instead of hanging it
pub fn test_config() -> LocalChannelConfig {
    LocalChannelConfig {
        locking: LockingConfig {
            backoff_micros: 1,
            max_attempts: Some(1_000_000),
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub dialplan: Arc<StaticDialplan>,
    pub driver: LocalChannelDriver,
}

/// Both endpoints and the pair behind them
pub struct Endpoints {
    pub owner: ChannelRef,
    pub chan: ChannelRef,
    pub pair: Arc<LocalPair>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let dialplan = Arc::new(
            StaticDialplan::new()
                .with_extension("default", "100")
                .with_extension("default", "200")
                .with_extension("internal", "s"),
        );
        let driver = LocalChannelDriver::new(test_config(), dialplan.clone()).unwrap();
        Self { dialplan, driver }
    }

    /// Request a local channel without calling it
    pub fn request(&self, data: &str) -> Endpoints {
        let owner = self.driver.request(data, FormatCapabilities::all(), None).unwrap();
        let pair = self.driver.pair_of(&owner).unwrap();
        let chan = pair.lock().chan.clone().unwrap();
        Endpoints { owner, chan, pair }
    }

    /// Request a local channel and start its dialplan
    pub fn dial(&self, data: &str) -> Endpoints {
        let endpoints = self.request(data);
        endpoints.owner.call(data, None).unwrap();
        endpoints
    }

    /// A plain channel standing in for a real device
    pub fn device(&self, name: &str) -> ChannelRef {
        self.driver.directory().alloc(ChannelSpec::new(name).with_state(ChannelState::Up)).unwrap()
    }
}

pub fn voice(seqno: u32) -> Frame {
    Frame::voice(Format::Ulaw, seqno, vec![0x7fu8; 160])
}

/// Sequence numbers of the media frames queued on `chan`
pub fn drain_seqnos(chan: &ChannelRef) -> Vec<u32> {
    chan.drain_frames().iter().filter_map(Frame::seqno).collect()
}
