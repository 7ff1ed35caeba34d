//! # Local Channel Core
//!
//! The local proxy channel: a synthetic pair of channels that lets the
//! dialplan call back into itself as though dialing a real device.
//!
//! Requesting `Local/200@default` creates a [`local::LocalPair`] with two
//! endpoints. The owner (`;1`) is handed to the requester, while the dialplan
//! runs at `200@default` on the outbound endpoint (`;2`). Frames written on
//! either side are queued on the other. When the outbound endpoint ends up
//! bridged to a real channel the pair masquerades itself out of the path.
//!
//! ## Features
//!
//! - **Dial strings**: `exten[/options][@context]` with the `n`, `j`, `b`
//!   and `m` options
//! - **Deadlock-free locking** of both endpoints and the pair, with a named
//!   retry backoff
//! - **Frame relay** preserving per-direction order
//! - **Bridge collapse** performed at most once per pair
//! - **Glare handling** between hangup and an in-flight relay
//! - **Device state**, channel listing and optimize-away administration
//!
//! ## Architecture
//!
//! - `channel`: the generic channel layer the driver plugs into
//! - `local`: the pair, its locking protocol, relay, optimizer and
//!   technology callbacks
//! - `driver`: the loaded driver tying it together
//! - `config`, `error`, `events`, `logging`: ambient support
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use local_channel_core::prelude::*;
//!
//! let dialplan = Arc::new(StaticDialplan::new().with_extension("default", "200"));
//! let driver = LocalChannelDriver::new(LocalChannelConfig::default(), dialplan.clone()).unwrap();
//!
//! let owner = driver.request("200@default", FormatCapabilities::all(), None).unwrap();
//! owner.call("200@default", None).unwrap();
//! assert_eq!(dialplan.started().len(), 1);
//!
//! owner.hangup().unwrap();
//! ```

pub mod channel;
pub mod config;
pub mod dialplan;
pub mod driver;
pub mod error;
pub mod events;
pub mod format;
pub mod frame;
pub mod local;
pub mod logging;
pub mod module;

pub use config::{JitterBufferConfig, LocalChannelConfig, LockingConfig};
pub use driver::{LocalChannelDriver, LocalChannelInfo};
pub use error::{LocalChannelError, Result};
pub use events::{EventEmitter, LocalChannelEvent};

/// Commonly used types
pub mod prelude {
    pub use crate::channel::{
        Channel, ChannelDirectory, ChannelGuard, ChannelRef, ChannelSpec, ChannelState, ChannelTech, PartyCaller,
        PartyConnectedLine, PartyId, SoftHangupCause,
    };
    pub use crate::config::LocalChannelConfig;
    pub use crate::dialplan::{Dialplan, StaticDialplan};
    pub use crate::driver::{LocalChannelDriver, LocalChannelInfo};
    pub use crate::error::{LocalChannelError, Result};
    pub use crate::events::LocalChannelEvent;
    pub use crate::format::{Format, FormatCapabilities};
    pub use crate::frame::{ControlType, Frame};
    pub use crate::local::{DeviceState, DialString, EndpointRole, LocalPair, PairFlags};
}
