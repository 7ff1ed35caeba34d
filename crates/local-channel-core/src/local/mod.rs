//! The local proxy channel
//!
//! A request for `Local/exten@context` produces two channels sharing one
//! [`LocalPair`]. The owner (`;1`) goes back to the requester; the outbound
//! endpoint (`;2`) runs the dialplan at `exten@context`. Whatever is written
//! to one endpoint is queued on the other.
//!
//! Once the outbound endpoint is bridged to a real channel the pair can
//! masquerade itself out of the call path (see [`optimizer`]). Dial option
//! `n` disables that.

pub mod device_state;
pub mod dial_string;
pub mod locking;
pub mod optimizer;
pub mod pair;
pub mod registry;
pub mod relay;
pub mod tech;

pub use device_state::{device_state, DeviceState};
pub use dial_string::{DialOptions, DialString};
pub use locking::{lock_pair_and_endpoints, LockedEndpoint, PairLocks, RetryBackoff};
pub use pair::{EndpointRole, LocalPair, LocalPvt, PairFlags, PairGuard, PairId, PairState};
pub use registry::{LocalRegistry, RegistryStats};
pub use tech::{LocalTech, LOCAL_TECH_NAME};
