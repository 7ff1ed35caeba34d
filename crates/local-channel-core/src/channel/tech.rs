//! Channel technology interface
//!
//! Every operation is invoked with the channel locked; `guard` is that lock.
//! An implementation may release it temporarily with
//! `ChannelGuard::unlocked`, but must not return without it.

use std::time::Duration;

use bytes::Bytes;

use super::{ChannelGuard, ChannelRef, T38State};
use crate::error::{LocalChannelError, Result};
use crate::frame::{ControlType, Frame};

/// Options that can be queried through a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    T38State,
}

/// Result of a [`QueryOption`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    T38State(T38State),
}

/// Options that can be set through a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOption {
    /// Write a dialplan variable on whatever channel this one fronts
    ChannelWrite { name: String, value: String },
}

/// Technology callbacks for a channel type
pub trait ChannelTech: Send + Sync {
    /// Technology name, e.g. "Local"
    fn name(&self) -> &'static str;

    fn call(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _dest: &str, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    fn hangup(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard) -> Result<()> {
        Ok(())
    }

    fn answer(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard) -> Result<()> {
        Ok(())
    }

    fn write(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _frame: Frame) -> Result<()> {
        Ok(())
    }

    fn indicate(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _condition: ControlType, _data: Bytes) -> Result<()> {
        Ok(())
    }

    /// `new` replaced `old` in a masquerade; only `new` is locked
    fn fixup(&self, _old: &ChannelRef, _new: &ChannelRef, _new_guard: &mut ChannelGuard) -> Result<()> {
        Ok(())
    }

    fn send_digit_begin(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _digit: char) -> Result<()> {
        Ok(())
    }

    fn send_digit_end(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _digit: char, _duration_ms: u32) -> Result<()> {
        Ok(())
    }

    fn send_text(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _text: &str) -> Result<()> {
        Ok(())
    }

    fn send_html(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, _subclass: i32, _data: Bytes) -> Result<()> {
        Ok(())
    }

    fn query_option(&self, _chan: &ChannelRef, guard: &mut ChannelGuard, option: QueryOption) -> Result<OptionValue> {
        match option {
            QueryOption::T38State => Ok(OptionValue::T38State(guard.t38_state)),
        }
    }

    fn set_option(&self, _chan: &ChannelRef, _guard: &mut ChannelGuard, option: ChannelOption) -> Result<()> {
        Err(LocalChannelError::UnsupportedOption(format!("{:?}", option)))
    }

    /// The channel `chan` is really talking to when bridged to `bridge`
    fn bridged_channel(&self, _chan: &ChannelRef, bridge: &ChannelRef) -> Option<ChannelRef> {
        Some(bridge.clone())
    }
}
