//! Device state of `Local/exten@context` targets

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use super::registry::LocalRegistry;
use crate::dialplan::Dialplan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    /// No such extension, or no `@context` given
    Invalid,
    NotInUse,
    /// Some pair for this target has a live owner
    InUse,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Invalid => "INVALID",
            DeviceState::NotInUse => "NOT_INUSE",
            DeviceState::InUse => "INUSE",
        };
        f.write_str(s)
    }
}

/// State of `data` (`exten@context[/options]`)
pub fn device_state(data: &str, dialplan: &dyn Dialplan, registry: &LocalRegistry) -> DeviceState {
    let Some((exten, context)) = data.split_once('@') else {
        warn!("Someone used Local/{} somewhere without a @context. This is bad.", data);
        return DeviceState::Invalid;
    };
    let context = context.split_once('/').map_or(context, |(context, _)| context);

    debug!("Checking if extension {}@{} exists (devicestate)", exten, context);
    if !dialplan.exists_extension(context, exten, 1, None) {
        return DeviceState::Invalid;
    }

    let in_use = registry
        .snapshot()
        .iter()
        .filter(|pair| pair.exten() == exten && pair.context() == context)
        .any(|pair| pair.lock().owner.is_some());
    if in_use {
        DeviceState::InUse
    } else {
        DeviceState::NotInUse
    }
}
