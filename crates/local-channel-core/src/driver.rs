//! The loaded `Local` channel driver

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::channel::{ChannelDirectory, ChannelRef, ChannelState, ChannelTech, SoftHangupCause};
use crate::config::LocalChannelConfig;
use crate::dialplan::Dialplan;
use crate::error::{LocalChannelError, Result};
use crate::events::{EventEmitter, LocalChannelEvent};
use crate::format::FormatCapabilities;
use crate::local::{self, DeviceState, DialString, LocalPair, LocalPvt, LocalRegistry, LocalTech, PairFlags, PairId};
use crate::module::ModuleUsage;

/// Module name used for usage accounting
pub const MODULE_NAME: &str = "chan_local";

/// Summary of one live pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalChannelInfo {
    pub pair: PairId,
    pub name: String,
    pub owner: Option<String>,
    pub exten: String,
    pub context: String,
    pub launched_pbx: bool,
    pub optimized: bool,
    pub no_optimization: bool,
}

impl LocalChannelInfo {
    /// One line of `local show channels`
    pub fn cli_line(&self) -> String {
        format!(
            "{} -- {}@{}",
            self.owner.as_deref().unwrap_or("<unowned>"),
            self.exten,
            self.context
        )
    }
}

/// Local proxy channel driver
pub struct LocalChannelDriver {
    config: LocalChannelConfig,
    registry: Arc<LocalRegistry>,
    directory: Arc<ChannelDirectory>,
    dialplan: Arc<dyn Dialplan>,
    module: Arc<ModuleUsage>,
    tech: Arc<LocalTech>,
    events: EventEmitter,
}

impl LocalChannelDriver {
    /// Create a driver with its own channel directory
    pub fn new(config: LocalChannelConfig, dialplan: Arc<dyn Dialplan>) -> Result<Self> {
        let directory = ChannelDirectory::new(config.max_channels);
        Self::with_directory(config, dialplan, directory)
    }

    /// Create a driver allocating into an existing channel directory
    pub fn with_directory(
        config: LocalChannelConfig,
        dialplan: Arc<dyn Dialplan>,
        directory: Arc<ChannelDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventEmitter::new(config.event_capacity);
        let tech = Arc::new(LocalTech::new(Arc::clone(&dialplan)));
        info!("Local proxy channel driver loaded (default context '{}')", config.default_context);
        Ok(Self {
            config,
            registry: LocalRegistry::new(),
            directory,
            dialplan,
            module: ModuleUsage::new(MODULE_NAME),
            tech,
            events,
        })
    }

    /// Request a new local channel for `data` (`exten[/options][@context]`).
    /// Returns the owner endpoint.
    pub fn request(&self, data: &str, caps: FormatCapabilities, requestor_linkedid: Option<&str>) -> Result<ChannelRef> {
        let dial = DialString::parse(data, &self.config.default_context)?;
        let pair = LocalPair::create(&dial, caps, &self.config, &self.registry, self.events.clone())?;
        let tech: Arc<dyn ChannelTech> = self.tech.clone();
        let owner = pair.spawn_endpoints(
            ChannelState::Down,
            requestor_linkedid.map(str::to_string),
            &self.directory,
            tech,
            &self.module,
        )?;
        debug!("Requested '{}'", owner.name());
        Ok(owner)
    }

    /// Device state for `exten@context[/options]`
    pub fn device_state(&self, data: &str) -> DeviceState {
        local::device_state(data, self.dialplan.as_ref(), &self.registry)
    }

    /// Every live pair, oldest first
    pub fn channels(&self) -> Vec<LocalChannelInfo> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|pair| {
                let state = pair.lock();
                LocalChannelInfo {
                    pair: pair.id(),
                    name: pair.name().to_string(),
                    owner: state.owner.as_ref().map(|o| o.name().to_string()),
                    exten: pair.exten().to_string(),
                    context: pair.context().to_string(),
                    launched_pbx: state.flags.contains(PairFlags::LAUNCHED_PBX),
                    optimized: state.flags.contains(PairFlags::ALREADY_MASQUED),
                    no_optimization: state.flags.contains(PairFlags::NO_OPTIMIZATION),
                }
            })
            .collect()
    }

    /// Output of `local show channels`
    pub fn show_channels(&self) -> Vec<String> {
        let channels = self.channels();
        if channels.is_empty() {
            return vec!["No local channels in use".to_string()];
        }
        channels.iter().map(LocalChannelInfo::cli_line).collect()
    }

    /// Allow the pair behind `channel_name` to optimize itself away even if
    /// it was requested with `/n`
    pub fn optimize_away(&self, channel_name: &str) -> Result<()> {
        if channel_name.is_empty() {
            return Err(LocalChannelError::not_found("'Channel' not specified."));
        }
        let chan = self
            .directory
            .get_by_name(channel_name)
            .ok_or_else(|| LocalChannelError::not_found(format!("Channel '{}' does not exist.", channel_name)))?;
        let pair = LocalPvt::of(&chan)
            .and_then(|pvt| self.registry.get(&pvt.pair.id()))
            .ok_or_else(|| LocalChannelError::not_found(format!("Unable to find local channel '{}'", channel_name)))?;

        pair.lock().flags.remove(PairFlags::NO_OPTIMIZATION);
        info!("Queued channel '{}' to be optimized away", channel_name);
        Ok(())
    }

    /// Soft-hangup every owner endpoint, returning how many were signalled
    pub fn unload(&self) -> usize {
        let mut count = 0;
        for pair in self.registry.snapshot() {
            let owner = pair.lock().owner.clone();
            if let Some(owner) = owner {
                owner.soft_hangup(SoftHangupCause::AppUnload);
                count += 1;
            }
        }
        info!(
            "Local proxy channel driver unloading, {} owner(s) signalled, {} module user(s) remain",
            count,
            self.module.users()
        );
        count
    }

    /// The pair `chan` belongs to, if it is a live local endpoint
    pub fn pair_of(&self, chan: &ChannelRef) -> Option<Arc<LocalPair>> {
        LocalPvt::of(chan).map(|pvt| Arc::clone(&pvt.pair))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalChannelEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &LocalChannelConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    pub fn module_usage(&self) -> &Arc<ModuleUsage> {
        &self.module
    }

    pub fn tech(&self) -> &Arc<LocalTech> {
        &self.tech
    }
}
