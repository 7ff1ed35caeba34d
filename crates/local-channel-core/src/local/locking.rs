//! Lock acquisition for operations that touch both endpoints and the pair
//!
//! Order is always endpoint(s) first, pair last. With two endpoints the
//! outbound one is locked outright and the owner is only try-locked; on
//! failure everything is released and the attempt restarts after a short
//! backoff. Because a masquerade may repoint either slot while nothing is
//! held, the snapshot is re-verified once the pair lock is taken.

use std::sync::Arc;
use std::thread;

use tracing::trace;

use super::pair::{LocalPair, PairGuard};
use crate::channel::{ChannelGuard, ChannelRef};
use crate::config::LockingConfig;
use crate::error::{LocalChannelError, Result};

/// Backoff between lock attempts, optionally bounded
#[derive(Debug)]
pub struct RetryBackoff {
    config: LockingConfig,
    attempts: u32,
}

impl RetryBackoff {
    pub fn new(config: LockingConfig) -> Self {
        Self { config, attempts: 0 }
    }

    /// Record a failed attempt and sleep before the next one
    pub fn wait(&mut self) -> Result<()> {
        self.attempts = self.attempts.saturating_add(1);
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return Err(LocalChannelError::LockContention { attempts: self.attempts });
            }
        }
        thread::sleep(self.config.backoff());
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// An endpoint together with its held lock
pub struct LockedEndpoint {
    pub chan: ChannelRef,
    pub guard: ChannelGuard,
}

/// Everything held after [`lock_pair_and_endpoints`]
pub struct PairLocks {
    pub pair: PairGuard,
    pub owner: Option<LockedEndpoint>,
    pub chan: Option<LockedEndpoint>,
}

fn same(a: &Option<ChannelRef>, b: &Option<ChannelRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Lock whichever endpoints the pair currently references, then the pair.
///
/// None of the pair's endpoints may be locked by the calling thread.
pub fn lock_pair_and_endpoints(pair: &Arc<LocalPair>) -> Result<PairLocks> {
    let mut backoff = RetryBackoff::new(*pair.locking());
    loop {
        let (owner, chan) = {
            let state = pair.lock();
            (state.owner.clone(), state.chan.clone())
        };

        let (owner_guard, chan_guard) = match (&owner, &chan) {
            (None, None) => (None, None),
            (Some(owner), None) => (Some(owner.lock()), None),
            (None, Some(chan)) => (None, Some(chan.lock())),
            (Some(owner), Some(chan)) => {
                let chan_guard = chan.lock();
                match owner.try_lock() {
                    Some(owner_guard) => (Some(owner_guard), Some(chan_guard)),
                    None => {
                        drop(chan_guard);
                        trace!("Owner of {} busy, backing off", pair.name());
                        backoff.wait()?;
                        continue;
                    }
                }
            }
        };

        let state = pair.lock();
        if same(&state.owner, &owner) && same(&state.chan, &chan) {
            return Ok(PairLocks {
                pair: state,
                owner: owner.zip(owner_guard).map(|(chan, guard)| LockedEndpoint { chan, guard }),
                chan: chan.zip(chan_guard).map(|(chan, guard)| LockedEndpoint { chan, guard }),
            });
        }

        drop(state);
        drop(owner_guard);
        drop(chan_guard);
        trace!("Endpoints of {} changed while locking, retrying", pair.name());
        backoff.wait()?;
    }
}
