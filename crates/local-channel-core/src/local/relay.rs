//! Frame relay between the two endpoints of a pair

use tracing::trace;

use super::pair::{EndpointRole, LocalPair, PairGuard};
use crate::channel::{ChannelGuard, ChannelInner};
use crate::error::{LocalChannelError, Result};
use crate::frame::Frame;

/// Queue `frame` on the endpoint opposite `from`. Called with the pair
/// locked; `us` is the sending endpoint's lock if the caller holds it.
///
/// The pair lock and `us` are released while the frame is delivered and
/// retaken, `us` first, before returning. `prepare` runs under the target's
/// lock just before the frame is queued.
///
/// Returns [`LocalChannelError::PairGone`] if both endpoints hung up during
/// delivery. The pair may be destroyed by then and must not be touched.
pub(crate) fn queue_frame<F>(
    pair: &LocalPair,
    state: &mut PairGuard,
    from: EndpointRole,
    frame: Frame,
    us: Option<&mut ChannelGuard>,
    prepare: F,
) -> Result<()>
where
    F: FnOnce(&mut ChannelInner),
{
    let Some(other) = state.endpoint(from.opposite()).cloned() else {
        return Ok(());
    };

    // Two generators would feed each other
    if let Some(this) = state.endpoint(from) {
        if this.has_generator() && other.has_generator() {
            return Ok(());
        }
    }

    trace!("Relaying {:?} to '{}'", frame, other.name());
    state.relays_in_flight += 1;
    let deliver = move || other.queue_frame_with(frame, prepare);
    match us {
        Some(us) => PairGuard::unlocked(state, || ChannelGuard::unlocked(us, deliver)),
        None => PairGuard::unlocked(state, deliver),
    }
    state.relays_in_flight -= 1;

    if state.cancel_pending {
        if state.relays_in_flight == 0 {
            pair.destroy(state);
        }
        return Err(LocalChannelError::PairGone);
    }
    Ok(())
}
