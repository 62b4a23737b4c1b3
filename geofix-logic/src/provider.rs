use std::sync::Weak;

use serde::{Deserialize, Serialize};

use crate::{Failure, Fix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Identifies one provider start/stop cycle. Ids only ever increase within a coordinator.
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a [SessionHandle] sends its deliveries, implemented by the coordinator
pub(crate) trait SessionSink: Send + Sync {
    fn fix_delivered(&self, session: SessionId, fix: Fix) -> bool;
    fn failure_delivered(&self, session: SessionId, failure: Failure) -> bool;
}

/// Given to a [LocationProvider] when it's started, used to report back the outcome of that
/// particular session. Deliveries for a session that has already ended are ignored.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    sink: Weak<dyn SessionSink>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, sink: Weak<dyn SessionSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Report a new position. Returns whether the coordinator accepted it.
    pub fn deliver_fix(&self, fix: Fix) -> bool {
        self.sink
            .upgrade()
            .is_some_and(|sink| sink.fix_delivered(self.id, fix))
    }

    /// Report a failure. Returns whether the coordinator accepted it.
    pub fn deliver_failure(&self, failure: impl Into<Failure>) -> bool {
        let failure = failure.into();
        self.sink
            .upgrade()
            .is_some_and(|sink| sink.failure_delivered(self.id, failure))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// The platform's positioning service. The coordinator is the only thing that drives it.
///
/// `configure`, `start` and `stop` are called while the coordinator holds its state lock, so
/// implementations must not deliver through the [SessionHandle] from inside them. Deliveries
/// are expected from the provider's own thread or task. `stop` may be called from within a
/// delivery.
///
/// For the same reason `stop` must not wait for the delivery thread or task to finish. A
/// delivery blocked on the state lock would never return, so joining it deadlocks. Signal the
/// worker and return, late deliveries are rejected by session id.
pub trait LocationProvider: Send + Sync + 'static {
    /// Select the accuracy mode used by the next start
    fn configure(&self, high_accuracy: bool);
    /// Begin acquiring a position, reporting through `session`. An error here ends the session
    /// with that failure.
    fn start(&self, session: SessionHandle) -> Result<(), Failure>;
    /// Stop acquiring, any later deliveries for the old session are ignored anyway
    fn stop(&self);
}
