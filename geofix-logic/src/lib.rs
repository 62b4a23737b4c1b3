mod coordinator;
mod failure;
mod location;
mod provider;
mod settings;

pub use coordinator::{
    CoordinatorPhase, CoordinatorStats, CoordinatorStatus, LocationCoordinator, Outcome,
};
pub use failure::{
    Failure, FailureCode, POSITION_ERROR_PERMISSION_DENIED, POSITION_ERROR_POSITION_UNAVAILABLE,
    POSITION_ERROR_TIMEOUT, UnknownFailureCode,
};
pub use location::{Fix, LocationComponent, UtcDT};
pub use provider::{LocationProvider, SessionHandle, SessionId};
pub use settings::{PositionOptions, RequestConfig};
