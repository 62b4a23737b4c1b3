use geofix_logic::{CoordinatorStatus, Failure, FailureCode, Fix, Outcome, PositionOptions};
use interprocess::local_socket::{GenericNamespaced, Name, ToNsName};
use serde::{Deserialize, Serialize};

mod simulated;

pub use simulated::{ProviderBehavior, SimulatedProvider, SimulatedSettings};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

pub fn get_socket_name(base_name: String) -> Result<Name<'static>> {
    base_name
        .to_ns_name::<GenericNamespaced>()
        .context("Failed to parse socket name")
}

/// Command line spelling of a [FailureCode] a provider may report. Timeouts are left out, only
/// the coordinator raises those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailureCodeValue {
    ProviderUnavailable,
    PermissionDenied,
    PositionUnknown,
    NetworkError,
}

impl From<FailureCodeValue> for FailureCode {
    fn from(value: FailureCodeValue) -> Self {
        match value {
            FailureCodeValue::ProviderUnavailable => FailureCode::ProviderUnavailable,
            FailureCodeValue::PermissionDenied => FailureCode::PermissionDenied,
            FailureCodeValue::PositionUnknown => FailureCode::PositionUnknown,
            FailureCodeValue::NetworkError => FailureCode::NetworkError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingRequest {
    /// Ask the coordinator for a position
    Fetch(PositionOptions),
    /// Change how the simulated provider answers future sessions
    SetBehavior(ProviderBehavior),
    Stop,
    ClearCache,
    Status,
}

impl From<PositionOptions> for TestingRequest {
    fn from(val: PositionOptions) -> Self {
        TestingRequest::Fetch(val)
    }
}

impl From<ProviderBehavior> for TestingRequest {
    fn from(val: ProviderBehavior) -> Self {
        TestingRequest::SetBehavior(val)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TestingResponse {
    Position(Fix),
    Failure(Failure),
    Status(CoordinatorStatus),
    Complete,
    Error(String),
}

impl From<Outcome> for TestingResponse {
    fn from(val: Outcome) -> Self {
        match val {
            Ok(fix) => TestingResponse::Position(fix),
            Err(failure) => TestingResponse::Failure(failure),
        }
    }
}

impl From<CoordinatorStatus> for TestingResponse {
    fn from(val: CoordinatorStatus) -> Self {
        TestingResponse::Status(val)
    }
}

impl From<anyhow::Error> for TestingResponse {
    fn from(value: anyhow::Error) -> Self {
        TestingResponse::Error(value.to_string())
    }
}

/// Encode a message as a single line of JSON, the framing both binaries speak
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(msg).context("Failed to encode message")?;
    encoded.push(b'\n');
    Ok(encoded)
}

pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end()).context("Failed to decode message")
}
