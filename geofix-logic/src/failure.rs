use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
/// Why a location request could not produce a [crate::Fix]
pub enum FailureCode {
    /// The location service can't be started (disabled, missing hardware, or torn down)
    ProviderUnavailable = 1,
    /// The caller isn't authorized to read the location
    PermissionDenied = 2,
    /// The provider ran but couldn't work out a position
    PositionUnknown = 3,
    /// The coordinator gave up waiting, never reported by a provider
    TimedOut = 4,
    /// Transient failure reported by the provider
    NetworkError = 5,
}

/// `PositionError.PERMISSION_DENIED` from the W3C geolocation API
pub const POSITION_ERROR_PERMISSION_DENIED: u16 = 1;
/// `PositionError.POSITION_UNAVAILABLE`
pub const POSITION_ERROR_POSITION_UNAVAILABLE: u16 = 2;
/// `PositionError.TIMEOUT`
pub const POSITION_ERROR_TIMEOUT: u16 = 3;

impl FailureCode {
    pub const ALL_CODES: [Self; 5] = [
        Self::ProviderUnavailable,
        Self::PermissionDenied,
        Self::PositionUnknown,
        Self::TimedOut,
        Self::NetworkError,
    ];

    /// The integer identifier for this code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Collapse into the three codes a web `PositionError` can carry
    pub fn position_error_code(self) -> u16 {
        match self {
            Self::PermissionDenied => POSITION_ERROR_PERMISSION_DENIED,
            Self::TimedOut => POSITION_ERROR_TIMEOUT,
            Self::ProviderUnavailable | Self::PositionUnknown | Self::NetworkError => {
                POSITION_ERROR_POSITION_UNAVAILABLE
            }
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "Location service unavailable",
            Self::PermissionDenied => "Permission denied",
            Self::PositionUnknown => "Position unavailable",
            Self::TimedOut => "Timeout expired",
            Self::NetworkError => "Network error while locating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("integer {0} is not a known failure code")]
pub struct UnknownFailureCode(pub i32);

impl TryFrom<i32> for FailureCode {
    type Error = UnknownFailureCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL_CODES
            .into_iter()
            .find(|code| code.as_i32() == value)
            .ok_or(UnknownFailureCode(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{} (code {})", .code.message(), .code.as_i32())]
/// A single unsuccessful outcome of a location request
pub struct Failure {
    pub code: FailureCode,
}

impl Failure {
    pub fn new(code: FailureCode) -> Self {
        Self { code }
    }

    pub fn timed_out() -> Self {
        Self::new(FailureCode::TimedOut)
    }

    pub fn provider_unavailable() -> Self {
        Self::new(FailureCode::ProviderUnavailable)
    }
}

impl From<FailureCode> for Failure {
    fn from(code: FailureCode) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trips_through_integer() {
        for code in FailureCode::ALL_CODES {
            assert_eq!(FailureCode::try_from(code.as_i32()), Ok(code));
        }
    }

    #[test]
    fn test_unknown_integer_rejected() {
        assert_eq!(FailureCode::try_from(0), Err(UnknownFailureCode(0)));
        assert_eq!(FailureCode::try_from(42), Err(UnknownFailureCode(42)));
    }

    #[test]
    fn test_position_error_mapping() {
        assert_eq!(FailureCode::PermissionDenied.position_error_code(), 1);
        assert_eq!(FailureCode::TimedOut.position_error_code(), 3);
        assert_eq!(FailureCode::PositionUnknown.position_error_code(), 2);
        assert_eq!(FailureCode::NetworkError.position_error_code(), 2);
        assert_eq!(FailureCode::ProviderUnavailable.position_error_code(), 2);
    }

    #[test]
    fn test_display() {
        let failure = Failure::timed_out();
        assert_eq!(failure.to_string(), "Timeout expired (code 4)");
    }
}
