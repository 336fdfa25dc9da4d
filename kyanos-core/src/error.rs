use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Why an in-flight pairing exchange ended without a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The operator answered "no".
    Denied,
    /// The daemon aborted the exchange.
    Cancelled,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Denied => f.write_str("denied by operator"),
            RejectReason::Cancelled => f.write_str("cancelled by daemon"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bluetooth daemon unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("no bluetooth adapter found")]
    AdapterNotFound,

    #[error("pairing rejected: {0}")]
    PairingRejected(RejectReason),

    #[error("pairing timed out after {}s without an answer", .0.as_secs())]
    PairingTimedOut(Duration),

    #[error("{operation} failed for {address}: {message}")]
    OperationFailed {
        operation: String,
        address: String,
        message: String,
    },

    #[error("unsupported pairing interaction: {0}")]
    UnsupportedInteraction(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn operation_failed(
        operation: impl Into<String>,
        address: impl Into<String>,
        source: impl fmt::Display,
    ) -> Self {
        Error::OperationFailed {
            operation: operation.into(),
            address: address.into(),
            message: source.to_string(),
        }
    }

    /// Re-targets an operation failure at a device address, leaving other kinds untouched.
    pub fn at(self, target: &str) -> Self {
        match self {
            Error::OperationFailed {
                operation, message, ..
            } => Error::OperationFailed {
                operation,
                address: target.to_string(),
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_failed_names_verb_and_address() {
        let err = Error::operation_failed("connect", "AA:BB:CC:DD:EE:FF", "org.bluez.Error.Failed");
        assert_eq!(
            err.to_string(),
            "connect failed for AA:BB:CC:DD:EE:FF: org.bluez.Error.Failed"
        );
    }

    #[test]
    fn at_retargets_only_operation_failures() {
        let err = Error::operation_failed("pair", "/org/bluez/hci0/dev_AA", "boom").at("AA:BB");
        match err {
            Error::OperationFailed { operation, address, .. } => {
                assert_eq!(operation, "pair");
                assert_eq!(address, "AA:BB");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(Error::AdapterNotFound.at("AA:BB"), Error::AdapterNotFound));
    }

    #[test]
    fn timeout_is_distinct_from_rejection() {
        let timeout = Error::PairingTimedOut(Duration::from_secs(30));
        assert!(matches!(timeout, Error::PairingTimedOut(_)));
        assert_eq!(
            timeout.to_string(),
            "pairing timed out after 30s without an answer"
        );
        assert_eq!(
            Error::PairingRejected(RejectReason::Cancelled).to_string(),
            "pairing rejected: cancelled by daemon"
        );
    }
}
