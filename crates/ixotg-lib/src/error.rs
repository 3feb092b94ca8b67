use crate::remote::Href;
use std::time::Duration;
use thiserror::Error;

/// Malformed or contradictory configuration. Aborts the call that found it.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{flow} Flow.tx_rx property cannot be None")]
    MissingTxRx { flow: String },
    #[error("{flow} Flow.tx_rx.device has no tx_device_names")]
    NoTxDevice { flow: String },
    #[error("{flow} Flow.rate.unit {unit:?} is not supported")]
    UnknownRateUnit { flow: String, unit: String },
    #[error("{0} is not the name of a configured port or device")]
    UnknownName(String),
    #[error("{layer1} Layer1.speed {speed:?} is not supported")]
    UnknownSpeed { layer1: String, speed: String },
    #[error("the name {0} is used more than once")]
    DuplicateName(String),
    #[error("cannot parse the configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A failure reported by (or about) the remote controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("{0} does not exist")]
    NotFound(Href),
    #[error("no protocol template has the stack type id {0}")]
    UnknownTemplate(String),
    #[error("{stack} has no field {field}")]
    MissingField { stack: Href, field: String },
    #[error("the {0} statistics view is not available")]
    ViewUnavailable(String),
    #[error("protocols are not up: {not_started} sessions not started, {down} sessions down")]
    ProtocolsNotUp { not_started: u64, down: u64 },
    #[error("capture on {port} was not ready after {waited:?}")]
    CaptureTimeout { port: String, waited: Duration },
    #[error("{0}")]
    Rejected(String),
}

/// Errors returned by the public api.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Every non-fatal remote failure of one call, in the order they happened
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Aggregate(Vec<RemoteError>),
}
