use crate::remote::TrafficAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// A transmit transition of some flows. No flow name selects every flow.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TransmitState {
    #[serde(default)]
    pub flow_names: Vec<String>,
    pub state: TrafficAction,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureAction {
    Start,
    Stop,
}

/// A capture transition of some ports
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureState {
    #[serde(default)]
    pub port_names: Vec<String>,
    pub state: CaptureAction,
}

/// Flow results to read. Empty lists select every flow and every column.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FlowRequest {
    #[serde(default)]
    pub flow_names: Vec<String>,
    #[serde(default)]
    pub column_names: Vec<String>,
}

/// Port results to read. Empty lists select every port and every column.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PortRequest {
    #[serde(default)]
    pub port_names: Vec<String>,
    #[serde(default)]
    pub column_names: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub port_name: String,
}

/// A value of a result row
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ResultValue {
    Text(String),
    Count(u64),
    Rate(f64),
}

impl Display for ResultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultValue::Text(s) => write!(f, "{s}"),
            ResultValue::Count(c) => write!(f, "{c}"),
            ResultValue::Rate(r) => write!(f, "{r}"),
        }
    }
}

impl From<&str> for ResultValue {
    fn from(s: &str) -> Self {
        ResultValue::Text(s.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(s: String) -> Self {
        ResultValue::Text(s)
    }
}

/// Column name to value
pub type ResultRow = BTreeMap<String, ResultValue>;
