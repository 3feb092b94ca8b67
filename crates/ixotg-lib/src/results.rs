//! Flow and port results, read from the remote objects and their statistics views

use crate::config::Config;
use crate::error::{Error, RemoteError};
use crate::flow::TxRx;
use crate::remote::*;
use crate::structs::{FlowRequest, PortRequest, ResultRow, ResultValue};
use std::collections::HashMap;

pub const TRAFFIC_ITEM_VIEW: &str = "Traffic Item Statistics";
pub const PORT_VIEW: &str = "Port Statistics";

/// Flow columns returned when the request names none
pub const FLOW_COLUMNS: &[&str] = &[
    "name",
    "state",
    "port_tx",
    "port_rx",
    "frames_tx",
    "frames_rx",
    "frames_tx_rate",
    "frames_rx_rate",
    "bytes_tx_rate",
    "bytes_rx_rate",
    "loss",
];

/// Port columns returned when the request names none
pub const PORT_COLUMNS: &[&str] = &[
    "name",
    "location",
    "link",
    "capture",
    "frames_tx",
    "frames_rx",
    "frames_tx_rate",
    "frames_rx_rate",
    "bytes_tx",
    "bytes_rx",
    "bytes_tx_rate",
    "bytes_rx_rate",
];

/// Result column, statistics column, whether it is a rate
const FLOW_STATISTICS: &[(&str, &str, bool)] = &[
    ("frames_tx", "Tx Frames", false),
    ("frames_rx", "Rx Frames", false),
    ("bytes_rx", "Rx Bytes", false),
    ("frames_tx_rate", "Tx Frame Rate", true),
    ("frames_rx_rate", "Rx Frame Rate", true),
    ("bytes_tx_rate", "Tx Rate (Bps)", true),
    ("bytes_rx_rate", "Rx Rate (Bps)", true),
    ("loss", "Loss %", true),
];

const PORT_STATISTICS: &[(&str, &str, bool)] = &[
    ("frames_tx", "Frames Tx.", false),
    ("frames_rx", "Valid Frames Rx.", false),
    ("frames_tx_rate", "Frames Tx. Rate", true),
    ("frames_rx_rate", "Valid Frames Rx. Rate", true),
    ("bytes_tx", "Bytes Tx.", false),
    ("bytes_rx", "Bytes Rx.", false),
    ("bytes_tx_rate", "Bytes Tx. Rate", true),
    ("bytes_rx_rate", "Bytes Rx. Rate", true),
];

const STARTED_STATES: &[&str] = &[
    "txStopWatchExpected",
    "locked",
    "started",
    "startedWaitingForStats",
    "startedWaitingForStreams",
    "stoppedWaitingForStats",
];

/// The transmit state of a traffic item, as "started" or "stopped"
pub fn normalize_state(state: &str) -> &'static str {
    if STARTED_STATES.contains(&state) {
        "started"
    } else {
        "stopped"
    }
}

/// A result row restricted to the requested columns
struct RowBuilder<'a> {
    requested: &'a [String],
    defaults: &'static [&'static str],
    row: ResultRow,
}

impl<'a> RowBuilder<'a> {
    fn new(requested: &'a [String], defaults: &'static [&'static str]) -> Self {
        RowBuilder {
            requested,
            defaults,
            row: ResultRow::new(),
        }
    }

    fn wanted(&self, column: &str) -> bool {
        if self.requested.is_empty() {
            self.defaults.contains(&column)
        } else {
            self.requested.iter().any(|c| c == column)
        }
    }

    fn set(&mut self, column: &str, value: impl Into<ResultValue>) {
        if self.wanted(column) {
            self.row.insert(column.to_string(), value.into());
        }
    }

    /// Counters and rates that cannot be parsed read as zero
    fn set_statistics(&mut self, columns: &[(&str, &str, bool)], stats: &StatRow) {
        for (column, caption, is_rate) in columns.iter() {
            let raw = stats.get(*caption).map(String::as_str).unwrap_or("");
            let value = if *is_rate {
                ResultValue::Rate(raw.trim().parse().unwrap_or(0.0))
            } else {
                ResultValue::Count(raw.trim().parse().unwrap_or(0))
            };
            self.set(column, value);
        }
    }

    /// A statistics failure is reported on the row, whatever the requested columns
    fn set_error(&mut self, e: &RemoteError) {
        self.row
            .insert("error".to_string(), ResultValue::Text(e.to_string()));
    }
}

/// Names of the ports a flow is sent from and to
fn flow_ports(config: Option<&Config>, name: &str) -> (String, String) {
    let Some(config) = config else {
        return (String::new(), String::new());
    };
    let device_ports = |names: &[String]| {
        names
            .iter()
            .filter_map(|n| config.get_device(n).map(|d| d.port_name.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    };
    match config.get_flow(name).and_then(|f| f.tx_rx.as_ref()) {
        Some(TxRx::Port(p)) => (
            p.tx_port_name.clone(),
            p.rx_port_name.clone().unwrap_or_default(),
        ),
        Some(TxRx::Device(d)) => (
            device_ports(&d.tx_device_names),
            device_ports(&d.rx_device_names),
        ),
        None => (String::new(), String::new()),
    }
}

/// Attach a statistics view to rows keyed by the value of `key` in the view
fn merge_statistics<'a>(
    store: &mut impl RemoteStore,
    view: &str,
    key: &'static str,
    columns: &[(&str, &str, bool)],
    rows: &mut [(String, RowBuilder<'a>)],
) {
    let names: Vec<&str> = rows.iter().map(|(name, _)| name.as_str()).collect();
    let filter = Filter::any_of(key, &names);
    match store.statistics(view, Some(&filter)) {
        Ok(stats) => {
            let stats: HashMap<&str, &StatRow> = stats
                .iter()
                .filter_map(|s| s.get(key).map(|name| (name.as_str(), s)))
                .collect();
            for (name, row) in rows.iter_mut() {
                if let Some(s) = stats.get(name.as_str()) {
                    row.set_statistics(columns, s);
                }
            }
        }
        Err(e) => {
            log::warn!("{e}");
            for (_, row) in rows.iter_mut() {
                row.set_error(&e);
            }
        }
    }
}

/// One row per selected traffic item
pub fn flow_results(
    store: &mut impl RemoteStore,
    config: Option<&Config>,
    request: &FlowRequest,
) -> Result<Vec<ResultRow>, Error> {
    let traffic = traffic_root(store)?;
    let selection = Filter::any_of("name", &request.flow_names);
    let mut rows = vec![];
    for item in store.find(&traffic, Kind::TrafficItem, &[selection])? {
        let attributes = store.read(&item)?;
        let name = attribute_str(&attributes, "name");
        let (port_tx, port_rx) = flow_ports(config, &name);
        let mut row = RowBuilder::new(&request.column_names, FLOW_COLUMNS);
        row.set("name", name.as_str());
        row.set("state", normalize_state(&attribute_str(&attributes, "state")));
        row.set("port_tx", port_tx);
        row.set("port_rx", port_rx);
        rows.push((name, row));
    }
    if !rows.is_empty() {
        merge_statistics(store, TRAFFIC_ITEM_VIEW, "Traffic Item", FLOW_STATISTICS, &mut rows);
    }
    Ok(rows.into_iter().map(|(_, r)| r.row).collect())
}

fn location(attributes: &Attributes) -> String {
    let location = attribute_str(attributes, "location");
    let state = attribute_str(attributes, "connectionState");
    if state.starts_with("connectedLink") {
        format!("{location};connected")
    } else if !location.is_empty() {
        format!("{location};{state}")
    } else {
        state
    }
}

/// One row per selected port
pub fn port_results(
    store: &mut impl RemoteStore,
    request: &PortRequest,
) -> Result<Vec<ResultRow>, Error> {
    let root = store.root();
    let selection = Filter::any_of("name", &request.port_names);
    let mut rows = vec![];
    for vport in store.find(&root, Kind::Vport, &[selection])? {
        let attributes = store.read(&vport)?;
        let name = attribute_str(&attributes, "name");
        let link = attribute_str(&attributes, "connectionState") == "connectedLinkUp";
        let capture = find_first(store, &vport, Kind::Capture)?;
        let running = store.read(&capture)?.get("isCaptureRunning") == Some(&serde_json::Value::Bool(true));
        let mut row = RowBuilder::new(&request.column_names, PORT_COLUMNS);
        row.set("name", name.as_str());
        row.set("location", location(&attributes));
        row.set("link", if link { "up" } else { "down" });
        row.set("capture", if running { "started" } else { "stopped" });
        rows.push((name, row));
    }
    if !rows.is_empty() {
        merge_statistics(store, PORT_VIEW, "Port Name", PORT_STATISTICS, &mut rows);
    }
    Ok(rows.into_iter().map(|(_, r)| r.row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::InMemoryStore;
    use serde_json::json;

    #[test]
    fn test_state_normalization() {
        for state in STARTED_STATES {
            assert_eq!(normalize_state(state), "started");
        }
        for state in ["stopped", "unapplied", "error", "paused", ""] {
            assert_eq!(normalize_state(state), "stopped");
        }
    }

    fn store_with_items(names: &[&str]) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        let traffic = traffic_root(&mut store).unwrap();
        for name in names {
            let mut attributes = Attributes::new();
            attributes.insert("name".to_string(), json!(name));
            store.create(&traffic, Kind::TrafficItem, attributes).unwrap();
        }
        store
    }

    fn stat_row(pairs: &[(&str, &str)]) -> StatRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_flow_columns() {
        let mut store = store_with_items(&["f1", "f2"]);
        store.set_statistics(
            TRAFFIC_ITEM_VIEW,
            vec![stat_row(&[
                ("Traffic Item", "f1"),
                ("Tx Frames", "100"),
                ("Rx Frames", "n/a"),
                ("Rx Bytes", "6400"),
                ("Loss %", "1.5"),
            ])],
        );
        let rows = flow_results(&mut store, None, &FlowRequest::default()).unwrap();
        assert_eq!(rows.len(), 2);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        let mut expected = FLOW_COLUMNS.to_vec();
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(rows[0]["state"], ResultValue::from("stopped"));
        assert_eq!(rows[0]["frames_tx"], ResultValue::Count(100));
        assert_eq!(rows[0]["frames_rx"], ResultValue::Count(0));
        assert_eq!(rows[0]["loss"], ResultValue::Rate(1.5));
        assert!(!rows[1].contains_key("frames_tx"));

        let request = FlowRequest {
            flow_names: vec!["f1".to_string()],
            column_names: vec!["name".to_string(), "bytes_rx".to_string()],
        };
        let rows = flow_results(&mut store, None, &request).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["bytes_rx"], ResultValue::Count(6400));
    }

    #[test]
    fn test_view_failure_marks_rows() {
        let mut store = store_with_items(&["f1"]);
        store.set_view_unavailable(TRAFFIC_ITEM_VIEW);
        let rows = flow_results(&mut store, None, &FlowRequest::default()).unwrap();
        assert!(matches!(&rows[0]["error"], ResultValue::Text(t) if t.contains(TRAFFIC_ITEM_VIEW)));
        assert_eq!(rows[0]["name"], ResultValue::from("f1"));
    }

    #[test]
    fn test_port_rows() {
        let mut store = InMemoryStore::new();
        let root = store.root();
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("p1"));
        attributes.insert("location".to_string(), json!("10.0.0.1;1;1"));
        store.create(&root, Kind::Vport, attributes).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("p2"));
        store.create(&root, Kind::Vport, attributes).unwrap();
        let rows = port_results(&mut store, &PortRequest::default()).unwrap();
        assert_eq!(rows[0]["location"], ResultValue::from("10.0.0.1;1;1;connected"));
        assert_eq!(rows[0]["link"], ResultValue::from("up"));
        assert_eq!(rows[1]["location"], ResultValue::from("unassigned"));
        assert_eq!(rows[1]["link"], ResultValue::from("down"));
        assert_eq!(rows[1]["capture"], ResultValue::from("stopped"));
        assert_eq!(rows[1]["frames_tx"], ResultValue::Count(0));
    }
}
