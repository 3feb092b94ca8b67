//! The remote object store: the controller's object tree seen as plain data.
//!
//! Objects are addressed by their [`Href`] and carry a JSON attribute map. The
//! reconcilers never hold live objects; they find, read and write through a
//! [`RemoteStore`].

use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Controller simulator
pub mod memory;

/// Attributes of a remote object, keyed by their remote (camelCase) name
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A row of a statistics view, keyed by column caption
pub type StatRow = BTreeMap<String, String>;

/// The address of a remote object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Href(String);

impl Href {
    pub fn new(href: impl Into<String>) -> Self {
        Href(href.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The href of a child object
    pub fn child(&self, kind: Kind, id: u32) -> Href {
        Href(format!("{}/{}/{}", self.0, kind.segment(), id))
    }
}

impl Display for Href {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Href> for serde_json::Value {
    fn from(h: Href) -> serde_json::Value {
        serde_json::Value::String(h.0)
    }
}

/// The remote object types the reconcilers deal with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    Traffic,
    TrafficItem,
    EndpointSet,
    ConfigElement,
    Stack,
    Field,
    Tracking,
    FrameSize,
    FrameRate,
    TransmissionControl,
    Vport,
    L1Config,
    Fcoe,
    Protocols,
    Capture,
    Topology,
    DeviceGroup,
}

impl Kind {
    /// The path segment of that kind in an href
    pub fn segment(&self) -> &'static str {
        match self {
            Kind::Traffic => "traffic",
            Kind::TrafficItem => "trafficItem",
            Kind::EndpointSet => "endpointSet",
            Kind::ConfigElement => "configElement",
            Kind::Stack => "stack",
            Kind::Field => "field",
            Kind::Tracking => "tracking",
            Kind::FrameSize => "frameSize",
            Kind::FrameRate => "frameRate",
            Kind::TransmissionControl => "transmissionControl",
            Kind::Vport => "vport",
            Kind::L1Config => "l1Config",
            Kind::Fcoe => "fcoe",
            Kind::Protocols => "protocols",
            Kind::Capture => "capture",
            Kind::Topology => "topology",
            Kind::DeviceGroup => "deviceGroup",
        }
    }
}

/// A regex constraint on one attribute, as used by the controller's selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub attribute: &'static str,
    pub regex: String,
}

impl Filter {
    /// Matches the value exactly
    pub fn exact(attribute: &'static str, value: &str) -> Self {
        Filter {
            attribute,
            regex: format!("^{}$", regex::escape(value)),
        }
    }

    /// Matches any of the values exactly. An empty list matches everything.
    pub fn any_of<S: AsRef<str>>(attribute: &'static str, values: &[S]) -> Self {
        if values.is_empty() {
            return Filter {
                attribute,
                regex: ".*".to_string(),
            };
        }
        let alternatives: Vec<String> = values
            .iter()
            .map(|v| regex::escape(v.as_ref()))
            .collect();
        Filter {
            attribute,
            regex: format!("^({})$", alternatives.join("|")),
        }
    }
}

/// Blocking transmit transitions of traffic items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// The controller, as seen by the reconcilers.
///
/// Every call is a blocking round trip; long remote operations only return
/// once the controller has completed them.
pub trait RemoteStore {
    /// The href of the session root
    fn root(&self) -> Href;

    /// Children of `parent` of the given kind, in remote order, that match every filter
    fn find(&mut self, parent: &Href, kind: Kind, filters: &[Filter])
        -> Result<Vec<Href>, RemoteError>;

    fn read(&mut self, href: &Href) -> Result<Attributes, RemoteError>;

    fn create(
        &mut self,
        parent: &Href,
        kind: Kind,
        attributes: Attributes,
    ) -> Result<Href, RemoteError>;

    /// Overwrite the given attributes, leaving the others untouched
    fn update(&mut self, href: &Href, attributes: Attributes) -> Result<(), RemoteError>;

    /// Remove an object and everything below it
    fn remove(&mut self, href: &Href) -> Result<(), RemoteError>;

    /// Instantiate a protocol template as a new stack of `config_element`,
    /// right after `after` or first when `after` is `None`
    fn append_protocol(
        &mut self,
        config_element: &Href,
        after: Option<&Href>,
        template: &str,
    ) -> Result<Href, RemoteError>;

    /// Drop the whole session configuration
    fn new_config(&mut self) -> Result<(), RemoteError>;

    /// Compile traffic items into runnable streams
    fn generate(&mut self, traffic_items: &[Href]) -> Result<(), RemoteError>;

    /// Push the generated streams to the ports
    fn apply(&mut self) -> Result<(), RemoteError>;

    fn start_all_protocols(&mut self) -> Result<(), RemoteError>;

    fn clear_stats(&mut self) -> Result<(), RemoteError>;

    fn set_traffic_state(
        &mut self,
        traffic_items: &[Href],
        action: TrafficAction,
    ) -> Result<(), RemoteError>;

    /// Rows of a statistics view, keeping those whose column named by the filter
    /// attribute matches
    fn statistics(&mut self, view: &str, filter: Option<&Filter>)
        -> Result<Vec<StatRow>, RemoteError>;

    fn clear_capture_infos(&mut self, vports: &[Href]) -> Result<(), RemoteError>;

    /// Start capture on every port with capture enabled
    fn start_capture(&mut self) -> Result<(), RemoteError>;

    fn stop_capture(&mut self, vport: &Href) -> Result<(), RemoteError>;

    /// Whether the capture buffer of a stopped port can be read
    fn capture_ready(&mut self, vport: &Href) -> Result<bool, RemoteError>;

    /// The capture buffer of a port, as a pcap stream
    fn capture_file(&mut self, vport: &Href) -> Result<Vec<u8>, RemoteError>;
}

/// Write `attributes` only if at least one of them differs from the remote value.
/// Returns whether a write happened.
pub fn update_if_changed(
    store: &mut impl RemoteStore,
    href: &Href,
    attributes: Attributes,
) -> Result<bool, RemoteError> {
    if attributes.is_empty() {
        return Ok(false);
    }
    let current = store.read(href)?;
    let changed = attributes
        .iter()
        .any(|(name, value)| current.get(name) != Some(value));
    if changed {
        log::trace!("Update {href}: {attributes:?}");
        store.update(href, attributes)?;
    }
    Ok(changed)
}

/// The first child of a kind, for objects the controller keeps one of
pub fn find_first(
    store: &mut impl RemoteStore,
    parent: &Href,
    kind: Kind,
) -> Result<Href, RemoteError> {
    store
        .find(parent, kind, &[])?
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::NotFound(Href(format!("{parent}/{}", kind.segment()))))
}

/// The href of the traffic root object
pub fn traffic_root(store: &mut impl RemoteStore) -> Result<Href, RemoteError> {
    let root = store.root();
    find_first(store, &root, Kind::Traffic)
}

/// Read a string attribute, empty when absent
pub fn attribute_str(attributes: &Attributes, name: &str) -> String {
    match attributes.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Read an attribute holding a list of hrefs
pub fn attribute_hrefs(attributes: &Attributes, name: &str) -> Vec<Href> {
    match attributes.get(name) {
        Some(serde_json::Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(Href::new))
            .collect(),
        _ => vec![],
    }
}
