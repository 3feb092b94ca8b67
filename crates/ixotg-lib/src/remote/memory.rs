use super::*;
use crate::fields::{HeaderKind, FCS_TEMPLATE};
use pcap_file::pcap::{PcapPacket, PcapWriter};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const ROOT: &str = "/api/v1/sessions/1/ixnetwork";

/// Frames sent by a traffic item that has no fixed frame count
const CONTINUOUS_FRAMES: u64 = 1000;

#[derive(Debug, Clone)]
struct Node {
    kind: Option<Kind>,
    parent: Option<Href>,
    attributes: Attributes,
    children: Vec<Href>,
    next_ids: HashMap<Kind, u32>,
}

impl Node {
    fn new(kind: Option<Kind>, parent: Option<Href>, attributes: Attributes) -> Self {
        Node {
            kind,
            parent,
            attributes,
            children: vec![],
            next_ids: HashMap::new(),
        }
    }
}

/// A controller that lives in memory.
///
/// It keeps the object tree the reconcilers work on, instantiates the children the
/// real controller creates on its own (config elements, default stacks, tracking,
/// port protocols and capture), and synthesizes the statistics views from what was
/// started. Every write is counted, and every operation that is not a plain object
/// access is logged, so the tests can assert what a pass did.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    nodes: BTreeMap<Href, Node>,
    mutations: usize,
    calls: Vec<String>,
    generated: HashSet<Href>,
    protocols_started: bool,
    /// Frames sent per traffic item since the last clear
    sent: HashMap<Href, u64>,
    /// Injected views. `None` makes a view unavailable.
    views: HashMap<String, Option<Vec<StatRow>>>,
    capture_polls: HashMap<Href, u32>,
    capture_ready_after: u32,
    captured: HashMap<Href, Vec<Vec<u8>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn attributes_of(value: Value) -> Attributes {
    match value {
        Value::Object(attributes) => attributes,
        _ => Attributes::new(),
    }
}

fn attribute_u64(attributes: &Attributes, name: &str) -> Option<u64> {
    attributes
        .get(name)
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
}

/// The traffic item an object belongs to, if any
fn traffic_item_of(href: &Href) -> Option<Href> {
    let marker = "/trafficItem/";
    let s = href.as_str();
    let start = s.find(marker)? + marker.len();
    let end = s[start..].find('/').map_or(s.len(), |e| start + e);
    Some(Href::new(&s[..end]))
}

impl InMemoryStore {
    /// An empty session
    pub fn new() -> Self {
        let mut store = InMemoryStore {
            nodes: BTreeMap::new(),
            mutations: 0,
            calls: vec![],
            generated: HashSet::new(),
            protocols_started: false,
            sent: HashMap::new(),
            views: HashMap::new(),
            capture_polls: HashMap::new(),
            capture_ready_after: 2,
            captured: HashMap::new(),
        };
        store.reset();
        store
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.generated.clear();
        self.sent.clear();
        self.capture_polls.clear();
        self.captured.clear();
        self.protocols_started = false;
        let root = Href::new(ROOT);
        self.nodes
            .insert(root.clone(), Node::new(None, None, Attributes::new()));
        let traffic = attributes_of(json!({"enableMinFrameSize": false}));
        // the traffic root cannot fail to be created under the root
        let _ = self.insert_node(&root, Kind::Traffic, traffic);
    }

    /// Number of writes (create, update, remove, protocol append, new config) so far
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// Operations other than object accesses, in call order
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Replace a synthesized statistics view by fixed rows
    pub fn set_statistics(&mut self, view: &str, rows: Vec<StatRow>) {
        self.views.insert(view.to_string(), Some(rows));
    }

    /// Make a statistics view fail
    pub fn set_view_unavailable(&mut self, view: &str) {
        self.views.insert(view.to_string(), None);
    }

    /// Number of readiness polls after which a stopped capture can be read
    pub fn set_capture_ready_after(&mut self, polls: u32) {
        self.capture_ready_after = polls;
    }

    /// Frames that the capture buffer of a port will hold
    pub fn set_captured_packets(&mut self, vport: &Href, packets: Vec<Vec<u8>>) {
        self.captured.insert(vport.clone(), packets);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, href: &Href) -> Result<&Node, RemoteError> {
        self.nodes
            .get(href)
            .ok_or_else(|| RemoteError::NotFound(href.clone()))
    }

    fn node_mut(&mut self, href: &Href) -> Result<&mut Node, RemoteError> {
        self.nodes
            .get_mut(href)
            .ok_or_else(|| RemoteError::NotFound(href.clone()))
    }

    fn children_of(&self, href: &Href, kind: Kind) -> Vec<Href> {
        self.nodes
            .get(href)
            .map(|node| {
                node.children
                    .iter()
                    .filter(|c| self.nodes.get(*c).and_then(|n| n.kind) == Some(kind))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn first_child(&self, href: &Href, kind: Kind) -> Option<&Node> {
        self.children_of(href, kind)
            .first()
            .and_then(|c| self.nodes.get(c))
    }

    /// Add a node at `position` among the children of `parent` (last when `None`), with
    /// the children the controller creates along with it
    fn insert_node_at(
        &mut self,
        parent: &Href,
        kind: Kind,
        mut attributes: Attributes,
        position: Option<usize>,
    ) -> Result<Href, RemoteError> {
        let parent_node = self.node_mut(parent)?;
        let id = parent_node.next_ids.entry(kind).or_insert(0);
        *id += 1;
        let href = parent.child(kind, *id);
        match position {
            Some(p) if p <= parent_node.children.len() => {
                parent_node.children.insert(p, href.clone())
            }
            _ => parent_node.children.push(href.clone()),
        }
        match kind {
            Kind::TrafficItem => {
                attributes.insert("state".to_string(), json!("unapplied"));
            }
            Kind::Vport => {
                attributes.insert("connectionState".to_string(), json!(""));
                attributes
                    .entry("type".to_string())
                    .or_insert_with(|| json!("ethernet"));
            }
            _ => (),
        }
        self.nodes.insert(
            href.clone(),
            Node::new(Some(kind), Some(parent.clone()), attributes),
        );
        match kind {
            Kind::TrafficItem => {
                self.insert_node(&href, Kind::ConfigElement, Attributes::new())?;
                self.insert_node(&href, Kind::Tracking, attributes_of(json!({"trackBy": []})))?;
            }
            Kind::ConfigElement => {
                let frame_size = json!({"type": "fixed", "fixedSize": 64});
                let frame_rate =
                    json!({"type": "percentLineRate", "rate": 100.0, "bitRateUnitsType": "bitsPerSec"});
                let transmission_control = json!({
                    "type": "continuous",
                    "minGapBytes": 12,
                    "startDelay": 0,
                    "startDelayUnits": "bytes",
                });
                self.insert_node(&href, Kind::FrameSize, attributes_of(frame_size))?;
                self.insert_node(&href, Kind::FrameRate, attributes_of(frame_rate))?;
                self.insert_node(
                    &href,
                    Kind::TransmissionControl,
                    attributes_of(transmission_control),
                )?;
                self.insert_stack(&href, None, HeaderKind::Ethernet.stack_type_id())?;
                let ethernet = self.children_of(&href, Kind::Stack);
                self.insert_stack(&href, ethernet.first(), FCS_TEMPLATE)?;
            }
            Kind::Vport => {
                self.insert_node(&href, Kind::Protocols, Attributes::new())?;
                let capture = json!({"hardwareEnabled": false, "isCaptureRunning": false});
                self.insert_node(&href, Kind::Capture, attributes_of(capture))?;
                let l1_config = json!({
                    "speed": "speed10g",
                    "media": "copper",
                    "autoNegotiate": true,
                    "speedAuto": [],
                    "enableAutoNegotiation": false,
                    "ieeeL1Defaults": true,
                    "enableRsFec": false,
                    "linkTraining": false,
                });
                let l1_config = self.insert_node(&href, Kind::L1Config, attributes_of(l1_config))?;
                let fcoe = json!({
                    "enablePFCPauseDelay": false,
                    "flowControlType": "ieee802.1Qbb",
                    "pfcPauseDelay": 1,
                    "pfcPriorityGroups": [-1, -1, -1, -1, -1, -1, -1, -1],
                    "priorityGroupSize": "priorityGroupSize-8",
                    "supportDataCenterMode": false,
                });
                self.insert_node(&l1_config, Kind::Fcoe, attributes_of(fcoe))?;
                self.refresh_connection(&href);
            }
            _ => (),
        }
        Ok(href)
    }

    fn insert_node(
        &mut self,
        parent: &Href,
        kind: Kind,
        attributes: Attributes,
    ) -> Result<Href, RemoteError> {
        self.insert_node_at(parent, kind, attributes, None)
    }

    /// Instantiate a protocol template right after `after`, or as the first stack
    fn insert_stack(
        &mut self,
        config_element: &Href,
        after: Option<&Href>,
        template: &str,
    ) -> Result<Href, RemoteError> {
        let fields = if template == FCS_TEMPLATE {
            vec![]
        } else {
            HeaderKind::from_stack_type_id(template)
                .ok_or_else(|| RemoteError::UnknownTemplate(template.to_string()))?
                .template_fields()
        };
        let children = &self.node(config_element)?.children;
        let position = match after {
            Some(after) => {
                children
                    .iter()
                    .position(|c| c == after)
                    .ok_or_else(|| RemoteError::NotFound(after.clone()))?
                    + 1
            }
            None => {
                let stacks = self.children_of(config_element, Kind::Stack);
                match stacks.first() {
                    Some(first) => children.iter().position(|c| c == first).unwrap_or(0),
                    None => children.len(),
                }
            }
        };
        let attributes = attributes_of(json!({"stackTypeId": template}));
        let stack = self.insert_node_at(config_element, Kind::Stack, attributes, Some(position))?;
        for field in fields {
            let attributes = attributes_of(json!({
                "fieldTypeId": field,
                "auto": true,
                "valueType": "singleValue",
                "singleValue": "0",
                "trackingEnabled": false,
                "activeFieldChoice": false,
            }));
            self.insert_node(&stack, Kind::Field, attributes)?;
        }
        Ok(stack)
    }

    /// A port with a location is connected with its link up
    fn refresh_connection(&mut self, vport: &Href) {
        if let Some(node) = self.nodes.get_mut(vport) {
            let state = if attribute_str(&node.attributes, "location").is_empty() {
                "unassigned"
            } else {
                "connectedLinkUp"
            };
            node.attributes
                .insert("connectionState".to_string(), json!(state));
        }
    }

    /// A change below an applied traffic item requires it to be generated again
    fn mark_unapplied(&mut self, href: &Href) {
        if let Some(item) = traffic_item_of(href) {
            if let Some(node) = self.nodes.get_mut(&item) {
                if attribute_str(&node.attributes, "state") == "stopped" {
                    node.attributes
                        .insert("state".to_string(), json!("unapplied"));
                }
            }
        }
    }

    fn remove_subtree(&mut self, href: &Href) {
        if let Some(node) = self.nodes.remove(href) {
            for child in node.children {
                self.remove_subtree(&child);
            }
        }
        self.sent.remove(href);
        self.generated.remove(href);
    }

    fn traffic_items(&self) -> Vec<Href> {
        let root = Href::new(ROOT);
        self.children_of(&root, Kind::Traffic)
            .first()
            .map(|traffic| self.children_of(traffic, Kind::TrafficItem))
            .unwrap_or_default()
    }

    fn config_element_child(&self, item: &Href, kind: Kind) -> Option<&Attributes> {
        let element = self.children_of(item, Kind::ConfigElement);
        self.first_child(element.first()?, kind)
            .map(|n| &n.attributes)
    }

    fn frame_size(&self, item: &Href) -> u64 {
        self.config_element_child(item, Kind::FrameSize)
            .and_then(|a| match attribute_str(a, "type").as_str() {
                "fixed" => attribute_u64(a, "fixedSize"),
                "increment" => attribute_u64(a, "incrementFrom"),
                "random" => attribute_u64(a, "randomMin"),
                _ => None,
            })
            .unwrap_or(64)
    }

    fn frames_per_start(&self, item: &Href) -> u64 {
        self.config_element_child(item, Kind::TransmissionControl)
            .and_then(|a| match attribute_str(a, "type").as_str() {
                "fixedFrameCount" => attribute_u64(a, "frameCount"),
                _ => None,
            })
            .unwrap_or(CONTINUOUS_FRAMES)
    }

    fn endpoints(&self, item: &Href, name: &str) -> Vec<Href> {
        self.first_child(item, Kind::EndpointSet)
            .map(|n| attribute_hrefs(&n.attributes, name))
            .unwrap_or_default()
    }

    /// The port an endpoint (port protocols or device group) sends from
    fn port_of(&self, endpoint: &Href) -> Option<Href> {
        let s = endpoint.as_str();
        if let Some(pos) = s.find("/deviceGroup/") {
            let topology = self.nodes.get(&Href::new(&s[..pos]))?;
            return attribute_hrefs(&topology.attributes, "vports").into_iter().next();
        }
        s.strip_suffix("/protocols/1").map(Href::new)
    }

    fn is_started(&self, item: &Href) -> bool {
        self.nodes
            .get(item)
            .map(|n| attribute_str(&n.attributes, "state") == "started")
            .unwrap_or(false)
    }

    fn traffic_item_statistics(&self) -> Vec<StatRow> {
        self.traffic_items()
            .iter()
            .filter_map(|item| {
                let node = self.nodes.get(item)?;
                let tx = self.sent.get(item).copied().unwrap_or(0);
                let rx = if self.endpoints(item, "destinations").is_empty() {
                    0
                } else {
                    tx
                };
                let size = self.frame_size(item);
                let rate = if self.is_started(item) { CONTINUOUS_FRAMES } else { 0 };
                let loss = if tx > 0 && rx == 0 { 100.0 } else { 0.0 };
                let row = [
                    ("Traffic Item", attribute_str(&node.attributes, "name")),
                    ("Tx Frames", tx.to_string()),
                    ("Rx Frames", rx.to_string()),
                    ("Rx Bytes", (rx * size).to_string()),
                    ("Tx Frame Rate", format!("{:.3}", rate as f64)),
                    ("Rx Frame Rate", format!("{:.3}", rate as f64)),
                    ("Tx Rate (Bps)", format!("{:.3}", (rate * size) as f64)),
                    ("Rx Rate (Bps)", format!("{:.3}", (rate * size) as f64)),
                    ("Loss %", format!("{loss:.3}")),
                ];
                Some(row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            })
            .collect()
    }

    fn port_statistics(&self) -> Vec<StatRow> {
        let root = Href::new(ROOT);
        self.children_of(&root, Kind::Vport)
            .iter()
            .filter_map(|vport| {
                let node = self.nodes.get(vport)?;
                let (mut frames_tx, mut frames_rx, mut bytes_tx, mut bytes_rx) = (0, 0, 0, 0);
                let (mut rate_tx, mut rate_rx) = (0, 0);
                for item in self.traffic_items() {
                    let tx = self.sent.get(&item).copied().unwrap_or(0);
                    let size = self.frame_size(&item);
                    let rate = if self.is_started(&item) { CONTINUOUS_FRAMES } else { 0 };
                    let on_port = |name: &str| {
                        self.endpoints(&item, name)
                            .iter()
                            .any(|e| self.port_of(e).as_ref() == Some(vport))
                    };
                    if on_port("sources") {
                        frames_tx += tx;
                        bytes_tx += tx * size;
                        rate_tx += rate;
                    }
                    if on_port("destinations") {
                        frames_rx += tx;
                        bytes_rx += tx * size;
                        rate_rx += rate;
                    }
                }
                let row = [
                    ("Port Name", attribute_str(&node.attributes, "name")),
                    ("Frames Tx.", frames_tx.to_string()),
                    ("Valid Frames Rx.", frames_rx.to_string()),
                    ("Frames Tx. Rate", format!("{:.3}", rate_tx as f64)),
                    ("Valid Frames Rx. Rate", format!("{:.3}", rate_rx as f64)),
                    ("Bytes Tx.", bytes_tx.to_string()),
                    ("Bytes Rx.", bytes_rx.to_string()),
                    ("Bytes Tx. Rate", format!("{:.3}", (rate_tx * 64) as f64)),
                    ("Bytes Rx. Rate", format!("{:.3}", (rate_rx * 64) as f64)),
                ];
                Some(row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            })
            .collect()
    }

    fn protocols_summary(&self) -> Vec<StatRow> {
        let device_groups = self
            .nodes
            .values()
            .filter(|n| n.kind == Some(Kind::DeviceGroup))
            .count();
        if device_groups == 0 {
            return vec![];
        }
        let not_started = if self.protocols_started { 0 } else { device_groups };
        let row = [
            ("Protocol Type", "Ethernet".to_string()),
            ("Sessions Up", (device_groups - not_started).to_string()),
            ("Sessions Down", "0".to_string()),
            ("Sessions Not Started", not_started.to_string()),
            ("Sessions Total", device_groups.to_string()),
        ];
        vec![row.into_iter().map(|(k, v)| (k.to_string(), v)).collect()]
    }

    fn capture_attributes(&mut self, vport: &Href) -> Result<&mut Attributes, RemoteError> {
        let capture = self
            .children_of(vport, Kind::Capture)
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(vport.child(Kind::Capture, 1)))?;
        Ok(&mut self.node_mut(&capture)?.attributes)
    }

    fn is_capture_ready(&self, vport: &Href) -> bool {
        self.capture_polls
            .get(vport)
            .is_some_and(|polls| *polls >= self.capture_ready_after)
    }

    /// The object tree as JSON, children grouped by kind
    pub fn to_json(&self) -> Value {
        self.node_json(&Href::new(ROOT))
    }

    fn node_json(&self, href: &Href) -> Value {
        let Some(node) = self.nodes.get(href) else {
            return Value::Null;
        };
        let mut object = node.attributes.clone();
        object.insert("href".to_string(), json!(href.as_str()));
        for child in node.children.iter() {
            let Some(kind) = self.nodes.get(child).and_then(|n| n.kind) else {
                continue;
            };
            let entry = object
                .entry(kind.segment().to_string())
                .or_insert_with(|| json!([]));
            if let Value::Array(list) = entry {
                list.push(self.node_json(child));
            }
        }
        Value::Object(object)
    }
}

impl RemoteStore for InMemoryStore {
    fn root(&self) -> Href {
        Href::new(ROOT)
    }

    fn find(
        &mut self,
        parent: &Href,
        kind: Kind,
        filters: &[Filter],
    ) -> Result<Vec<Href>, RemoteError> {
        self.node(parent)?;
        let regexes = filters
            .iter()
            .map(|f| {
                Regex::new(&f.regex)
                    .map(|r| (f.attribute, r))
                    .map_err(|e| RemoteError::Rejected(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self
            .children_of(parent, kind)
            .into_iter()
            .filter(|child| {
                let attributes = &self.nodes[child].attributes;
                regexes
                    .iter()
                    .all(|(name, r)| r.is_match(&attribute_str(attributes, name)))
            })
            .collect())
    }

    fn read(&mut self, href: &Href) -> Result<Attributes, RemoteError> {
        Ok(self.node(href)?.attributes.clone())
    }

    fn create(
        &mut self,
        parent: &Href,
        kind: Kind,
        attributes: Attributes,
    ) -> Result<Href, RemoteError> {
        let href = self.insert_node(parent, kind, attributes)?;
        self.mutations += 1;
        self.mark_unapplied(parent);
        log::trace!("Created {href}");
        Ok(href)
    }

    fn update(&mut self, href: &Href, attributes: Attributes) -> Result<(), RemoteError> {
        let node = self.node_mut(href)?;
        let kind = node.kind;
        node.attributes.extend(attributes);
        self.mutations += 1;
        if kind == Some(Kind::Vport) {
            self.refresh_connection(href);
        }
        self.mark_unapplied(href);
        Ok(())
    }

    fn remove(&mut self, href: &Href) -> Result<(), RemoteError> {
        let parent = self
            .node(href)?
            .parent
            .clone()
            .ok_or_else(|| RemoteError::Rejected("the session root cannot be removed".to_string()))?;
        self.remove_subtree(href);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| c != href);
        }
        self.mutations += 1;
        self.mark_unapplied(&parent);
        log::trace!("Removed {href}");
        Ok(())
    }

    fn append_protocol(
        &mut self,
        config_element: &Href,
        after: Option<&Href>,
        template: &str,
    ) -> Result<Href, RemoteError> {
        if self.node(config_element)?.kind != Some(Kind::ConfigElement) {
            return Err(RemoteError::Rejected(format!(
                "{config_element} is not a config element"
            )));
        }
        let stack = self.insert_stack(config_element, after, template)?;
        self.mutations += 1;
        self.mark_unapplied(config_element);
        Ok(stack)
    }

    fn new_config(&mut self) -> Result<(), RemoteError> {
        self.calls.push("new_config".to_string());
        self.reset();
        self.mutations += 1;
        Ok(())
    }

    fn generate(&mut self, traffic_items: &[Href]) -> Result<(), RemoteError> {
        self.calls
            .push(format!("generate {}", traffic_items.len()));
        for item in traffic_items {
            self.node(item)?;
            self.generated.insert(item.clone());
        }
        Ok(())
    }

    fn apply(&mut self) -> Result<(), RemoteError> {
        self.calls.push("apply".to_string());
        for item in self.generated.drain() {
            if let Some(node) = self.nodes.get_mut(&item) {
                node.attributes
                    .insert("state".to_string(), json!("stopped"));
            }
        }
        Ok(())
    }

    fn start_all_protocols(&mut self) -> Result<(), RemoteError> {
        self.calls.push("start_all_protocols".to_string());
        self.protocols_started = true;
        Ok(())
    }

    fn clear_stats(&mut self) -> Result<(), RemoteError> {
        self.calls.push("clear_stats".to_string());
        self.sent.clear();
        Ok(())
    }

    fn set_traffic_state(
        &mut self,
        traffic_items: &[Href],
        action: TrafficAction,
    ) -> Result<(), RemoteError> {
        for item in traffic_items {
            let state = attribute_str(&self.node(item)?.attributes, "state");
            if action == TrafficAction::Start && state == "unapplied" {
                return Err(RemoteError::Rejected(format!(
                    "{item} must be generated and applied before it starts"
                )));
            }
        }
        self.calls.push(format!(
            "set_traffic_state {action:?} {}",
            traffic_items.len()
        ));
        for item in traffic_items {
            let state = match action {
                TrafficAction::Start => {
                    let frames = self.frames_per_start(item);
                    *self.sent.entry(item.clone()).or_insert(0) += frames;
                    "started"
                }
                TrafficAction::Stop => "stopped",
                TrafficAction::Pause => "paused",
                TrafficAction::Resume => "started",
            };
            self.node_mut(item)?
                .attributes
                .insert("state".to_string(), json!(state));
        }
        Ok(())
    }

    fn statistics(
        &mut self,
        view: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<StatRow>, RemoteError> {
        let rows = match self.views.get(view) {
            Some(Some(rows)) => rows.clone(),
            Some(None) => return Err(RemoteError::ViewUnavailable(view.to_string())),
            None => match view {
                "Traffic Item Statistics" => self.traffic_item_statistics(),
                "Port Statistics" => self.port_statistics(),
                "Protocols Summary" => self.protocols_summary(),
                _ => return Err(RemoteError::ViewUnavailable(view.to_string())),
            },
        };
        let Some(filter) = filter else {
            return Ok(rows);
        };
        let regex =
            Regex::new(&filter.regex).map_err(|e| RemoteError::Rejected(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.get(filter.attribute)
                    .is_some_and(|value| regex.is_match(value))
            })
            .collect())
    }

    fn clear_capture_infos(&mut self, vports: &[Href]) -> Result<(), RemoteError> {
        self.calls
            .push(format!("clear_capture_infos {}", vports.len()));
        for vport in vports {
            self.node(vport)?;
            self.capture_polls.remove(vport);
        }
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), RemoteError> {
        self.calls.push("start_capture".to_string());
        let root = Href::new(ROOT);
        for vport in self.children_of(&root, Kind::Vport) {
            let capture = self.capture_attributes(&vport)?;
            if capture.get("hardwareEnabled") == Some(&json!(true)) {
                capture.insert("isCaptureRunning".to_string(), json!(true));
                self.capture_polls.remove(&vport);
            }
        }
        Ok(())
    }

    fn stop_capture(&mut self, vport: &Href) -> Result<(), RemoteError> {
        self.calls.push(format!("stop_capture {vport}"));
        self.capture_attributes(vport)?
            .insert("isCaptureRunning".to_string(), json!(false));
        self.capture_polls.entry(vport.clone()).or_insert(0);
        Ok(())
    }

    fn capture_ready(&mut self, vport: &Href) -> Result<bool, RemoteError> {
        let running = self.capture_attributes(vport)?.get("isCaptureRunning") == Some(&json!(true));
        if running {
            return Ok(false);
        }
        let polls = self.capture_polls.entry(vport.clone()).or_insert(0);
        *polls = polls.saturating_add(1);
        Ok(self.is_capture_ready(vport))
    }

    fn capture_file(&mut self, vport: &Href) -> Result<Vec<u8>, RemoteError> {
        self.node(vport)?;
        if !self.is_capture_ready(vport) {
            return Err(RemoteError::Rejected(format!(
                "the capture of {vport} is not ready"
            )));
        }
        let to_remote = |e: pcap_file::PcapError| RemoteError::Rejected(e.to_string());
        let mut writer = PcapWriter::new(Vec::new()).map_err(to_remote)?;
        let packets = self.captured.get(vport).cloned().unwrap_or_default();
        for (i, data) in packets.iter().enumerate() {
            let timestamp = std::time::Duration::from_micros(i as u64);
            writer
                .write_packet(&PcapPacket::new(timestamp, data.len() as u32, data))
                .map_err(to_remote)?;
        }
        Ok(writer.into_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(store: &mut InMemoryStore, name: &str) -> Href {
        let traffic = traffic_root(store).unwrap();
        store
            .create(&traffic, Kind::TrafficItem, attributes_of(json!({"name": name})))
            .unwrap()
    }

    fn stack_ids(store: &mut InMemoryStore, item: &Href) -> Vec<String> {
        let element = find_first(store, item, Kind::ConfigElement).unwrap();
        store
            .find(&element, Kind::Stack, &[])
            .unwrap()
            .iter()
            .map(|s| attribute_str(&store.read(s).unwrap(), "stackTypeId"))
            .collect()
    }

    #[test]
    fn test_traffic_item_defaults() {
        let mut store = InMemoryStore::new();
        let item = item(&mut store, "f1");
        assert_eq!(store.mutations(), 1);
        assert_eq!(stack_ids(&mut store, &item), vec!["ethernet", "ethernet.fcs"]);
        assert_eq!(attribute_str(&store.read(&item).unwrap(), "state"), "unapplied");
        assert!(find_first(&mut store, &item, Kind::Tracking).is_ok());
    }

    #[test]
    fn test_append_protocol_position() {
        let mut store = InMemoryStore::new();
        let item = item(&mut store, "f1");
        let element = find_first(&mut store, &item, Kind::ConfigElement).unwrap();
        let stacks = store.find(&element, Kind::Stack, &[]).unwrap();
        store.append_protocol(&element, Some(&stacks[0]), "ipv4").unwrap();
        store.append_protocol(&element, None, "vlan").unwrap();
        assert_eq!(
            stack_ids(&mut store, &item),
            vec!["vlan", "ethernet", "ipv4", "ethernet.fcs"]
        );
        let e = store.append_protocol(&element, None, "gre").unwrap_err();
        assert_eq!(e, RemoteError::UnknownTemplate("gre".to_string()));
    }

    #[test]
    fn test_find_filters() {
        let mut store = InMemoryStore::new();
        item(&mut store, "a.b");
        item(&mut store, "axb");
        let traffic = traffic_root(&mut store).unwrap();
        let found = store
            .find(&traffic, Kind::TrafficItem, &[Filter::exact("name", "a.b")])
            .unwrap();
        assert_eq!(found.len(), 1);
        let found = store
            .find(&traffic, Kind::TrafficItem, &[Filter::any_of::<&str>("name", &[])])
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_start_requires_apply() {
        let mut store = InMemoryStore::new();
        let item = item(&mut store, "f1");
        assert!(store
            .set_traffic_state(&[item.clone()], TrafficAction::Start)
            .is_err());
        store.generate(&[item.clone()]).unwrap();
        store.apply().unwrap();
        store
            .set_traffic_state(&[item.clone()], TrafficAction::Start)
            .unwrap();
        let rows = store.statistics("Traffic Item Statistics", None).unwrap();
        assert_eq!(rows[0]["Traffic Item"], "f1");
        assert_eq!(rows[0]["Tx Frames"], "1000");
        assert_eq!(
            store.calls(),
            &["generate 1", "apply", "set_traffic_state Start 1"]
        );
    }

    #[test]
    fn test_remove_marks_unapplied() {
        let mut store = InMemoryStore::new();
        let item = item(&mut store, "f1");
        store.generate(&[item.clone()]).unwrap();
        store.apply().unwrap();
        let tracking = find_first(&mut store, &item, Kind::Tracking).unwrap();
        store.remove(&tracking).unwrap();
        assert_eq!(attribute_str(&store.read(&item).unwrap(), "state"), "unapplied");
        assert!(store.read(&tracking).is_err());
        store.remove(&item).unwrap();
        assert!(store.remove(&store.root()).is_err());
    }

    #[test]
    fn test_capture_file() {
        let mut store = InMemoryStore::new();
        let root = store.root();
        let vport = store
            .create(&root, Kind::Vport, attributes_of(json!({"name": "p1"})))
            .unwrap();
        store.set_captured_packets(&vport, vec![vec![0u8; 60], vec![1u8; 64]]);
        store.stop_capture(&vport).unwrap();
        assert!(store.capture_file(&vport).is_err());
        assert!(!store.capture_ready(&vport).unwrap());
        assert!(store.capture_ready(&vport).unwrap());
        let bytes = store.capture_file(&vport).unwrap();
        let mut reader = pcap_file::pcap::PcapReader::new(bytes.as_slice()).unwrap();
        let mut count = 0;
        while let Some(packet) = reader.next_packet() {
            packet.unwrap();
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_unavailable_view() {
        let mut store = InMemoryStore::new();
        store.set_view_unavailable("Port Statistics");
        assert!(matches!(
            store.statistics("Port Statistics", None),
            Err(RemoteError::ViewUnavailable(_))
        ));
        assert!(store.statistics("No Such View", None).is_err());
    }
}
