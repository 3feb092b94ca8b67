//! Reconciliation of the flows of a configuration with the traffic items of the controller.
//!
//! Traffic items are joined to flows by name. A pass deletes the items of flows that
//! are gone, creates the missing ones and updates the others in place, down to the
//! fields of their stacks. Every write is skipped when the remote object already holds
//! the values, so a second pass with the same configuration does not write anything.

use crate::config::Config;
use crate::context::ReconcileContext;
use crate::error::{ConfigurationError, Error, RemoteError};
use crate::flow::{Duration, Flow, Rate, Size, TxRx};
use crate::remote::*;
use crate::stack;
use serde_json::{json, Value};

pub const TRACK_BY: &str = "trackingenabled0";

/// Rate unit to (frame rate type, bit rate units type, multiplier)
const RATE_UNITS: &[(&str, &str, Option<&str>, f64)] = &[
    ("line", "percentLineRate", None, 1.0),
    ("pps", "framesPerSecond", None, 1.0),
    ("bps", "bitsPerSecond", Some("bitsPerSec"), 1.0),
    ("kbps", "bitsPerSecond", Some("kbitsPerSec"), 1.0),
    ("mbps", "bitsPerSecond", Some("mbitsPerSec"), 1.0),
    ("gbps", "bitsPerSecond", Some("mbitsPerSec"), 1000.0),
];

fn attributes_of(value: Value) -> Attributes {
    match value {
        Value::Object(attributes) => attributes,
        _ => Attributes::new(),
    }
}

/// The remote traffic type of a flow: raw for port endpoints, otherwise the
/// encapsulation of the devices it is sent from
pub fn traffic_type(flow: &Flow, config: &Config) -> Result<String, ConfigurationError> {
    match &flow.tx_rx {
        None => Err(ConfigurationError::MissingTxRx {
            flow: flow.name.clone(),
        }),
        Some(TxRx::Port(_)) => Ok("raw".to_string()),
        Some(TxRx::Device(d)) => {
            // the last device decides
            let name = d
                .tx_device_names
                .last()
                .ok_or_else(|| ConfigurationError::NoTxDevice {
                    flow: flow.name.clone(),
                })?;
            let device = config
                .get_device(name)
                .ok_or_else(|| ConfigurationError::UnknownName(name.clone()))?;
            Ok(match device.protocol.as_str() {
                "ethernet" => "ethernetVlan".to_string(),
                "bgpv4" => "ipv4".to_string(),
                other => other.to_string(),
            })
        }
    }
}

/// Frame rate attributes. The unit must be known.
pub fn frame_rate_attributes(flow_name: &str, rate: &Rate) -> Result<Attributes, ConfigurationError> {
    let (_, rate_type, units, multiplier) = RATE_UNITS
        .iter()
        .find(|(unit, ..)| *unit == rate.unit)
        .ok_or_else(|| ConfigurationError::UnknownRateUnit {
            flow: flow_name.to_string(),
            unit: rate.unit.clone(),
        })?;
    let mut attributes = attributes_of(json!({
        "type": rate_type,
        "rate": rate.value * multiplier,
    }));
    if let Some(units) = units {
        attributes.insert("bitRateUnitsType".to_string(), json!(units));
    }
    Ok(attributes)
}

/// Frame size attributes, `None` for a size choice that is not supported
pub fn frame_size_attributes(size: &Size) -> Option<Attributes> {
    let value = match size {
        Size::Fixed(size) => json!({"type": "fixed", "fixedSize": size}),
        Size::Increment(i) => json!({
            "type": "increment",
            "incrementFrom": i.start,
            "incrementTo": i.end,
            "incrementStep": i.step,
        }),
        Size::Random(r) => json!({
            "type": "random",
            "randomMin": r.min,
            "randomMax": r.max,
        }),
        Size::Unsupported(choice) => {
            log::warn!("Frame size choice {choice} is not supported, the size is not changed");
            return None;
        }
    };
    Some(attributes_of(value))
}

pub fn transmission_control_attributes(duration: &Duration) -> Attributes {
    let value = match duration {
        Duration::Continuous(c) => json!({
            "type": "continuous",
            "minGapBytes": c.gap,
            "startDelay": c.delay,
            "startDelayUnits": c.delay_unit,
        }),
        Duration::Packets(p) => json!({
            "type": "fixedFrameCount",
            "frameCount": p.packets,
            "minGapBytes": p.gap,
            "startDelay": p.delay,
            "startDelayUnits": p.delay_unit,
        }),
        Duration::Seconds(s) => json!({
            "type": "fixedDuration",
            "duration": s.seconds,
            "minGapBytes": s.gap,
            "startDelay": s.delay,
            "startDelayUnits": s.delay_unit,
        }),
        Duration::Burst(b) => json!({
            "type": "custom",
            "burstPacketCount": b.packets,
            "minGapBytes": b.gap,
            "enableInterBurstGap": b.inter_burst_gap > 0,
            "interBurstGap": b.inter_burst_gap,
            "interBurstGapUnits": b.inter_burst_gap_unit,
        }),
    };
    attributes_of(value)
}

/// What a flow resolves to before anything is written
struct FlowPlan<'a> {
    flow: &'a Flow,
    traffic_type: String,
    frame_rate: Option<Attributes>,
}

/// Check every flow of the configuration, so that a configuration error is raised
/// before the first write
fn plan(config: &Config) -> Result<Vec<FlowPlan<'_>>, ConfigurationError> {
    config
        .flows
        .iter()
        .map(|flow| -> Result<FlowPlan, ConfigurationError> {
            Ok(FlowPlan {
                flow,
                traffic_type: traffic_type(flow, config)?,
                frame_rate: flow
                    .rate
                    .as_ref()
                    .map(|r| frame_rate_attributes(&flow.name, r))
                    .transpose()?,
            })
        })
        .collect()
}

/// The configuration errors of the flows, without touching the session
pub fn check(config: &Config) -> Result<(), ConfigurationError> {
    plan(config).map(|_| ())
}

/// Reconcile the traffic items with the flows of the configuration.
///
/// Configuration errors abort the pass. Remote errors are recorded in the context
/// and the other flows are still configured.
pub fn configure(
    store: &mut impl RemoteStore,
    config: &Config,
    ctx: &mut ReconcileContext,
) -> Result<(), Error> {
    let plans = plan(config)?;
    let traffic = traffic_root(store)?;
    if let Err(e) = remove_absent(store, &traffic, config) {
        ctx.record(e);
    }
    for plan in plans.iter() {
        match configure_flow(store, &traffic, plan, ctx) {
            Err(Error::Remote(e)) => ctx.record(e),
            Err(e) => return Err(e),
            Ok(()) => (),
        }
    }
    let min_frame_size = config.flows.iter().any(Flow::requires_min_frame_size);
    let attributes = attributes_of(json!({"enableMinFrameSize": min_frame_size}));
    if let Err(e) = update_if_changed(store, &traffic, attributes) {
        ctx.record(e);
    }
    Ok(())
}

fn remove_absent(
    store: &mut impl RemoteStore,
    traffic: &Href,
    config: &Config,
) -> Result<(), RemoteError> {
    for item in store.find(traffic, Kind::TrafficItem, &[])? {
        let name = attribute_str(&store.read(&item)?, "name");
        if config.get_flow(&name).is_none() {
            log::debug!("Remove traffic item {name}");
            store.remove(&item)?;
        }
    }
    Ok(())
}

fn configure_flow(
    store: &mut impl RemoteStore,
    traffic: &Href,
    plan: &FlowPlan,
    ctx: &mut ReconcileContext,
) -> Result<(), Error> {
    let flow = plan.flow;
    let attributes = attributes_of(json!({
        "name": flow.name,
        "trafficItemType": "l2L3",
        "trafficType": plan.traffic_type,
    }));
    let mut items = store.find(traffic, Kind::TrafficItem, &[Filter::exact("name", &flow.name)])?;
    let item = if items.is_empty() {
        log::debug!("Create traffic item {}", flow.name);
        store.create(traffic, Kind::TrafficItem, attributes)?
    } else {
        let item = items.remove(0);
        update_if_changed(store, &item, attributes)?;
        item
    };

    configure_endpoint_set(store, &item, flow, ctx)?;
    configure_tracking(store, &item)?;

    let element = find_first(store, &item, Kind::ConfigElement)?;
    stack::reconcile_stack(store, &element, &flow.packet, ctx)?;
    if let Some(attributes) = flow.size.as_ref().and_then(frame_size_attributes) {
        let frame_size = find_first(store, &element, Kind::FrameSize)?;
        update_if_changed(store, &frame_size, attributes)?;
    }
    if let Some(attributes) = plan.frame_rate.clone() {
        let frame_rate = find_first(store, &element, Kind::FrameRate)?;
        update_if_changed(store, &frame_rate, attributes)?;
    }
    if let Some(duration) = &flow.duration {
        let control = find_first(store, &element, Kind::TransmissionControl)?;
        update_if_changed(store, &control, transmission_control_attributes(duration))?;
    }
    Ok(())
}

/// The hrefs flows are sent from and to
fn endpoints(
    store: &mut impl RemoteStore,
    flow: &Flow,
    ctx: &ReconcileContext,
) -> Result<(Vec<Href>, Vec<Href>), Error> {
    let lookup = |name: &String| {
        ctx.registry
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownName(name.clone()))
    };
    match &flow.tx_rx {
        Some(TxRx::Port(p)) => {
            let mut protocols = |name: &String| -> Result<Href, Error> {
                let vport = lookup(name)?;
                Ok(find_first(store, &vport, Kind::Protocols)?)
            };
            let sources = vec![protocols(&p.tx_port_name)?];
            let destinations = p.rx_port_name.iter().map(protocols).collect::<Result<_, _>>()?;
            Ok((sources, destinations))
        }
        Some(TxRx::Device(d)) => Ok((
            d.tx_device_names.iter().map(lookup).collect::<Result<_, _>>()?,
            d.rx_device_names.iter().map(lookup).collect::<Result<_, _>>()?,
        )),
        None => Err(ConfigurationError::MissingTxRx {
            flow: flow.name.clone(),
        }
        .into()),
    }
}

/// A traffic item has exactly one endpoint set
fn configure_endpoint_set(
    store: &mut impl RemoteStore,
    item: &Href,
    flow: &Flow,
    ctx: &ReconcileContext,
) -> Result<(), Error> {
    let (sources, destinations) = endpoints(store, flow, ctx)?;
    let attributes = attributes_of(json!({
        "sources": sources,
        "destinations": destinations,
    }));
    let mut sets = store.find(item, Kind::EndpointSet, &[])?;
    if sets.len() > 1 {
        log::debug!("Collapse {} endpoint sets of {}", sets.len(), flow.name);
        for set in sets.drain(..) {
            store.remove(&set)?;
        }
    }
    match sets.first() {
        None => {
            store.create(item, Kind::EndpointSet, attributes)?;
        }
        Some(set) => {
            update_if_changed(store, set, attributes)?;
        }
    }
    Ok(())
}

fn configure_tracking(store: &mut impl RemoteStore, item: &Href) -> Result<(), RemoteError> {
    let tracking = find_first(store, item, Kind::Tracking)?;
    let track_by = store.read(&tracking)?;
    let tracked = match track_by.get("trackBy") {
        Some(Value::Array(values)) => values.iter().any(|v| v == TRACK_BY),
        _ => false,
    };
    if !tracked {
        store.update(&tracking, attributes_of(json!({"trackBy": [TRACK_BY]})))?;
    }
    Ok(())
}
