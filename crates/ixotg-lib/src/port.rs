use crate::config::{Config, Layer1};
use crate::context::ReconcileContext;
use crate::error::RemoteError;
use crate::remote::*;
use serde_json::json;

/// Reconcile the vports with the ports of the configuration and register every port
/// name. The capture of a port is enabled exactly when an enabled capture names it.
/// Layer1 failures are recorded in the context and do not stop the other ports.
pub fn configure(
    store: &mut impl RemoteStore,
    config: &Config,
    ctx: &mut ReconcileContext,
) -> Result<(), RemoteError> {
    let root = store.root();
    for vport in store.find(&root, Kind::Vport, &[])? {
        let name = attribute_str(&store.read(&vport)?, "name");
        if config.get_port(&name).is_none() {
            log::debug!("Remove port {name}");
            store.remove(&vport)?;
        }
    }
    for port in config.ports.iter() {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(port.name));
        attributes.insert("rxMode".to_string(), json!("captureAndMeasure"));
        attributes.insert("txMode".to_string(), json!("interleaved"));
        if let Some(location) = &port.location {
            attributes.insert("location".to_string(), json!(location));
        }
        let existing = store.find(&root, Kind::Vport, &[Filter::exact("name", &port.name)])?;
        let vport = match existing.into_iter().next() {
            Some(vport) => {
                update_if_changed(store, &vport, attributes)?;
                vport
            }
            None => {
                log::debug!("Create port {}", port.name);
                store.create(&root, Kind::Vport, attributes)?
            }
        };
        let capture = find_first(store, &vport, Kind::Capture)?;
        let mut capture_attributes = Attributes::new();
        capture_attributes.insert(
            "hardwareEnabled".to_string(),
            json!(config.is_captured(&port.name)),
        );
        update_if_changed(store, &capture, capture_attributes)?;
        ctx.registry.insert(&port.name, vport);
    }
    for layer1 in config.layer1.iter() {
        for port_name in layer1.port_names.iter() {
            let Some(vport) = ctx.registry.get(port_name).cloned() else {
                continue;
            };
            if let Err(e) = configure_layer1(store, &vport, layer1) {
                ctx.record(e);
            }
        }
    }
    Ok(())
}

/// Port types that have an FCoE variant
const FCOE_TYPES: [&str; 10] = [
    "ethernet",
    "tenGigLan",
    "fortyGigLan",
    "tenGigWan",
    "hundredGigLan",
    "tenFortyHundredGigLan",
    "novusHundredGigLan",
    "novusTenGigLan",
    "krakenFourHundredGigLan",
    "aresOneHundredGigLan",
];

/// Write the layer1 settings of one vport: its type, then its l1Config and, with flow
/// control, the FCoE settings.
fn configure_layer1(
    store: &mut impl RemoteStore,
    vport: &Href,
    layer1: &Layer1,
) -> Result<(), RemoteError> {
    let current = attribute_str(&store.read(vport)?, "type");
    let fcoe = layer1.flow_control.is_some();
    let vport_type = if fcoe && FCOE_TYPES.contains(&current.as_str()) {
        format!("{current}Fcoe")
    } else if !fcoe && current.ends_with("Fcoe") {
        current.trim_end_matches("Fcoe").to_string()
    } else {
        current
    };
    let mut attributes = Attributes::new();
    attributes.insert("type".to_string(), json!(vport_type));
    update_if_changed(store, vport, attributes)?;

    let l1_config = find_first(store, vport, Kind::L1Config)?;
    update_if_changed(store, &l1_config, l1_config_attributes(layer1))?;

    let pfc = layer1
        .flow_control
        .as_ref()
        .and_then(|f| f.ieee_802_1qbb.as_ref());
    if let Some(pfc) = pfc.filter(|_| vport_type.ends_with("Fcoe")) {
        let fcoe = find_first(store, &l1_config, Kind::Fcoe)?;
        let attributes = json!({
            "enablePFCPauseDelay": true,
            "flowControlType": "ieee802.1Qbb",
            "pfcPauseDelay": pfc.pfc_delay,
            "pfcPriorityGroups": pfc.priority_groups(),
            "priorityGroupSize": "priorityGroupSize-8",
            "supportDataCenterMode": true,
        });
        if let serde_json::Value::Object(attributes) = attributes {
            update_if_changed(store, &fcoe, attributes)?;
        }
    }
    Ok(())
}

/// Ethernet speeds advertise themselves to the peer; faster speeds use the IEEE
/// negotiation settings. Unset options are left as they are.
fn l1_config_attributes(layer1: &Layer1) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(speed) = layer1.remote_speed() {
        attributes.insert("speed".to_string(), json!(speed));
    }
    if layer1.is_ethernet_speed() {
        let advertise: Vec<&str> = layer1.remote_speed().into_iter().collect();
        attributes.insert("speedAuto".to_string(), json!(advertise));
        if let Some(media) = &layer1.media {
            attributes.insert("media".to_string(), json!(media));
        }
        if let Some(auto_negotiate) = layer1.auto_negotiate {
            attributes.insert("autoNegotiate".to_string(), json!(auto_negotiate));
        }
    } else {
        let optional = [
            ("ieeeL1Defaults", layer1.ieee_media_defaults),
            ("enableAutoNegotiation", layer1.auto_negotiate),
            (
                "enableRsFec",
                layer1.auto_negotiation.as_ref().and_then(|a| a.rs_fec),
            ),
            (
                "linkTraining",
                layer1.auto_negotiation.as_ref().and_then(|a| a.link_training),
            ),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                attributes.insert(name.to_string(), json!(value));
            }
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoNegotiation, Capture, FlowControl, Ieee8021qbb, Port};
    use crate::remote::memory::InMemoryStore;

    fn port(name: &str, location: Option<&str>) -> Port {
        Port {
            name: name.to_string(),
            location: location.map(str::to_string),
        }
    }

    #[test]
    fn test_ports_reconciled() {
        let mut store = InMemoryStore::new();
        let mut config = Config {
            ports: vec![port("p1", Some("10.0.0.1;1;1")), port("p2", None)],
            captures: vec![Capture {
                name: "c".to_string(),
                port_names: vec!["p2".to_string()],
                enable: true,
            }],
            ..Default::default()
        };
        let mut ctx = ReconcileContext::new();
        configure(&mut store, &config, &mut ctx).unwrap();
        assert_eq!(ctx.registry.len(), 2);
        let p1 = ctx.registry.get("p1").unwrap().clone();
        let p2 = ctx.registry.get("p2").unwrap().clone();
        assert_eq!(store.read(&p1).unwrap()["connectionState"], "connectedLinkUp");
        let capture = find_first(&mut store, &p2, Kind::Capture).unwrap();
        assert_eq!(store.read(&capture).unwrap()["hardwareEnabled"], true);

        let before = store.mutations();
        configure(&mut store, &config, &mut ReconcileContext::new()).unwrap();
        assert_eq!(store.mutations(), before);

        config.ports.remove(0);
        config.captures.clear();
        let mut ctx = ReconcileContext::new();
        configure(&mut store, &config, &mut ctx).unwrap();
        assert!(store.read(&p1).is_err());
        assert_eq!(ctx.registry.get("p2"), Some(&p2));
        assert_eq!(store.read(&capture).unwrap()["hardwareEnabled"], false);
    }

    fn layer1(name: &str, port_names: &[&str], speed: &str) -> Layer1 {
        Layer1 {
            name: name.to_string(),
            port_names: port_names.iter().map(|p| p.to_string()).collect(),
            speed: speed.to_string(),
            media: None,
            auto_negotiate: None,
            ieee_media_defaults: None,
            auto_negotiation: None,
            flow_control: None,
        }
    }

    #[test]
    fn test_layer1() {
        let mut store = InMemoryStore::new();
        let mut ethernet = layer1("ethernet", &["p1"], "speed_1_gbps");
        ethernet.media = Some("fiber".to_string());
        ethernet.auto_negotiate = Some(true);
        let mut uhd = layer1("uhd", &["p2"], "speed_100_gbps");
        uhd.auto_negotiate = Some(false);
        uhd.auto_negotiation = Some(AutoNegotiation {
            link_training: Some(true),
            rs_fec: Some(true),
        });
        let mut config = Config {
            ports: vec![port("p1", Some("10.0.0.1;1;1")), port("p2", Some("10.0.0.1;1;2"))],
            layer1: vec![ethernet, uhd],
            ..Default::default()
        };
        let mut ctx = ReconcileContext::new();
        configure(&mut store, &config, &mut ctx).unwrap();
        assert!(ctx.errors.is_empty());
        let p1 = ctx.registry.get("p1").unwrap().clone();
        let p2 = ctx.registry.get("p2").unwrap().clone();
        let l1 = find_first(&mut store, &p1, Kind::L1Config).unwrap();
        let l1 = store.read(&l1).unwrap();
        assert_eq!(l1["speed"], "speed1000");
        assert_eq!(l1["media"], "fiber");
        assert_eq!(l1["autoNegotiate"], true);
        assert_eq!(l1["speedAuto"], json!(["speed1000"]));
        let l1 = find_first(&mut store, &p2, Kind::L1Config).unwrap();
        let l1 = store.read(&l1).unwrap();
        assert_eq!(l1["speed"], "speed100g");
        assert_eq!(l1["enableAutoNegotiation"], false);
        assert_eq!(l1["enableRsFec"], true);
        assert_eq!(l1["linkTraining"], true);
        assert_eq!(store.read(&p2).unwrap()["type"], "ethernet");

        let before = store.mutations();
        configure(&mut store, &config, &mut ReconcileContext::new()).unwrap();
        assert_eq!(store.mutations(), before);

        // flow control switches the port to FCoE and back
        config.layer1[0].flow_control = Some(FlowControl {
            directed_address: None,
            ieee_802_1qbb: Some(Ieee8021qbb {
                pfc_delay: 3,
                pfc_class_0: Some(1),
                pfc_class_4: Some(7),
                ..Default::default()
            }),
        });
        configure(&mut store, &config, &mut ReconcileContext::new()).unwrap();
        assert_eq!(store.read(&p1).unwrap()["type"], "ethernetFcoe");
        let l1 = find_first(&mut store, &p1, Kind::L1Config).unwrap();
        let fcoe = find_first(&mut store, &l1, Kind::Fcoe).unwrap();
        let fcoe = store.read(&fcoe).unwrap();
        assert_eq!(fcoe["enablePFCPauseDelay"], true);
        assert_eq!(fcoe["pfcPauseDelay"], 3);
        assert_eq!(fcoe["pfcPriorityGroups"], json!([1, -1, -1, -1, 7, -1, -1, -1]));
        config.layer1[0].flow_control = None;
        configure(&mut store, &config, &mut ReconcileContext::new()).unwrap();
        assert_eq!(store.read(&p1).unwrap()["type"], "ethernet");
    }
}
