use crate::config::{Config, Device};
use crate::context::ReconcileContext;
use crate::error::RemoteError;
use crate::remote::*;
use serde_json::json;

pub fn topology_name(port_name: &str) -> String {
    format!("Topology {port_name}")
}

/// Reconcile the emulated devices: one topology per port that has devices, one device
/// group per device. Ports must already be registered.
pub fn configure(
    store: &mut impl RemoteStore,
    config: &Config,
    ctx: &mut ReconcileContext,
) -> Result<(), RemoteError> {
    let root = store.root();
    let ports: Vec<&str> = config
        .ports
        .iter()
        .map(|p| p.name.as_str())
        .filter(|p| config.devices.iter().any(|d| d.port_name == *p))
        .collect();
    let wanted: Vec<String> = ports.iter().map(|p| topology_name(p)).collect();
    for topology in store.find(&root, Kind::Topology, &[])? {
        let name = attribute_str(&store.read(&topology)?, "name");
        if !wanted.contains(&name) {
            log::debug!("Remove {name}");
            store.remove(&topology)?;
        }
    }
    for (port_name, name) in ports.into_iter().zip(wanted.iter()) {
        let vport = ctx
            .registry
            .get(port_name)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected(format!("port {port_name} is not configured")))?;
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        attributes.insert("vports".to_string(), json!([vport]));
        let existing = store.find(&root, Kind::Topology, &[Filter::exact("name", name)])?;
        let topology = match existing.into_iter().next() {
            Some(topology) => {
                update_if_changed(store, &topology, attributes)?;
                topology
            }
            None => store.create(&root, Kind::Topology, attributes)?,
        };
        let devices: Vec<&Device> = config
            .devices
            .iter()
            .filter(|d| d.port_name == port_name)
            .collect();
        configure_device_groups(store, &topology, &devices, ctx)?;
    }
    Ok(())
}

fn configure_device_groups(
    store: &mut impl RemoteStore,
    topology: &Href,
    devices: &[&Device],
    ctx: &mut ReconcileContext,
) -> Result<(), RemoteError> {
    for group in store.find(topology, Kind::DeviceGroup, &[])? {
        let name = attribute_str(&store.read(&group)?, "name");
        if !devices.iter().any(|d| d.name == name) {
            store.remove(&group)?;
        }
    }
    for device in devices {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(device.name));
        attributes.insert("protocol".to_string(), json!(device.protocol));
        attributes.insert("multiplier".to_string(), json!(1));
        let existing =
            store.find(topology, Kind::DeviceGroup, &[Filter::exact("name", &device.name)])?;
        let group = match existing.into_iter().next() {
            Some(group) => {
                update_if_changed(store, &group, attributes)?;
                group
            }
            None => store.create(topology, Kind::DeviceGroup, attributes)?,
        };
        ctx.registry.insert(&device.name, group);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Port;
    use crate::remote::memory::InMemoryStore;

    fn device(name: &str, port_name: &str) -> Device {
        Device {
            name: name.to_string(),
            port_name: port_name.to_string(),
            protocol: "ethernet".to_string(),
        }
    }

    #[test]
    fn test_devices_reconciled() {
        let mut store = InMemoryStore::new();
        let mut config = Config {
            ports: ["p1", "p2", "p3"]
                .iter()
                .map(|n| Port {
                    name: n.to_string(),
                    location: None,
                })
                .collect(),
            devices: vec![device("d1", "p1"), device("d2", "p1"), device("d3", "p2")],
            ..Default::default()
        };
        let mut ctx = ReconcileContext::new();
        crate::port::configure(&mut store, &config, &mut ctx).unwrap();
        configure(&mut store, &config, &mut ctx).unwrap();
        let root = store.root();
        assert_eq!(store.find(&root, Kind::Topology, &[]).unwrap().len(), 2);
        let d2 = ctx.registry.get("d2").unwrap().clone();
        assert_eq!(store.read(&d2).unwrap()["name"], "d2");

        let before = store.mutations();
        configure(&mut store, &config, &mut ctx).unwrap();
        assert_eq!(store.mutations(), before);

        config.devices.retain(|d| d.name == "d1");
        configure(&mut store, &config, &mut ctx).unwrap();
        let topologies = store.find(&root, Kind::Topology, &[]).unwrap();
        assert_eq!(topologies.len(), 1);
        assert_eq!(store.read(&topologies[0]).unwrap()["name"], "Topology p1");
        assert!(store.read(&d2).is_err());
    }

    #[test]
    fn test_unregistered_port() {
        let mut store = InMemoryStore::new();
        let config = Config {
            devices: vec![device("d1", "p1")],
            ports: vec![Port {
                name: "p1".to_string(),
                location: None,
            }],
            ..Default::default()
        };
        let e = configure(&mut store, &config, &mut ReconcileContext::new()).unwrap_err();
        assert!(matches!(e, RemoteError::Rejected(_)));
    }
}
