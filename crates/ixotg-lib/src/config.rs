use serde::Deserialize;
use std::collections::HashSet;

use crate::error::ConfigurationError;
use crate::flow::{Flow, TxRx};

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
/// The vendor-neutral configuration of a test: ports, emulated devices, captures and flows
pub struct Config {
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub layer1: Vec<Layer1>,
    #[serde(default)]
    pub captures: Vec<Capture>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
/// A test port
pub struct Port {
    pub name: String,
    /// Chassis location of the port, such as "10.39.35.12;09;01"
    pub location: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
/// An emulated device behind a port
pub struct Device {
    pub name: String,
    pub port_name: String,
    /// The outermost protocol of the device (ethernet, ipv4, bgpv4...)
    #[serde(default = "default_device_protocol")]
    pub protocol: String,
}

fn default_device_protocol() -> String {
    "ethernet".to_string()
}

/// Physical layer settings shared by some ports
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Layer1 {
    pub name: String,
    pub port_names: Vec<String>,
    #[serde(default = "default_speed")]
    pub speed: String,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub auto_negotiate: Option<bool>,
    #[serde(default)]
    pub ieee_media_defaults: Option<bool>,
    #[serde(default)]
    pub auto_negotiation: Option<AutoNegotiation>,
    /// Priority flow control. The port is switched to its FCoE variant when set.
    #[serde(default)]
    pub flow_control: Option<FlowControl>,
}

fn default_speed() -> String {
    "speed_10_gbps".to_string()
}

/// Speed names to the speed values of the controller
pub const SPEEDS: [(&str, &str); 10] = [
    ("speed_100_gbps", "speed100g"),
    ("speed_50_gbps", "speed50g"),
    ("speed_40_gbps", "speed40g"),
    ("speed_25_gbps", "speed25g"),
    ("speed_10_gbps", "speed10g"),
    ("speed_1_gbps", "speed1000"),
    ("speed_100_fd_mbps", "speed100fd"),
    ("speed_100_hd_mbps", "speed100hd"),
    ("speed_10_fd_mbps", "speed10fd"),
    ("speed_10_hd_mbps", "speed10hd"),
];

impl Layer1 {
    /// The controller value of the speed, if the speed is known
    pub fn remote_speed(&self) -> Option<&'static str> {
        SPEEDS
            .iter()
            .find(|(name, _)| *name == self.speed)
            .map(|(_, remote)| *remote)
    }

    /// Up to one gigabit, speeds are negotiated the Ethernet way
    pub fn is_ethernet_speed(&self) -> bool {
        self.speed.ends_with("_mbps") || self.speed == "speed_1_gbps"
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AutoNegotiation {
    #[serde(default)]
    pub link_training: Option<bool>,
    #[serde(default)]
    pub rs_fec: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct FlowControl {
    #[serde(default)]
    pub directed_address: Option<String>,
    #[serde(default)]
    pub ieee_802_1qbb: Option<Ieee8021qbb>,
}

/// IEEE 802.1Qbb priority flow control. A class maps to a priority group, none is -1.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Ieee8021qbb {
    #[serde(default)]
    pub pfc_delay: u32,
    #[serde(default)]
    pub pfc_class_0: Option<i32>,
    #[serde(default)]
    pub pfc_class_1: Option<i32>,
    #[serde(default)]
    pub pfc_class_2: Option<i32>,
    #[serde(default)]
    pub pfc_class_3: Option<i32>,
    #[serde(default)]
    pub pfc_class_4: Option<i32>,
    #[serde(default)]
    pub pfc_class_5: Option<i32>,
    #[serde(default)]
    pub pfc_class_6: Option<i32>,
    #[serde(default)]
    pub pfc_class_7: Option<i32>,
}

impl Ieee8021qbb {
    pub fn priority_groups(&self) -> [i32; 8] {
        [
            self.pfc_class_0,
            self.pfc_class_1,
            self.pfc_class_2,
            self.pfc_class_3,
            self.pfc_class_4,
            self.pfc_class_5,
            self.pfc_class_6,
            self.pfc_class_7,
        ]
        .map(|class| class.unwrap_or(-1))
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(from = "CaptureYaml")]
/// A capture of the traffic received by some ports
pub struct Capture {
    pub name: String,
    pub port_names: Vec<String>,
    pub enable: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CaptureYaml {
    name: String,
    port_names: Vec<String>,
    enable: Option<bool>,
}

impl From<CaptureYaml> for Capture {
    fn from(c: CaptureYaml) -> Self {
        Capture {
            name: c.name,
            port_names: c.port_names,
            enable: c.enable.unwrap_or(true),
        }
    }
}

impl Config {
    pub fn get_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn get_device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn get_flow(&self, name: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.name == name)
    }

    /// Whether a port is captured by at least one enabled capture
    pub fn is_captured(&self, port_name: &str) -> bool {
        self.captures
            .iter()
            .any(|c| c.enable && c.port_names.iter().any(|p| p == port_name))
    }

    /// Check the names are unique and every reference points to a configured object.
    /// Tracked field names share the namespace of ports and devices.
    /// A flow without tx_rx is left to the flow configuration, which rejects it.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut names = HashSet::new();
        let all_names = self
            .ports
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.devices.iter().map(|d| d.name.as_str()))
            .chain(self.flows.iter().map(|f| f.name.as_str()))
            .chain(self.flows.iter().flat_map(|f| f.ingress_result_names()));
        for name in all_names {
            if !names.insert(name) {
                return Err(ConfigurationError::DuplicateName(name.to_string()));
            }
        }
        let known_port = |name: &String| {
            self.get_port(name)
                .map(|_| ())
                .ok_or_else(|| ConfigurationError::UnknownName(name.clone()))
        };
        let known_device = |name: &String| {
            self.get_device(name)
                .map(|_| ())
                .ok_or_else(|| ConfigurationError::UnknownName(name.clone()))
        };
        for device in self.devices.iter() {
            known_port(&device.port_name)?;
        }
        for capture in self.captures.iter() {
            capture.port_names.iter().try_for_each(known_port)?;
        }
        for layer1 in self.layer1.iter() {
            layer1.port_names.iter().try_for_each(known_port)?;
            if layer1.remote_speed().is_none() {
                return Err(ConfigurationError::UnknownSpeed {
                    layer1: layer1.name.clone(),
                    speed: layer1.speed.clone(),
                });
            }
        }
        for flow in self.flows.iter() {
            match &flow.tx_rx {
                Some(TxRx::Port(p)) => {
                    known_port(&p.tx_port_name)?;
                    p.rx_port_name.iter().try_for_each(known_port)?;
                }
                Some(TxRx::Device(d)) => {
                    d.tx_device_names.iter().try_for_each(known_device)?;
                    d.rx_device_names.iter().try_for_each(known_device)?;
                }
                None => (),
            }
        }
        Ok(())
    }
}

/// Import a configuration from a string. The string can be either in JSON or YAML format (the
/// truth is that YAML is a superset of JSON).
pub fn import_config(config_string: &str) -> Result<Config, ConfigurationError> {
    let config: Config = serde_yaml::from_str(config_string)?;
    config.validate()?;
    log::info!(
        "Configuration loaded: {} ports, {} devices, {} flows",
        config.ports.len(),
        config.devices.len(),
        config.flows.len()
    );
    log::trace!("Configuration: {config:?}");
    Ok(config)
}
