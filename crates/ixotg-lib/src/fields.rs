//! Header kinds and the remote field type ids of their fields

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stack type ids that are never treated as a configurable header
pub const STACK_IGNORE: &[&str] = &["ethernet.fcs"];

/// Template of the trailing frame check sequence the controller adds to every stream
pub const FCS_TEMPLATE: &str = "ethernet.fcs";

const ETHERNET: &[(&str, &str)] = &[
    ("dst", "ethernet.header.destinationAddress"),
    ("src", "ethernet.header.sourceAddress"),
    ("ether_type", "ethernet.header.etherType"),
    ("pfc_queue", "ethernet.header.pfcQueue"),
];

const VLAN: &[(&str, &str)] = &[
    ("id", "vlan.header.vlanTag.vlanID"),
    ("cfi", "vlan.header.vlanTag.cfi"),
    ("priority", "vlan.header.vlanTag.vlanUserPriority"),
    ("protocol", "vlan.header.protocolID"),
];

const IPV4: &[(&str, &str)] = &[
    ("version", "ipv4.header.version"),
    ("header_length", "ipv4.header.headerLength"),
    ("total_length", "ipv4.header.totalLength"),
    ("identification", "ipv4.header.identification"),
    ("reserved", "ipv4.header.flags.reserved"),
    ("dont_fragment", "ipv4.header.flags.fragment"),
    ("more_fragments", "ipv4.header.flags.lastFragment"),
    ("fragment_offset", "ipv4.header.fragmentOffset"),
    ("time_to_live", "ipv4.header.ttl"),
    ("protocol", "ipv4.header.protocol"),
    ("header_checksum", "ipv4.header.checksum"),
    ("src", "ipv4.header.srcIp"),
    ("dst", "ipv4.header.dstIp"),
];

/// Sub-fields of the IPv4 priority when it is expressed as a type of service
pub const IPV4_TOS: &[(&str, &str)] = &[
    ("precedence", "ipv4.header.priority.tos.precedence"),
    ("delay", "ipv4.header.priority.tos.delay"),
    ("throughput", "ipv4.header.priority.tos.throughput"),
    ("reliability", "ipv4.header.priority.tos.reliability"),
    ("monetary", "ipv4.header.priority.tos.monetary"),
    ("unused", "ipv4.header.priority.tos.unused"),
];

/// Sub-fields of the IPv4 priority when it is expressed as differentiated services
pub const IPV4_DSCP: &[(&str, &str)] = &[
    ("phb", "ipv4.header.priority.ds.phb.defaultPHB.defaultPHB"),
    ("ecn", "ipv4.header.priority.ds.phb.defaultPHB.unused"),
];

pub const IPV4_PRIORITY_RAW: &str = "ipv4.header.priority.raw";

const TCP: &[(&str, &str)] = &[
    ("src_port", "tcp.header.srcPort"),
    ("dst_port", "tcp.header.dstPort"),
    ("ecn_ns", "tcp.header.ecn.nsBit"),
    ("ecn_cwr", "tcp.header.ecn.cwrBit"),
    ("ecn_echo", "tcp.header.ecn.ecnEchoBit"),
    ("ctl_urg", "tcp.header.controlBits.urgBit"),
    ("ctl_ack", "tcp.header.controlBits.ackBit"),
    ("ctl_psh", "tcp.header.controlBits.pshBit"),
    ("ctl_rst", "tcp.header.controlBits.rstBit"),
    ("ctl_syn", "tcp.header.controlBits.synBit"),
    ("ctl_fin", "tcp.header.controlBits.finBit"),
];

const UDP: &[(&str, &str)] = &[
    ("src_port", "udp.header.srcPort"),
    ("dst_port", "udp.header.dstPort"),
    ("length", "udp.header.length"),
    ("checksum", "udp.header.checksum"),
];

const PFC_PAUSE: &[(&str, &str)] = &[
    ("dst", "pfcPause.header.header.dstAddress"),
    ("src", "pfcPause.header.header.srcAddress"),
    ("ether_type", "pfcPause.header.header.ethertype"),
    ("control_op_code", "pfcPause.header.macControl.controlOpcode"),
    (
        "class_enable_vector",
        "pfcPause.header.macControl.priorityEnableVector",
    ),
    ("pause_class_0", "pfcPause.header.macControl.pauseQuanta.pfcQueue0"),
    ("pause_class_1", "pfcPause.header.macControl.pauseQuanta.pfcQueue1"),
    ("pause_class_2", "pfcPause.header.macControl.pauseQuanta.pfcQueue2"),
    ("pause_class_3", "pfcPause.header.macControl.pauseQuanta.pfcQueue3"),
    ("pause_class_4", "pfcPause.header.macControl.pauseQuanta.pfcQueue4"),
    ("pause_class_5", "pfcPause.header.macControl.pauseQuanta.pfcQueue5"),
    ("pause_class_6", "pfcPause.header.macControl.pauseQuanta.pfcQueue6"),
    ("pause_class_7", "pfcPause.header.macControl.pauseQuanta.pfcQueue7"),
];

pub const CUSTOM_LENGTH: &str = "custom.header.length";
pub const CUSTOM_DATA: &str = "custom.header.data";

const CUSTOM: &[(&str, &str)] = &[("length", CUSTOM_LENGTH), ("data", CUSTOM_DATA)];

/// The packet headers a flow can be made of
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HeaderKind {
    Ethernet,
    Vlan,
    Ipv4,
    Tcp,
    Udp,
    PfcPause,
    Custom,
}

impl Display for HeaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderKind::Ethernet => write!(f, "ethernet"),
            HeaderKind::Vlan => write!(f, "vlan"),
            HeaderKind::Ipv4 => write!(f, "ipv4"),
            HeaderKind::Tcp => write!(f, "tcp"),
            HeaderKind::Udp => write!(f, "udp"),
            HeaderKind::PfcPause => write!(f, "pfc_pause"),
            HeaderKind::Custom => write!(f, "custom"),
        }
    }
}

impl HeaderKind {
    pub const ALL: [HeaderKind; 7] = [
        HeaderKind::Ethernet,
        HeaderKind::Vlan,
        HeaderKind::Ipv4,
        HeaderKind::Tcp,
        HeaderKind::Udp,
        HeaderKind::PfcPause,
        HeaderKind::Custom,
    ];

    /// The stack type id, which is also the id of the protocol template
    pub fn stack_type_id(&self) -> &'static str {
        match self {
            HeaderKind::Ethernet => "ethernet",
            HeaderKind::Vlan => "vlan",
            HeaderKind::Ipv4 => "ipv4",
            HeaderKind::Tcp => "tcp",
            HeaderKind::Udp => "udp",
            HeaderKind::PfcPause => "pfcPause",
            HeaderKind::Custom => "custom",
        }
    }

    /// The header kind of a remote stack, if it has one
    pub fn from_stack_type_id(stack_type_id: &str) -> Option<HeaderKind> {
        HeaderKind::ALL
            .into_iter()
            .find(|k| k.stack_type_id() == stack_type_id)
    }

    /// Abstract field name to remote field type id
    pub fn field_table(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            HeaderKind::Ethernet => ETHERNET,
            HeaderKind::Vlan => VLAN,
            HeaderKind::Ipv4 => IPV4,
            HeaderKind::Tcp => TCP,
            HeaderKind::Udp => UDP,
            HeaderKind::PfcPause => PFC_PAUSE,
            HeaderKind::Custom => CUSTOM,
        }
    }

    /// Unknown names are not an error: the caller ignores the field
    pub fn field_type_id(&self, field_name: &str) -> Option<&'static str> {
        self.field_table()
            .iter()
            .find(|(name, _)| *name == field_name)
            .map(|(_, id)| *id)
    }

    /// Every field a fresh stack of that kind has on the controller
    pub fn template_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = self.field_table().iter().map(|(_, id)| *id).collect();
        if *self == HeaderKind::Ipv4 {
            fields.push(IPV4_PRIORITY_RAW);
            fields.extend(IPV4_TOS.iter().map(|(_, id)| *id));
            fields.extend(IPV4_DSCP.iter().map(|(_, id)| *id));
        }
        fields
    }
}
