use crate::fields::HeaderKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;

/// A field value as written to the controller. Numbers are accepted and kept in their
/// textual form.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "ScalarYaml")]
pub struct Scalar(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarYaml {
    Int(i64),
    U64(u64),
    Float(f64),
    Text(String),
}

impl From<ScalarYaml> for Scalar {
    fn from(s: ScalarYaml) -> Self {
        match s {
            ScalarYaml::Int(i) => Scalar(i.to_string()),
            ScalarYaml::U64(u) => Scalar(u.to_string()),
            ScalarYaml::Float(f) => Scalar(f.to_string()),
            ScalarYaml::Text(t) => Scalar(t),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar(i.to_string())
    }
}

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value pattern of a header field, with an optional name under which the field is
/// tracked in the results
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "PatternYaml")]
pub struct Pattern {
    pub value: PatternValue,
    pub ingress_result_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternValue {
    Fixed(Scalar),
    List(Vec<Scalar>),
    Counter(Counter),
    Random(Random),
    /// A choice this backend does not know. It is skipped with a warning.
    Unsupported(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Counter {
    pub start: Scalar,
    #[serde(default = "default_step")]
    pub step: Scalar,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_up")]
    pub up: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Random {
    pub min: Scalar,
    pub max: Scalar,
    #[serde(default = "default_step")]
    pub step: Scalar,
    #[serde(default = "default_seed")]
    pub seed: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_step() -> Scalar {
    Scalar::from(1i64)
}

fn default_count() -> u32 {
    1
}

fn default_seed() -> u32 {
    1
}

fn default_up() -> bool {
    true
}

#[derive(Deserialize)]
struct PatternYaml {
    choice: Option<String>,
    fixed: Option<Scalar>,
    list: Option<Vec<Scalar>>,
    counter: Option<Counter>,
    random: Option<Random>,
    ingress_result_name: Option<String>,
}

impl From<PatternYaml> for Pattern {
    fn from(p: PatternYaml) -> Self {
        // without an explicit choice, the first given value decides
        let choice = p.choice.unwrap_or_else(|| {
            if p.fixed.is_some() {
                "fixed"
            } else if p.list.is_some() {
                "list"
            } else if p.counter.is_some() {
                "counter"
            } else if p.random.is_some() {
                "random"
            } else {
                "unspecified"
            }
            .to_string()
        });
        let value = match (choice.as_str(), p.fixed, p.list, p.counter, p.random) {
            ("fixed", Some(v), _, _, _) => PatternValue::Fixed(v),
            ("list", _, Some(v), _, _) => PatternValue::List(v),
            ("counter", _, _, Some(v), _) => PatternValue::Counter(v),
            ("random", _, _, _, Some(v)) => PatternValue::Random(v),
            _ => PatternValue::Unsupported(choice),
        };
        Pattern {
            value,
            ingress_result_name: p.ingress_result_name,
        }
    }
}

impl Pattern {
    pub fn fixed(value: impl Into<Scalar>) -> Self {
        PatternValue::Fixed(value.into()).into()
    }

    /// Track this field in the results under that name
    pub fn tracked(mut self, ingress_result_name: &str) -> Self {
        self.ingress_result_name = Some(ingress_result_name.to_string());
        self
    }
}

impl From<PatternValue> for Pattern {
    fn from(value: PatternValue) -> Self {
        Pattern {
            value,
            ingress_result_name: None,
        }
    }
}

/// Field name to pattern. Names unknown to the backend are ignored.
pub type FieldPatterns = BTreeMap<String, Pattern>;

/// One header of the packet of a flow
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Header {
    Ethernet(FieldPatterns),
    Vlan(FieldPatterns),
    Ipv4(Ipv4),
    Tcp(FieldPatterns),
    Udp(FieldPatterns),
    PfcPause(FieldPatterns),
    Custom(Custom),
}

impl Header {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Header::Ethernet(_) => HeaderKind::Ethernet,
            Header::Vlan(_) => HeaderKind::Vlan,
            Header::Ipv4(_) => HeaderKind::Ipv4,
            Header::Tcp(_) => HeaderKind::Tcp,
            Header::Udp(_) => HeaderKind::Udp,
            Header::PfcPause(_) => HeaderKind::PfcPause,
            Header::Custom(_) => HeaderKind::Custom,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Ipv4 {
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub priority: Option<Priority>,
    #[serde(flatten)]
    pub fields: FieldPatterns,
}

/// The IPv4 priority byte, as one of its interpretations
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Raw(Pattern),
    Tos(FieldPatterns),
    Dscp(FieldPatterns),
}

/// Arbitrary bytes, given in hexadecimal
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Custom {
    pub bytes: String,
}

/// Where a flow is sent from and to
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TxRx {
    Port(PortTxRx),
    Device(DeviceTxRx),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PortTxRx {
    pub tx_port_name: String,
    #[serde(default)]
    pub rx_port_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeviceTxRx {
    #[serde(default)]
    pub tx_device_names: Vec<String>,
    #[serde(default)]
    pub rx_device_names: Vec<String>,
}

/// Frame size of a flow
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "SizeYaml")]
pub enum Size {
    Fixed(u32),
    Increment(SizeIncrement),
    Random(SizeRandom),
    /// A choice this backend does not know. It is skipped with a warning.
    Unsupported(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SizeIncrement {
    pub start: u32,
    pub end: u32,
    #[serde(default = "default_count")]
    pub step: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SizeRandom {
    pub min: u32,
    pub max: u32,
}

#[derive(Deserialize)]
struct SizeYaml {
    choice: Option<String>,
    fixed: Option<u32>,
    increment: Option<SizeIncrement>,
    random: Option<SizeRandom>,
}

impl From<SizeYaml> for Size {
    fn from(s: SizeYaml) -> Self {
        let choice = s.choice.unwrap_or_else(|| {
            if s.fixed.is_some() {
                "fixed"
            } else if s.increment.is_some() {
                "increment"
            } else if s.random.is_some() {
                "random"
            } else {
                "unspecified"
            }
            .to_string()
        });
        match (choice.as_str(), s.fixed, s.increment, s.random) {
            ("fixed", Some(v), _, _) => Size::Fixed(v),
            ("increment", _, Some(v), _) => Size::Increment(v),
            ("random", _, _, Some(v)) => Size::Random(v),
            _ => Size::Unsupported(choice),
        }
    }
}

/// Transmit rate of a flow. The unit is checked when the flow is configured.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Rate {
    #[serde(default = "default_rate_unit")]
    pub unit: String,
    #[serde(default = "default_rate_value")]
    pub value: f64,
}

fn default_rate_unit() -> String {
    "line".to_string()
}

fn default_rate_value() -> f64 {
    100.0
}

/// How long a flow transmits
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Duration {
    Continuous(Continuous),
    Packets(FixedPackets),
    Seconds(FixedSeconds),
    Burst(Burst),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Continuous {
    /// Minimum gap between packets, in bytes
    pub gap: u32,
    pub delay: u32,
    pub delay_unit: String,
}

impl Default for Continuous {
    fn default() -> Self {
        Continuous {
            gap: 12,
            delay: 0,
            delay_unit: "bytes".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FixedPackets {
    pub packets: u64,
    pub gap: u32,
    pub delay: u32,
    pub delay_unit: String,
}

impl Default for FixedPackets {
    fn default() -> Self {
        FixedPackets {
            packets: 1,
            gap: 12,
            delay: 0,
            delay_unit: "bytes".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FixedSeconds {
    pub seconds: f64,
    pub gap: u32,
    pub delay: u32,
    pub delay_unit: String,
}

impl Default for FixedSeconds {
    fn default() -> Self {
        FixedSeconds {
            seconds: 1.0,
            gap: 12,
            delay: 0,
            delay_unit: "bytes".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Burst {
    /// Packets per burst
    pub packets: u64,
    pub gap: u32,
    pub inter_burst_gap: u64,
    pub inter_burst_gap_unit: String,
}

impl Default for Burst {
    fn default() -> Self {
        Burst {
            packets: 1,
            gap: 12,
            inter_burst_gap: 12,
            inter_burst_gap_unit: "bytes".to_string(),
        }
    }
}

/// A traffic stream definition
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Flow {
    pub name: String,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub tx_rx: Option<TxRx>,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub packet: Vec<Header>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub rate: Option<Rate>,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub duration: Option<Duration>,
}

impl Flow {
    /// The names under which fields of this flow are tracked in the results
    pub fn ingress_result_names(&self) -> Vec<&str> {
        let mut patterns: Vec<&Pattern> = vec![];
        for header in self.packet.iter() {
            match header {
                Header::Ethernet(fields)
                | Header::Vlan(fields)
                | Header::Tcp(fields)
                | Header::Udp(fields)
                | Header::PfcPause(fields) => patterns.extend(fields.values()),
                Header::Ipv4(ipv4) => {
                    patterns.extend(ipv4.fields.values());
                    match &ipv4.priority {
                        Some(Priority::Raw(p)) => patterns.push(p),
                        Some(Priority::Tos(fields)) | Some(Priority::Dscp(fields)) => {
                            patterns.extend(fields.values())
                        }
                        None => (),
                    }
                }
                Header::Custom(_) => (),
            }
        }
        patterns
            .into_iter()
            .filter_map(|p| p.ingress_result_name.as_deref())
            .collect()
    }

    /// A lone PFC pause header of at most 64 bytes only fits if the controller allows
    /// frames below the minimum size
    pub fn requires_min_frame_size(&self) -> bool {
        matches!(self.packet.as_slice(), [Header::PfcPause(_)])
            && matches!(self.size, Some(Size::Fixed(s)) if s <= 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_choice_inference() {
        let p: Pattern = serde_yaml::from_str("fixed: 00:00:fa:ce:fa:ce").unwrap();
        assert_eq!(p.value, PatternValue::Fixed(Scalar::from("00:00:fa:ce:fa:ce")));
        let p: Pattern = serde_yaml::from_str("list: [1, 2, '3']").unwrap();
        assert_eq!(
            p.value,
            PatternValue::List(vec![Scalar::from(1i64), Scalar::from(2i64), Scalar::from("3")])
        );
        let p: Pattern =
            serde_yaml::from_str("{counter: {start: 1, step: 2, count: 5, up: false}, ingress_result_name: vlan}")
                .unwrap();
        assert_eq!(
            p.value,
            PatternValue::Counter(Counter {
                start: Scalar::from(1i64),
                step: Scalar::from(2i64),
                count: 5,
                up: false
            })
        );
        assert_eq!(p.ingress_result_name.as_deref(), Some("vlan"));
    }

    #[test]
    fn test_pattern_unsupported_choice() {
        let p: Pattern = serde_yaml::from_str("{choice: metric, metric: {tag: 3}}").unwrap();
        assert_eq!(p.value, PatternValue::Unsupported("metric".to_string()));
        let p: Pattern = serde_yaml::from_str("{choice: fixed}").unwrap();
        assert_eq!(p.value, PatternValue::Unsupported("fixed".to_string()));
    }

    #[test]
    fn test_size() {
        let s: Size = serde_yaml::from_str("fixed: 128").unwrap();
        assert_eq!(s, Size::Fixed(128));
        let s: Size = serde_yaml::from_str("increment: {start: 64, end: 1518}").unwrap();
        assert_eq!(
            s,
            Size::Increment(SizeIncrement {
                start: 64,
                end: 1518,
                step: 1
            })
        );
        let s: Size = serde_yaml::from_str("{choice: weighted_pairs}").unwrap();
        assert_eq!(s, Size::Unsupported("weighted_pairs".to_string()));
    }

    #[test]
    fn test_flow() {
        let flow: Flow = serde_yaml::from_str(
            r#"
name: f1
tx_rx:
  port:
    tx_port_name: p1
    rx_port_name: p2
packet:
  - ethernet:
      dst: {fixed: "00:00:00:00:00:aa"}
  - vlan: {}
  - ipv4:
      priority:
        tos:
          precedence: {fixed: 3}
      dst: {fixed: 10.0.0.2}
  - custom:
      bytes: "0102"
size: {fixed: 128}
rate: {unit: pps, value: 1000}
duration:
  packets:
    packets: 10000
"#,
        )
        .unwrap();
        assert_eq!(flow.packet.len(), 4);
        assert_eq!(flow.packet[2].kind(), HeaderKind::Ipv4);
        if let Header::Ipv4(ipv4) = &flow.packet[2] {
            assert!(matches!(ipv4.priority, Some(Priority::Tos(_))));
            assert_eq!(ipv4.fields.len(), 1);
        }
        assert_eq!(
            flow.duration,
            Some(Duration::Packets(FixedPackets {
                packets: 10000,
                ..Default::default()
            }))
        );
        assert!(!flow.requires_min_frame_size());
    }

    #[test]
    fn test_flow_inline_and_json() {
        let inline: Flow = serde_yaml::from_str(
            "{name: f2, tx_rx: {device: {tx_device_names: [d1], rx_device_names: [d2]}}, \
             packet: [{ipv4: {priority: {raw: {fixed: 184}}}}, {udp: {}}], \
             duration: {burst: {packets: 5, inter_burst_gap: 0}}}",
        )
        .unwrap();
        let json: Flow = serde_yaml::from_str(
            r#"{"name": "f2", "tx_rx": {"device": {"tx_device_names": ["d1"], "rx_device_names": ["d2"]}},
                "packet": [{"ipv4": {"priority": {"raw": {"fixed": 184}}}}, {"udp": {}}],
                "duration": {"burst": {"packets": 5, "inter_burst_gap": 0}}}"#,
        )
        .unwrap();
        assert_eq!(inline, json);
        assert_eq!(
            inline.tx_rx,
            Some(TxRx::Device(DeviceTxRx {
                tx_device_names: vec!["d1".to_string()],
                rx_device_names: vec!["d2".to_string()],
            }))
        );
        match &inline.packet[0] {
            Header::Ipv4(ipv4) => {
                assert_eq!(ipv4.priority, Some(Priority::Raw(Pattern::fixed(184i64))))
            }
            h => panic!("unexpected header {h:?}"),
        }
        assert!(matches!(
            inline.duration,
            Some(Duration::Burst(Burst {
                packets: 5,
                inter_burst_gap: 0,
                ..
            }))
        ));
    }

    #[test]
    fn test_scalar_keeps_large_integers() {
        let s: Scalar = serde_yaml::from_str("18446744073709551615").unwrap();
        assert_eq!(s.as_str(), "18446744073709551615");
        let s: Scalar = serde_yaml::from_str("-3").unwrap();
        assert_eq!(s.as_str(), "-3");
        let r: Random = serde_yaml::from_str("{min: 1, max: 9}").unwrap();
        assert_eq!((r.seed, r.count), (1, 1));
    }

    #[test]
    fn test_requires_min_frame_size() {
        let mut flow = Flow {
            name: "pfc".to_string(),
            packet: vec![Header::PfcPause(FieldPatterns::new())],
            size: Some(Size::Fixed(64)),
            ..Default::default()
        };
        assert!(flow.requires_min_frame_size());
        flow.size = Some(Size::Fixed(65));
        assert!(!flow.requires_min_frame_size());
        flow.size = Some(Size::Fixed(64));
        flow.packet.push(Header::Ethernet(FieldPatterns::new()));
        assert!(!flow.requires_min_frame_size());
    }
}
