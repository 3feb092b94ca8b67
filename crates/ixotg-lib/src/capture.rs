use crate::api::ApiOptions;
use crate::context::Registry;
use crate::error::{ConfigurationError, Error, RemoteError};
use crate::remote::*;
use crate::structs::CaptureState;
use pcap_file::pcap::PcapReader;
use std::thread;
use std::time::Instant;

fn vport(registry: &Registry, port_name: &str) -> Result<Href, ConfigurationError> {
    registry
        .get(port_name)
        .cloned()
        .ok_or_else(|| ConfigurationError::UnknownName(port_name.to_string()))
}

/// Start a pending capture request: forget previous captures, then start capture on
/// every port where it is enabled
pub fn arm(store: &mut impl RemoteStore, request: &CaptureState) -> Result<(), RemoteError> {
    let root = store.root();
    let vports = store.find(&root, Kind::Vport, &[])?;
    store.clear_capture_infos(&vports)?;
    store.start_capture()?;
    log::info!("Capture started (requested for {:?})", request.port_names);
    Ok(())
}

pub fn stop(
    store: &mut impl RemoteStore,
    registry: &Registry,
    port_names: &[String],
) -> Result<(), Error> {
    for name in port_names {
        store.stop_capture(&vport(registry, name)?)?;
    }
    Ok(())
}

/// Stop the capture of a port, wait until its buffer can be read and return it as a
/// pcap stream
pub fn retrieve(
    store: &mut impl RemoteStore,
    registry: &Registry,
    port_name: &str,
    options: &ApiOptions,
) -> Result<Vec<u8>, Error> {
    let vport = vport(registry, port_name)?;
    store.stop_capture(&vport)?;
    let start = Instant::now();
    while !store.capture_ready(&vport)? {
        if start.elapsed() >= options.capture_timeout {
            return Err(RemoteError::CaptureTimeout {
                port: port_name.to_string(),
                waited: start.elapsed(),
            }
            .into());
        }
        thread::sleep(options.capture_poll_interval);
    }
    let bytes = store.capture_file(&vport)?;
    let packets = count_packets(&bytes)?;
    log::info!(
        "Capture of {port_name}: {packets} packets ready after {:?}",
        start.elapsed()
    );
    Ok(bytes)
}

/// Number of packets of a pcap stream
pub fn count_packets(bytes: &[u8]) -> Result<usize, RemoteError> {
    let not_pcap = |e: pcap_file::PcapError| {
        RemoteError::Rejected(format!("the capture is not a pcap stream: {e}"))
    };
    let mut reader = PcapReader::new(bytes).map_err(not_pcap)?;
    let mut count = 0;
    while let Some(packet) = reader.next_packet() {
        packet.map_err(not_pcap)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::InMemoryStore;
    use crate::structs::CaptureAction;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (InMemoryStore, Registry, Href) {
        let mut store = InMemoryStore::new();
        let root = store.root();
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("p1"));
        let vport = store.create(&root, Kind::Vport, attributes).unwrap();
        let capture = find_first(&mut store, &vport, Kind::Capture).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("hardwareEnabled".to_string(), json!(true));
        store.update(&capture, attributes).unwrap();
        let mut registry = Registry::default();
        registry.insert("p1", vport.clone());
        (store, registry, vport)
    }

    fn options(timeout_ms: u64) -> ApiOptions {
        ApiOptions {
            capture_poll_interval: Duration::from_millis(1),
            capture_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_capture_retrieved() {
        let (mut store, registry, vport) = setup();
        let request = CaptureState {
            port_names: vec!["p1".to_string()],
            state: CaptureAction::Start,
        };
        arm(&mut store, &request).unwrap();
        store.set_captured_packets(&vport, vec![vec![0xff; 64]; 3]);
        let bytes = retrieve(&mut store, &registry, "p1", &options(1000)).unwrap();
        assert_eq!(count_packets(&bytes).unwrap(), 3);
        assert_eq!(
            store.calls(),
            &[
                "clear_capture_infos 1".to_string(),
                "start_capture".to_string(),
                format!("stop_capture {vport}"),
            ]
        );
    }

    #[test]
    fn test_capture_timeout() {
        let (mut store, registry, _) = setup();
        store.set_capture_ready_after(u32::MAX);
        let e = retrieve(&mut store, &registry, "p1", &options(10)).unwrap_err();
        assert!(matches!(e, Error::Remote(RemoteError::CaptureTimeout { .. })));
    }

    #[test]
    fn test_unknown_port() {
        let (mut store, registry, _) = setup();
        let e = retrieve(&mut store, &registry, "p9", &options(10)).unwrap_err();
        assert!(matches!(e, Error::Configuration(_)));
    }

    #[test]
    fn test_not_a_pcap() {
        assert!(count_packets(b"definitely not a capture").is_err());
    }
}
