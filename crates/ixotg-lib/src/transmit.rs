use crate::capture;
use crate::error::{Error, RemoteError};
use crate::remote::*;
use crate::structs::{CaptureState, TransmitState};
use std::time::Instant;

pub const PROTOCOLS_VIEW: &str = "Protocols Summary";

fn column_sum(rows: &[StatRow], column: &str) -> u64 {
    rows.iter()
        .filter_map(|r| r.get(column))
        .map(|v| v.trim().parse::<u64>().unwrap_or(0))
        .sum()
}

/// Every emulated session must be up before traffic starts
fn check_protocols(store: &mut impl RemoteStore) -> Result<(), RemoteError> {
    let rows = store.statistics(PROTOCOLS_VIEW, None)?;
    let not_started = column_sum(&rows, "Sessions Not Started");
    let down = column_sum(&rows, "Sessions Down");
    if not_started > 0 || down > 0 {
        return Err(RemoteError::ProtocolsNotUp { not_started, down });
    }
    Ok(())
}

/// Run a transmit transition on the selected flows.
///
/// Starting first brings up the protocols, generates and applies the selected traffic
/// items that changed since they were last applied, arms the pending capture and
/// clears the statistics. The transition itself is always requested, even when the
/// selection is empty.
pub fn set_transmit_state(
    store: &mut impl RemoteStore,
    request: &TransmitState,
    capture_request: Option<&CaptureState>,
) -> Result<(), Error> {
    let traffic = traffic_root(store)?;
    let selection = Filter::any_of("name", &request.flow_names);
    if request.state == TrafficAction::Start {
        let unapplied = store.find(
            &traffic,
            Kind::TrafficItem,
            &[selection.clone(), Filter::exact("state", "unapplied")],
        )?;
        if !unapplied.is_empty() {
            let root = store.root();
            if !store.find(&root, Kind::Topology, &[])?.is_empty() {
                let start = Instant::now();
                store.start_all_protocols()?;
                log::info!("Protocols started in {:?}", start.elapsed());
                check_protocols(store)?;
            }
            let start = Instant::now();
            store.generate(&unapplied)?;
            store.apply()?;
            log::info!(
                "{} flows generated and applied in {:?}",
                unapplied.len(),
                start.elapsed()
            );
        }
        if let Some(capture_request) = capture_request {
            capture::arm(store, capture_request)?;
        }
        if !unapplied.is_empty() {
            store.clear_stats()?;
        }
    }
    let items = store.find(&traffic, Kind::TrafficItem, &[selection])?;
    let start = Instant::now();
    store.set_traffic_state(&items, request.state)?;
    log::info!(
        "{:?} on {} flows in {:?}",
        request.state,
        items.len(),
        start.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::CaptureAction;
    use crate::remote::memory::InMemoryStore;
    use serde_json::json;

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

    fn request(names: &[&str], state: TrafficAction) -> TransmitState {
        TransmitState {
            flow_names: names.iter().map(|n| n.to_string()).collect(),
            state,
        }
    }

    #[test]
    fn test_start_without_matching_items() {
        let mut store = store_with_items(&["f1"]);
        set_transmit_state(&mut store, &request(&["nope"], TrafficAction::Start), None).unwrap();
        assert_eq!(store.calls(), &["set_traffic_state Start 0"]);
    }

    #[test]
    fn test_start_generates_unapplied() {
        let mut store = store_with_items(&["f1", "f2"]);
        set_transmit_state(&mut store, &request(&["f1"], TrafficAction::Start), None).unwrap();
        assert_eq!(
            store.calls(),
            &["generate 1", "apply", "clear_stats", "set_traffic_state Start 1"]
        );
        store.clear_calls();
        // f1 is applied now, starting it again only starts it
        set_transmit_state(&mut store, &request(&["f1"], TrafficAction::Start), None).unwrap();
        assert_eq!(store.calls(), &["set_traffic_state Start 1"]);
        store.clear_calls();
        set_transmit_state(&mut store, &request(&[], TrafficAction::Stop), None).unwrap();
        assert_eq!(store.calls(), &["set_traffic_state Stop 2"]);
    }

    #[test]
    fn test_start_with_capture_and_devices() {
        let mut store = store_with_items(&["f1"]);
        let root = store.root();
        let topology = store.create(&root, Kind::Topology, Attributes::new()).unwrap();
        store
            .create(&topology, Kind::DeviceGroup, Attributes::new())
            .unwrap();
        let capture = CaptureState {
            port_names: vec![],
            state: CaptureAction::Start,
        };
        set_transmit_state(&mut store, &request(&[], TrafficAction::Start), Some(&capture))
            .unwrap();
        assert_eq!(
            store.calls(),
            &[
                "start_all_protocols",
                "generate 1",
                "apply",
                "clear_capture_infos 0",
                "start_capture",
                "clear_stats",
                "set_traffic_state Start 1"
            ]
        );
    }

    #[test]
    fn test_protocols_down_aborts_start() {
        let mut store = store_with_items(&["f1"]);
        let root = store.root();
        store.create(&root, Kind::Topology, Attributes::new()).unwrap();
        let row: StatRow = [
            ("Sessions Not Started".to_string(), "0".to_string()),
            ("Sessions Down".to_string(), "2".to_string()),
        ]
        .into_iter()
        .collect();
        store.set_statistics(PROTOCOLS_VIEW, vec![row]);
        let e = set_transmit_state(&mut store, &request(&[], TrafficAction::Start), None)
            .unwrap_err();
        assert!(matches!(
            e,
            Error::Remote(RemoteError::ProtocolsNotUp {
                not_started: 0,
                down: 2
            })
        ));
        assert_eq!(store.calls(), &["start_all_protocols"]);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut store = store_with_items(&["f1", "f2"]);
        set_transmit_state(&mut store, &request(&[], TrafficAction::Start), None).unwrap();
        store.clear_calls();
        let state = |store: &mut InMemoryStore, name: &str| {
            let traffic = traffic_root(store).unwrap();
            let item = store
                .find(&traffic, Kind::TrafficItem, &[Filter::exact("name", name)])
                .unwrap()
                .remove(0);
            attribute_str(&store.read(&item).unwrap(), "state")
        };
        set_transmit_state(&mut store, &request(&["f2"], TrafficAction::Pause), None).unwrap();
        assert_eq!(state(&mut store, "f1"), "started");
        assert_eq!(state(&mut store, "f2"), "paused");
        set_transmit_state(&mut store, &request(&["f2"], TrafficAction::Resume), None).unwrap();
        assert_eq!(state(&mut store, "f2"), "started");
        assert_eq!(
            store.calls(),
            &["set_traffic_state Pause 1", "set_traffic_state Resume 1"]
        );
    }
}
