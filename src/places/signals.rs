//! Per-place ambient signal learner: remembers which WiFi networks,
//! Bluetooth devices and cell ids have been observed at each known place.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct PlaceSignals {
    wifi_ssids: BTreeSet<String>,
    bt_devices: BTreeSet<String>,
    cell_ids: BTreeSet<String>,
    visit_count: u32,
}

/// Snapshot of what one place has accumulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSummary {
    pub wifi_list: Vec<String>,
    pub bt_list: Vec<String>,
    pub visit_count: u32,
}

#[derive(Default)]
pub struct PlaceSignalLearner {
    places: Mutex<BTreeMap<String, PlaceSignals>>,
}

impl PlaceSignalLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the signals observed during an in-place visit. Returns true
    /// iff at least one non-empty signal was recorded; a successful learn
    /// counts as one visit.
    pub fn learn(
        &self,
        place_id: &str,
        wifi_ssid: &str,
        bt_device: Option<&str>,
        cell_id: Option<&str>,
    ) -> bool {
        if place_id.is_empty() {
            return false;
        }

        let mut places = self.places.lock();
        let signals = places.entry(place_id.to_string()).or_default();

        let mut recorded = false;
        if !wifi_ssid.is_empty() {
            signals.wifi_ssids.insert(wifi_ssid.to_string());
            recorded = true;
        }
        if let Some(bt) = bt_device.filter(|s| !s.is_empty()) {
            signals.bt_devices.insert(bt.to_string());
            recorded = true;
        }
        if let Some(cell) = cell_id.filter(|s| !s.is_empty()) {
            signals.cell_ids.insert(cell.to_string());
            recorded = true;
        }

        if recorded {
            signals.visit_count += 1;
        }
        recorded
    }

    pub fn matches_wifi(&self, place_id: &str, wifi_ssid: &str) -> bool {
        self.places
            .lock()
            .get(place_id)
            .is_some_and(|s| s.wifi_ssids.contains(wifi_ssid))
    }

    pub fn matches_cell_id(&self, place_id: &str, cell_id: &str) -> bool {
        self.places
            .lock()
            .get(place_id)
            .is_some_and(|s| s.cell_ids.contains(cell_id))
    }

    /// Every place that has observed this SSID, in place-id order.
    pub fn find_places_by_wifi(&self, wifi_ssid: &str) -> Vec<String> {
        self.places
            .lock()
            .iter()
            .filter(|(_, s)| s.wifi_ssids.contains(wifi_ssid))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn find_places_by_cell_id(&self, cell_id: &str) -> Vec<String> {
        self.places
            .lock()
            .iter()
            .filter(|(_, s)| s.cell_ids.contains(cell_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn summary(&self, place_id: &str) -> SignalSummary {
        self.places
            .lock()
            .get(place_id)
            .map(|s| SignalSummary {
                wifi_list: s.wifi_ssids.iter().cloned().collect(),
                bt_list: s.bt_devices.iter().cloned().collect(),
                visit_count: s.visit_count,
            })
            .unwrap_or_default()
    }

    pub fn clear(&self, place_id: &str) {
        self.places.lock().remove(place_id);
    }

    pub fn clear_all(&self) {
        self.places.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_records_signals_and_visits() {
        let learner = PlaceSignalLearner::new();
        assert!(learner.learn("home", "HomeWifi", Some("Headset"), None));
        assert!(learner.learn("home", "HomeWifi", None, Some("cell_42")));
        assert!(!learner.learn("home", "", None, None));
        assert!(!learner.learn("", "HomeWifi", None, None));

        let summary = learner.summary("home");
        assert_eq!(summary.wifi_list, vec!["HomeWifi".to_string()]);
        assert_eq!(summary.bt_list, vec!["Headset".to_string()]);
        assert_eq!(summary.visit_count, 2);
    }

    #[test]
    fn wifi_and_cell_matching() {
        let learner = PlaceSignalLearner::new();
        learner.learn("office", "CorpNet", None, Some("cell_7"));

        assert!(learner.matches_wifi("office", "CorpNet"));
        assert!(!learner.matches_wifi("office", "OtherNet"));
        assert!(!learner.matches_wifi("nowhere", "CorpNet"));
        assert!(learner.matches_cell_id("office", "cell_7"));
        assert!(!learner.matches_cell_id("office", "cell_8"));
    }

    #[test]
    fn reverse_lookup_by_signal() {
        let learner = PlaceSignalLearner::new();
        learner.learn("cafe", "FreeWifi", None, None);
        learner.learn("library", "FreeWifi", None, Some("cell_1"));
        learner.learn("office", "CorpNet", None, Some("cell_1"));

        assert_eq!(
            learner.find_places_by_wifi("FreeWifi"),
            vec!["cafe".to_string(), "library".to_string()]
        );
        assert_eq!(
            learner.find_places_by_cell_id("cell_1"),
            vec!["library".to_string(), "office".to_string()]
        );
        assert!(learner.find_places_by_wifi("Unknown").is_empty());
    }

    #[test]
    fn clear_scopes() {
        let learner = PlaceSignalLearner::new();
        learner.learn("a", "NetA", None, None);
        learner.learn("b", "NetB", None, None);

        learner.clear("a");
        assert!(!learner.matches_wifi("a", "NetA"));
        assert!(learner.matches_wifi("b", "NetB"));

        learner.clear_all();
        assert!(!learner.matches_wifi("b", "NetB"));
    }
}
