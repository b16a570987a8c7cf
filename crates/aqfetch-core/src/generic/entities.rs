use std::collections::BTreeMap;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

/// String-keyed map that remembers insertion order. `get_or_insert_with` is
/// idempotent: a second call with the same key returns the first entity.
#[derive(Debug, Clone)]
pub struct EntityMap<T> {
    order: Vec<String>,
    items: BTreeMap<String, T>,
}

impl<T> Default for EntityMap<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            items: BTreeMap::new(),
        }
    }
}

impl<T> EntityMap<T> {
    pub fn get_or_insert_with(&mut self, key: &str, create: impl FnOnce() -> T) -> &mut T {
        let order = &mut self.order;
        self.items.entry(key.to_string()).or_insert_with(|| {
            order.push(key.to_string());
            create()
        })
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|key| self.items.get(key))
    }
}

impl<T: Serialize> Serialize for EntityMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for value in self.values() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    #[serde(rename = "location")]
    pub location_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    pub ismobile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub systems: EntityMap<System>,
}

impl Location {
    pub fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            label: None,
            lat: None,
            lon: None,
            ismobile: false,
            timezone: None,
            systems: EntityMap::default(),
        }
    }

    pub fn has_sensor(&self, sensor_id: &str) -> bool {
        self.systems
            .values()
            .any(|system| system.sensors.contains_key(sensor_id))
    }

    pub fn sensor_count(&self) -> usize {
        self.systems.values().map(|system| system.sensors.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct System {
    pub system_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub sensors: EntityMap<Sensor>,
}

impl System {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            manufacturer_name: None,
            model_name: None,
            sensors: EntityMap::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub sensor_id: String,
    pub parameter: String,
    pub units: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_is_idempotent() {
        let mut map: EntityMap<Location> = EntityMap::default();
        map.get_or_insert_with("b", || Location::new("b")).label = Some("first".into());
        map.get_or_insert_with("a", || Location::new("a"));
        let again = map.get_or_insert_with("b", || Location::new("replacement"));

        assert_eq!(again.location_id, "b");
        assert_eq!(again.label.as_deref(), Some("first"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), ["b", "a"]);
    }

    #[test]
    fn serializes_as_ordered_array() {
        let mut location = Location::new("prov-site");
        location
            .systems
            .get_or_insert_with("prov-site-default", || System::new("prov-site-default"));

        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["location"], "prov-site");
        assert_eq!(json["systems"][0]["system_id"], "prov-site-default");
        assert!(json.get("lat").is_none());
    }
}
