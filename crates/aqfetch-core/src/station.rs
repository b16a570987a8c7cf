//! Canonical station hierarchy: a [`SensorNode`] (monitoring site) owns its
//! [`SensorSystem`]s (instrument deployments), each owning its [`Sensor`]s
//! (one measurand per channel).
//!
//! Serialized output is sparse. A missing key means "no data"; nulls are
//! never written at any level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::measurand::Measurand;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorNode {
    pub sensor_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_site_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_deployed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_deployed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_ismobile: Option<bool>,
    /// `[longitude, latitude]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_geometry: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_reporting_frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_node_status: Option<String>,
    /// Provider-specific attributes with no dedicated field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
    #[serde(default)]
    pub sensor_systems: Vec<SensorSystem>,
}

impl SensorNode {
    pub fn new(sensor_node_id: impl Into<String>) -> Self {
        Self {
            sensor_node_id: sensor_node_id.into(),
            ..Self::default()
        }
    }

    pub fn add_system(&mut self, mut system: SensorSystem) {
        system.sensor_node_id = self.sensor_node_id.clone();
        self.sensor_systems.push(system);
    }

    pub fn system(&self, sensor_system_id: &str) -> Option<&SensorSystem> {
        self.sensor_systems
            .iter()
            .find(|system| system.sensor_system_id == sensor_system_id)
    }

    /// Reconciles freshly fetched metadata into this node. Only scalar
    /// attributes move; `sensor_systems` is left as is.
    pub fn merge(&mut self, other: &SensorNode) {
        merge_text(&mut self.sensor_node_id, &other.sensor_node_id);
        merge_option(&mut self.sensor_node_site_name, &other.sensor_node_site_name);
        merge_option(&mut self.sensor_node_source_name, &other.sensor_node_source_name);
        merge_option(
            &mut self.sensor_node_site_description,
            &other.sensor_node_site_description,
        );
        merge_option(&mut self.sensor_node_deployed_by, &other.sensor_node_deployed_by);
        merge_option(&mut self.sensor_node_deployed_date, &other.sensor_node_deployed_date);
        if other.sensor_node_ismobile.is_some() {
            self.sensor_node_ismobile = other.sensor_node_ismobile;
        }
        if other.sensor_node_geometry.is_some() {
            self.sensor_node_geometry = other.sensor_node_geometry;
        }
        merge_option(
            &mut self.sensor_node_reporting_frequency,
            &other.sensor_node_reporting_frequency,
        );
        merge_option(&mut self.sensor_node_timezone, &other.sensor_node_timezone);
        merge_option(&mut self.sensor_node_city, &other.sensor_node_city);
        merge_option(&mut self.sensor_node_country, &other.sensor_node_country);
        merge_option(&mut self.sensor_node_project, &other.sensor_node_project);
        merge_option(&mut self.sensor_node_status, &other.sensor_node_status);
        for (key, value) in &other.extra {
            if !is_empty_value(value) && self.extra.get(key) != Some(value) {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        strip_nulls(&mut value);
        value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSystem {
    pub sensor_system_id: String,
    /// Back reference to the owning node.
    pub sensor_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_system_manufacturer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_system_model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_system_description: Option<String>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

impl SensorSystem {
    pub fn new(sensor_system_id: impl Into<String>) -> Self {
        Self {
            sensor_system_id: sensor_system_id.into(),
            ..Self::default()
        }
    }

    pub fn add_sensor(&mut self, mut sensor: Sensor) {
        sensor.sensor_system_id = self.sensor_system_id.clone();
        self.sensors.push(sensor);
    }

    pub fn json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        strip_nulls(&mut value);
        value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_id: String,
    pub sensor_system_id: String,
    pub measurand_parameter: String,
    pub measurand_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_calibration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_calibration_procedure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_lifecycle_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_interval_seconds: Option<u32>,
}

impl Sensor {
    pub fn new(sensor_id: impl Into<String>, measurand: &Measurand) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            measurand_parameter: measurand.parameter().to_string(),
            measurand_unit: measurand.unit().to_string(),
            ..Self::default()
        }
    }

    pub fn json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        strip_nulls(&mut value);
        value
    }
}

/// Removes null members from objects at every depth.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn merge_text(current: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() && current != incoming {
        *current = incoming.to_string();
    }
}

fn merge_option(current: &mut Option<String>, incoming: &Option<String>) {
    if let Some(incoming) = incoming {
        if !incoming.trim().is_empty() && current.as_deref() != Some(incoming.as_str()) {
            *current = Some(incoming.clone());
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn contains_null(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Object(map) => map.values().any(contains_null),
            Value::Array(items) => items.iter().any(contains_null),
            _ => false,
        }
    }

    fn sample_node() -> SensorNode {
        let measurand = Measurand::new("pm2.5", "pm25", "µg/m³").expect("pm25 supported");
        let mut sensor = Sensor::new("clarity-abc-pm25", &measurand);
        sensor.sensor_interval_seconds = Some(3600);

        let mut system = SensorSystem::new("clarity-abc-node");
        system.sensor_system_manufacturer_name = Some("Clarity".into());
        system.add_sensor(sensor);

        let mut node = SensorNode::new("clarity-abc");
        node.sensor_node_site_name = Some("Main St".into());
        node.extra.insert("sensor_node_owner".into(), Value::Null);
        node.add_system(system);
        node
    }

    #[test]
    fn json_has_no_nulls_at_any_level() {
        let json = sample_node().json();

        assert!(!contains_null(&json));
        assert!(json.get("sensor_node_city").is_none());
        assert!(json.get("sensor_node_owner").is_none());
        assert!(json["sensor_systems"][0].get("sensor_system_model_name").is_none());
        assert!(json["sensor_systems"][0]["sensors"][0]
            .get("sensor_calibration_date")
            .is_none());
    }

    #[test]
    fn children_carry_parent_ids() {
        let node = sample_node();
        let system = node.system("clarity-abc-node").expect("system present");

        assert_eq!(system.sensor_node_id, "clarity-abc");
        assert_eq!(system.sensors[0].sensor_system_id, "clarity-abc-node");
        assert_eq!(system.sensors[0].measurand_parameter, "pm25");
        assert_eq!(system.sensors[0].measurand_unit, "µg/m³");
    }

    #[test]
    fn merge_fills_missing_attributes() {
        let mut existing = SensorNode::new("n1");
        existing.sensor_node_site_name = Some("a".into());

        let mut incoming = SensorNode::new("n1");
        incoming.sensor_node_site_name = Some("a".into());
        incoming.sensor_node_city = Some("b".into());

        existing.merge(&incoming);
        assert_eq!(existing.sensor_node_site_name.as_deref(), Some("a"));
        assert_eq!(existing.sensor_node_city.as_deref(), Some("b"));
    }

    #[test]
    fn merge_ignores_empty_incoming_values() {
        let mut existing = SensorNode::new("n1");
        existing.sensor_node_city = Some("Denver".into());
        existing.extra.insert("sensor_node_owner".into(), json!("city"));

        let mut incoming = SensorNode::new("");
        incoming.sensor_node_city = Some("  ".into());
        incoming.extra.insert("sensor_node_owner".into(), json!(""));

        existing.merge(&incoming);
        assert_eq!(existing.sensor_node_id, "n1");
        assert_eq!(existing.sensor_node_city.as_deref(), Some("Denver"));
        assert_eq!(existing.extra["sensor_node_owner"], json!("city"));
    }

    #[test]
    fn merge_always_takes_incoming_geometry() {
        let mut existing = SensorNode::new("n1");
        existing.sensor_node_geometry = Some([-105.0, 40.0]);

        let mut incoming = SensorNode::new("n1");
        incoming.sensor_node_geometry = Some([-104.5, 39.5]);
        existing.merge(&incoming);
        assert_eq!(existing.sensor_node_geometry, Some([-104.5, 39.5]));

        existing.merge(&SensorNode::new("n1"));
        assert_eq!(existing.sensor_node_geometry, Some([-104.5, 39.5]));
    }

    #[test]
    fn merge_leaves_systems_alone() {
        let mut existing = sample_node();
        let mut incoming = SensorNode::new("clarity-abc");
        incoming.add_system(SensorSystem::new("other"));

        existing.merge(&incoming);
        assert_eq!(existing.sensor_systems.len(), 1);
        assert_eq!(existing.sensor_systems[0].sensor_system_id, "clarity-abc-node");
    }

    #[test]
    fn stored_json_round_trips_through_deserialize() {
        let node = sample_node();
        let parsed: SensorNode = serde_json::from_value(node.json()).expect("deserialize");
        assert_eq!(parsed.sensor_systems, node.sensor_systems);
        assert_eq!(parsed.sensor_node_site_name, node.sensor_node_site_name);
    }
}
