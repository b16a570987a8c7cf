use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle record for a versioned sensor. `merged` is the trail of source
/// files folded into this record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub parent_sensor_id: String,
    pub version_id: String,
    pub sensor_id: String,
    pub life_cycle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub merged: Vec<String>,
}

impl Version {
    pub fn new(
        parent_sensor_id: impl Into<String>,
        version_id: impl Into<String>,
        life_cycle_id: impl Into<String>,
    ) -> Self {
        let parent_sensor_id = parent_sensor_id.into();
        let version_id = version_id.into();
        let life_cycle_id = life_cycle_id.into();
        let sensor_id = format!("{parent_sensor_id}-{version_id}-{life_cycle_id}");
        Self {
            parent_sensor_id,
            version_id,
            sensor_id,
            life_cycle_id,
            ..Self::default()
        }
    }

    /// True when identity or readme differ. The `merged` trail is ignored.
    pub fn different(&self, other: &Version) -> bool {
        self.parent_sensor_id != other.parent_sensor_id
            || self.version_id != other.version_id
            || self.sensor_id != other.sensor_id
            || self.life_cycle_id != other.life_cycle_id
            || self.readme != other.readme
            || self.filename != other.filename
    }

    pub fn merge(&mut self, other: &Version) {
        if self.sensor_id != other.sensor_id {
            warn!(
                sensor_id = %self.sensor_id,
                other_sensor_id = %other.sensor_id,
                "refusing to merge versions of different sensors"
            );
            return;
        }

        self.merged.extend(other.merged.iter().cloned());
        if let Some(readme) = &other.readme {
            self.readme = Some(readme.clone());
            if let Some(filename) = &other.filename {
                self.merged.push(filename.clone());
            }
        }
    }
}
