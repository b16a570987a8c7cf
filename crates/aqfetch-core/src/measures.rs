use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::error::MeasureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    Fixed,
    Mobile,
}

impl MeasureKind {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            MeasureKind::Fixed => &["sensor_id", "measure", "timestamp"],
            MeasureKind::Mobile => &["sensor_id", "measure", "timestamp", "longitude", "latitude"],
        }
    }
}

/// A single reading. Mobile readings carry their own position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measure {
    Fixed {
        sensor_id: String,
        measure: f64,
        #[serde(serialize_with = "serialize_timestamp")]
        timestamp: DateTime<Utc>,
    },
    Mobile {
        sensor_id: String,
        measure: f64,
        #[serde(serialize_with = "serialize_timestamp")]
        timestamp: DateTime<Utc>,
        longitude: f64,
        latitude: f64,
    },
}

impl Measure {
    pub fn fixed(sensor_id: impl Into<String>, measure: f64, timestamp: DateTime<Utc>) -> Self {
        Measure::Fixed {
            sensor_id: sensor_id.into(),
            measure,
            timestamp,
        }
    }

    pub fn mobile(
        sensor_id: impl Into<String>,
        measure: f64,
        timestamp: DateTime<Utc>,
        longitude: f64,
        latitude: f64,
    ) -> Self {
        Measure::Mobile {
            sensor_id: sensor_id.into(),
            measure,
            timestamp,
            longitude,
            latitude,
        }
    }

    pub fn kind(&self) -> MeasureKind {
        match self {
            Measure::Fixed { .. } => MeasureKind::Fixed,
            Measure::Mobile { .. } => MeasureKind::Mobile,
        }
    }

    pub fn sensor_id(&self) -> &str {
        match self {
            Measure::Fixed { sensor_id, .. } | Measure::Mobile { sensor_id, .. } => sensor_id,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Measure::Fixed { measure, .. } | Measure::Mobile { measure, .. } => *measure,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Measure::Fixed { timestamp, .. } | Measure::Mobile { timestamp, .. } => *timestamp,
        }
    }

    fn record(&self) -> Vec<String> {
        match self {
            Measure::Fixed {
                sensor_id,
                measure,
                timestamp,
            } => vec![sensor_id.clone(), measure.to_string(), format_timestamp(timestamp)],
            Measure::Mobile {
                sensor_id,
                measure,
                timestamp,
                longitude,
                latitude,
            } => vec![
                sensor_id.clone(),
                measure.to_string(),
                format_timestamp(timestamp),
                longitude.to_string(),
                latitude.to_string(),
            ],
        }
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(timestamp))
}

/// Append-only batch of readings of a single kind. Duplicates are kept.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Measures {
    #[serde(skip)]
    kind: MeasureKind,
    measures: Vec<Measure>,
    #[serde(skip)]
    from: Option<DateTime<Utc>>,
    #[serde(skip)]
    to: Option<DateTime<Utc>>,
}

impl Measures {
    pub fn new(kind: MeasureKind) -> Self {
        Self {
            kind,
            measures: Vec::new(),
            from: None,
            to: None,
        }
    }

    pub fn fixed() -> Self {
        Self::new(MeasureKind::Fixed)
    }

    pub fn mobile() -> Self {
        Self::new(MeasureKind::Mobile)
    }

    pub fn push(&mut self, measure: Measure) -> Result<(), MeasureError> {
        if measure.kind() != self.kind {
            return Err(MeasureError::KindMismatch {
                expected: self.kind,
                found: measure.kind(),
            });
        }
        let timestamp = measure.timestamp();
        self.from = Some(self.from.map_or(timestamp, |from| from.min(timestamp)));
        self.to = Some(self.to.map_or(timestamp, |to| to.max(timestamp)));
        self.measures.push(measure);
        Ok(())
    }

    pub fn kind(&self) -> MeasureKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measure> {
        self.measures.iter()
    }

    pub fn as_slice(&self) -> &[Measure] {
        &self.measures
    }

    /// Earliest timestamp pushed so far.
    pub fn from(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    /// Latest timestamp pushed so far.
    pub fn to(&self) -> Option<DateTime<Utc>> {
        self.to
    }

    pub fn to_csv(&self) -> Result<String, MeasureError> {
        let mut writer = csv::Writer::from_writer(Vec::with_capacity(self.measures.len() * 64));
        writer.write_record(self.kind.header())?;
        for measure in &self.measures {
            writer.write_record(measure.record())?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| MeasureError::Buffer(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| MeasureError::Buffer(err.to_string()))
    }
}

impl<'a> IntoIterator for &'a Measures {
    type Item = &'a Measure;
    type IntoIter = std::slice::Iter<'a, Measure>;

    fn into_iter(self) -> Self::IntoIter {
        self.measures.iter()
    }
}
