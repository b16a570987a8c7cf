//! Normalizes arbitrary tabular provider exports (locations, sensors and
//! measurements in wide or long layout) into a location/system/sensor tree
//! plus a flat [`Measures`] batch.
//!
//! Files may be processed in any order. Every reference get-or-creates its
//! entity, so a measurement for an unseen location still lands, just with
//! less metadata than a locations file would have provided. A bad row is
//! logged and skipped; it never stops the batch.

mod entities;
pub mod ids;
mod timestamp;

use std::collections::HashMap;

use aqfetch_files::Row;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::measurand::{Measurand, ParameterLookup};
use crate::measures::{Measure, Measures};

pub use entities::{EntityMap, Location, Sensor, System};
pub use timestamp::parse_timestamp;

pub const SCHEMA_VERSION: &str = "v0.1";
pub const MATCHING_METHOD: &str = "ingest-id";

/// Column names the client reads from. Every key can be overridden per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientKeys {
    pub location_key: String,
    pub location_label_key: String,
    pub parameter_key: String,
    pub value_key: String,
    pub latitude_key: String,
    pub longitude_key: String,
    pub manufacturer_key: String,
    pub model_key: String,
    pub datetime_key: String,
    pub interval_key: String,
    pub status_key: String,
}

impl Default for ClientKeys {
    fn default() -> Self {
        Self {
            location_key: "location".to_string(),
            location_label_key: "label".to_string(),
            parameter_key: "parameter".to_string(),
            value_key: "value".to_string(),
            latitude_key: "lat".to_string(),
            longitude_key: "lng".to_string(),
            manufacturer_key: "manufacturer_name".to_string(),
            model_key: "model_name".to_string(),
            datetime_key: "datetime".to_string(),
            interval_key: "interval_seconds".to_string(),
            status_key: "status".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementLayout {
    /// One reading per row; parameter name and value in their own columns.
    Long,
    /// One column per parameter.
    Wide,
}

/// The three kinds of file a generic source may supply. Any may be absent.
#[derive(Debug, Clone, Default)]
pub struct IngestFiles {
    pub locations: Option<Vec<Row>>,
    pub sensors: Option<Vec<Row>>,
    pub measurements: Option<Vec<Row>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestMeta {
    pub schema: &'static str,
    pub source: String,
    pub matching_method: &'static str,
}

/// Document handed to storage: metadata, the location tree, and readings.
#[derive(Debug, Serialize)]
pub struct IngestDocument<'a> {
    pub meta: IngestMeta,
    pub locations: Vec<&'a Location>,
    pub measures: &'a Measures,
}

#[derive(Debug)]
pub struct GenericClient {
    provider: String,
    keys: ClientKeys,
    timezone: Option<Tz>,
    lookup: ParameterLookup,
    measurands: HashMap<String, Measurand>,
    locations: EntityMap<Location>,
    measures: Measures,
    skipped_rows: usize,
}

impl GenericClient {
    pub fn new(provider: impl Into<String>, lookup: ParameterLookup, keys: ClientKeys) -> Self {
        let measurands = Measurand::resolve_indexed(&lookup);
        Self {
            provider: provider.into(),
            keys,
            timezone: None,
            lookup,
            measurands,
            locations: EntityMap::default(),
            measures: Measures::fixed(),
            skipped_rows: 0,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn locations(&self) -> &EntityMap<Location> {
        &self.locations
    }

    pub fn measures(&self) -> &Measures {
        &self.measures
    }

    /// Rows (or single readings of wide rows) dropped with a warning.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn location_id(&self, row: &Row) -> Result<String, IngestError> {
        let location = row
            .text(&self.keys.location_key)
            .ok_or_else(|| IngestError::MissingColumn(self.keys.location_key.clone()))?;
        Ok(ids::location_id(&self.provider, &location))
    }

    pub fn system_id(&self, row: &Row) -> Result<String, IngestError> {
        let location_id = self.location_id(row)?;
        let manufacturer = row.text(&self.keys.manufacturer_key);
        let model = row.text(&self.keys.model_key);
        Ok(ids::system_id(&location_id, manufacturer.as_deref(), model.as_deref()))
    }

    /// Sensor id for the provider parameter `input_param` at the row's
    /// location. Fails for parameters with no supported measurand.
    pub fn sensor_id(&self, row: &Row, input_param: &str) -> Result<String, IngestError> {
        let measurand = self.measurand(input_param)?;
        let location_id = self.location_id(row)?;
        Ok(ids::sensor_id(&location_id, measurand.parameter()))
    }

    fn measurand(&self, input_param: &str) -> Result<&Measurand, IngestError> {
        self.measurands
            .get(input_param)
            .ok_or_else(|| IngestError::UnsupportedMeasurand(input_param.to_string()))
    }

    pub fn process(&mut self, files: &IngestFiles) {
        if let Some(rows) = &files.locations {
            self.process_locations(rows);
        }
        if let Some(rows) = &files.sensors {
            self.process_sensors(rows);
        }
        if let Some(rows) = &files.measurements {
            self.process_measurements(rows);
        }
    }

    pub fn process_locations(&mut self, rows: &[Row]) {
        for (index, row) in rows.iter().enumerate() {
            let result = self.apply_location_row(row);
            self.skip_on_error(index, row, "location", result);
        }
    }

    pub fn process_sensors(&mut self, rows: &[Row]) {
        for (index, row) in rows.iter().enumerate() {
            let result = self.apply_sensor_row(row);
            self.skip_on_error(index, row, "sensor", result);
        }
    }

    pub fn process_measurements(&mut self, rows: &[Row]) {
        let Some(layout) = self.layout_of(rows) else {
            debug!(provider = %self.provider, "no measurement rows to process");
            return;
        };
        debug!(provider = %self.provider, ?layout, rows = rows.len(), "processing measurements");

        for (index, row) in rows.iter().enumerate() {
            let result = match layout {
                MeasurementLayout::Long => self.apply_long_row(row),
                MeasurementLayout::Wide => self.apply_wide_row(index, row),
            };
            self.skip_on_error(index, row, "measurement", result);
        }
    }

    /// Long when the first row carries both the parameter and value columns.
    pub fn layout_of(&self, rows: &[Row]) -> Option<MeasurementLayout> {
        let first = rows.first()?;
        if first.contains_key(&self.keys.parameter_key) && first.contains_key(&self.keys.value_key)
        {
            Some(MeasurementLayout::Long)
        } else {
            Some(MeasurementLayout::Wide)
        }
    }

    pub fn data(&self) -> IngestDocument<'_> {
        IngestDocument {
            meta: IngestMeta {
                schema: SCHEMA_VERSION,
                source: self.provider.clone(),
                matching_method: MATCHING_METHOD,
            },
            locations: self.locations.values().collect(),
            measures: &self.measures,
        }
    }

    fn apply_location_row(&mut self, row: &Row) -> Result<(), IngestError> {
        let (lat, lon) = self.coordinates(row)?;
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return Err(IngestError::Coordinates(
                "location rows need both latitude and longitude".to_string(),
            ));
        };

        let label = row.text(&self.keys.location_label_key);
        let timezone = self.timezone.map(|tz| tz.name().to_string());
        let location = self.location_entry(row)?;
        location.lat = Some(lat);
        location.lon = Some(lon);
        if label.is_some() {
            location.label = label;
        }
        if location.timezone.is_none() {
            location.timezone = timezone;
        }
        Ok(())
    }

    fn apply_sensor_row(&mut self, row: &Row) -> Result<(), IngestError> {
        let input_param = row
            .text(&self.keys.parameter_key)
            .ok_or_else(|| IngestError::MissingColumn(self.keys.parameter_key.clone()))?;
        let measurand = self.measurand(&input_param)?.clone();
        let sensor_id = self.sensor_id(row, &input_param)?;
        let system_id = self.system_id(row)?;
        let manufacturer = row.text(&self.keys.manufacturer_key);
        let model = row.text(&self.keys.model_key);
        let interval_seconds = row
            .number(&self.keys.interval_key)?
            .filter(|seconds| *seconds > 0.0)
            .map(|seconds| match seconds.round() {
                rounded if rounded <= f64::from(u32::MAX) => Ok(rounded as u32),
                _ => Err(IngestError::Interval(seconds)),
            })
            .transpose()?;
        let status = row.text(&self.keys.status_key);

        let location = self.location_entry(row)?;
        let system = location.systems.get_or_insert_with(&system_id, || {
            let mut system = System::new(system_id.clone());
            system.manufacturer_name = manufacturer;
            system.model_name = model;
            system
        });
        let sensor = system.sensors.get_or_insert_with(&sensor_id, || Sensor {
            sensor_id: sensor_id.clone(),
            parameter: measurand.parameter().to_string(),
            units: measurand.unit().to_string(),
            interval_seconds: None,
            status: None,
        });
        if interval_seconds.is_some() {
            sensor.interval_seconds = interval_seconds;
        }
        if status.is_some() {
            sensor.status = status;
        }
        Ok(())
    }

    fn apply_long_row(&mut self, row: &Row) -> Result<(), IngestError> {
        if row.is_falsy(&self.keys.value_key) {
            return Ok(());
        }
        let input_param = row
            .text(&self.keys.parameter_key)
            .ok_or_else(|| IngestError::MissingColumn(self.keys.parameter_key.clone()))?;
        let value_key = self.keys.value_key.clone();
        self.push_reading(row, &input_param, &value_key)
    }

    /// Each configured parameter column is its own reading; a bad column is
    /// reported on its own and the rest of the row still counts.
    fn apply_wide_row(&mut self, index: usize, row: &Row) -> Result<(), IngestError> {
        // Resolve the location up front so a row with no location key is
        // reported once, not once per column.
        self.location_id(row)?;

        let columns: Vec<String> = row
            .keys()
            .filter(|column| self.lookup.contains_key(*column))
            .map(str::to_string)
            .collect();

        for column in columns {
            if row.is_falsy(&column) {
                continue;
            }
            let result = self.push_reading(row, &column, &column);
            self.skip_on_error(index, row, "reading", result);
        }
        Ok(())
    }

    fn push_reading(
        &mut self,
        row: &Row,
        input_param: &str,
        value_column: &str,
    ) -> Result<(), IngestError> {
        let measurand = self.measurand(input_param)?.clone();
        let sensor_id = self.sensor_id(row, input_param)?;
        let raw = row
            .number(value_column)?
            .ok_or_else(|| IngestError::MissingColumn(value_column.to_string()))?;
        let datetime = row
            .text(&self.keys.datetime_key)
            .ok_or_else(|| IngestError::MissingColumn(self.keys.datetime_key.clone()))?;
        let timestamp = parse_timestamp(&datetime, self.timezone)?;
        let (lat, lon) = self.coordinates(row)?;
        let system_id = self.system_id(row)?;

        let location = self.location_entry(row)?;
        if location.lat.is_none() && location.lon.is_none() {
            if let (Some(lat), Some(lon)) = (lat, lon) {
                location.lat = Some(lat);
                location.lon = Some(lon);
            }
        }
        if !location.has_sensor(&sensor_id) {
            let system = location
                .systems
                .get_or_insert_with(&system_id, || System::new(system_id.clone()));
            system.sensors.get_or_insert_with(&sensor_id, || Sensor {
                sensor_id: sensor_id.clone(),
                parameter: measurand.parameter().to_string(),
                units: measurand.unit().to_string(),
                interval_seconds: None,
                status: None,
            });
        }

        self.measures
            .push(Measure::fixed(sensor_id, measurand.normalize_value(raw), timestamp))?;
        Ok(())
    }

    fn location_entry(&mut self, row: &Row) -> Result<&mut Location, IngestError> {
        let location_id = self.location_id(row)?;
        Ok(self
            .locations
            .get_or_insert_with(&location_id, || Location::new(location_id.clone())))
    }

    /// Both, neither, or an error. Half a coordinate pair or an out-of-range
    /// value is rejected rather than stored.
    fn coordinates(&self, row: &Row) -> Result<(Option<f64>, Option<f64>), IngestError> {
        let lat = row.number(&self.keys.latitude_key)?;
        let lon = row.number(&self.keys.longitude_key)?;
        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(IngestError::Coordinates(format!(
                        "({lat}, {lon}) is outside valid ranges"
                    )));
                }
                Ok((Some(lat), Some(lon)))
            }
            (None, None) => Ok((None, None)),
            _ => Err(IngestError::Coordinates(
                "only one of latitude/longitude is present".to_string(),
            )),
        }
    }

    fn skip_on_error(
        &mut self,
        index: usize,
        row: &Row,
        kind: &'static str,
        result: Result<(), IngestError>,
    ) {
        if let Err(err) = result {
            self.skipped_rows += 1;
            let location = row
                .text(&self.keys.location_key)
                .unwrap_or_else(|| "<missing>".to_string());
            warn!(
                provider = %self.provider,
                row = index,
                location = %location,
                kind,
                error = %err,
                "skipping {kind} row"
            );
        }
    }
}
