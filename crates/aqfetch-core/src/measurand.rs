use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::units::{self, Conversion};

/// Canonical parameters and the unit every reading of them is stored in.
pub const CANONICAL_PARAMETERS: &[(&str, &str)] = &[
    ("pm1", "µg/m³"),
    ("pm25", "µg/m³"),
    ("pm4", "µg/m³"),
    ("pm10", "µg/m³"),
    ("pm100", "µg/m³"),
    ("bc", "µg/m³"),
    ("bc_375", "µg/m³"),
    ("bc_470", "µg/m³"),
    ("bc_528", "µg/m³"),
    ("bc_625", "µg/m³"),
    ("bc_880", "µg/m³"),
    ("oc", "µg/m³"),
    ("ec", "µg/m³"),
    ("so4", "µg/m³"),
    ("no3", "µg/m³"),
    ("nh4", "µg/m³"),
    ("pb", "µg/m³"),
    ("co", "ppm"),
    ("co2", "ppm"),
    ("ch4", "ppm"),
    ("no", "ppm"),
    ("no2", "ppm"),
    ("nox", "ppm"),
    ("o3", "ppm"),
    ("so2", "ppm"),
    ("h2s", "ppm"),
    ("nh3", "ppm"),
    ("ufp", "particles/cm³"),
    ("um003", "particles/cm³"),
    ("um005", "particles/cm³"),
    ("um010", "particles/cm³"),
    ("um025", "particles/cm³"),
    ("um050", "particles/cm³"),
    ("um100", "particles/cm³"),
    ("temperature", "c"),
    ("dew_point", "c"),
    ("humidity", "%"),
    ("relativehumidity", "%"),
    ("pressure", "hpa"),
    ("wind_speed", "m/s"),
    ("wind_direction", "deg"),
    ("solar_radiation", "w/m²"),
    ("precipitation", "mm"),
    ("voc", "iaq"),
];

static CANONICAL_INDEX: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| CANONICAL_PARAMETERS.iter().copied().collect());

pub fn canonical_unit(parameter: &str) -> Option<&'static str> {
    CANONICAL_INDEX.get(parameter).copied()
}

pub fn is_supported(parameter: &str) -> bool {
    CANONICAL_INDEX.contains_key(parameter)
}

/// How a provider names one of its columns: the canonical parameter it maps
/// to and the unit the provider reports it in. Accepts `["co", "ppb"]` as
/// well as `{ parameter = "co", unit = "ppb" }` in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderParameter {
    pub parameter: String,
    pub unit: String,
}

impl ProviderParameter {
    pub fn new(parameter: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            unit: unit.into(),
        }
    }
}

/// Provider column name → canonical parameter and provider unit.
pub type ParameterLookup = BTreeMap<String, ProviderParameter>;

#[derive(Debug, Clone)]
pub struct Measurand {
    input_param: String,
    parameter: String,
    unit: String,
    provider_unit: String,
    conversion: Conversion,
}

impl Measurand {
    /// `None` when `parameter` is not a canonical parameter.
    pub fn new(input_param: &str, parameter: &str, provider_unit: &str) -> Option<Self> {
        let unit = canonical_unit(parameter)?;
        Some(Self {
            input_param: input_param.to_string(),
            parameter: parameter.to_string(),
            unit: unit.to_string(),
            provider_unit: provider_unit.to_string(),
            conversion: units::resolve(provider_unit, unit),
        })
    }

    /// Resolves a provider lookup into the measurands this system supports.
    /// Unsupported parameters are dropped; providers routinely pass broader
    /// lookups than the canonical table covers.
    pub fn resolve(lookup: &ParameterLookup) -> Vec<Measurand> {
        lookup
            .iter()
            .filter_map(|(input_param, mapping)| {
                let measurand = Measurand::new(input_param, &mapping.parameter, &mapping.unit);
                if measurand.is_none() {
                    debug!(
                        input_param = %input_param,
                        parameter = %mapping.parameter,
                        "dropping unsupported measurand"
                    );
                }
                measurand
            })
            .collect()
    }

    /// Same as [`Measurand::resolve`], keyed by the provider's column name.
    pub fn resolve_indexed(lookup: &ParameterLookup) -> HashMap<String, Measurand> {
        Self::resolve(lookup)
            .into_iter()
            .map(|measurand| (measurand.input_param.clone(), measurand))
            .collect()
    }

    pub fn normalize_value(&self, raw: f64) -> f64 {
        (self.conversion)(raw)
    }

    pub fn input_param(&self) -> &str {
        &self.input_param
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn provider_unit(&self) -> &str {
        &self.provider_unit
    }
}
