use std::collections::HashMap;

use once_cell::sync::Lazy;

pub type Conversion = fn(f64) -> f64;

pub const MICROGRAMS_PER_CUBIC_METER: &str = "µg/m³";
pub const NANOGRAMS_PER_CUBIC_METER: &str = "ng/m³";
pub const PPM: &str = "ppm";
pub const PPB: &str = "ppb";
pub const CELSIUS: &str = "c";
pub const FAHRENHEIT: &str = "f";
pub const PARTICLES_PER_CUBIC_CENTIMETER: &str = "particles/cm³";
pub const PARTICLES_PER_100_ML: &str = "particles/100ml";

fn identity(value: f64) -> f64 {
    value
}

fn ppb_to_ppm(value: f64) -> f64 {
    value / 1000.0
}

fn ppm_to_ppb(value: f64) -> f64 {
    value * 1000.0
}

fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

fn nanograms_to_micrograms(value: f64) -> f64 {
    value / 1000.0
}

fn per_100ml_to_per_cm3(value: f64) -> f64 {
    value / 100.0
}

static CONVERSIONS: Lazy<HashMap<&'static str, HashMap<&'static str, Conversion>>> =
    Lazy::new(|| {
        let entries: [(&str, &str, Conversion); 5] = [
            (PPB, PPM, ppb_to_ppm),
            (PPM, PPB, ppm_to_ppb),
            (FAHRENHEIT, CELSIUS, fahrenheit_to_celsius),
            (NANOGRAMS_PER_CUBIC_METER, MICROGRAMS_PER_CUBIC_METER, nanograms_to_micrograms),
            (PARTICLES_PER_100_ML, PARTICLES_PER_CUBIC_CENTIMETER, per_100ml_to_per_cm3),
        ];

        let mut table: HashMap<&'static str, HashMap<&'static str, Conversion>> = HashMap::new();
        for (from, to, conversion) in entries {
            table.entry(from).or_default().insert(to, conversion);
        }
        table
    });

/// Maps the spellings providers use onto the unit names of the conversion table.
pub fn normalize_unit(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let unit = match lowered.as_str() {
        "ug/m3" | "µg/m3" | "μg/m3" | "μg/m³" | "ug/m³" => MICROGRAMS_PER_CUBIC_METER,
        "ng/m3" => NANOGRAMS_PER_CUBIC_METER,
        "deg_c" | "°c" | "celsius" => CELSIUS,
        "deg_f" | "°f" | "fahrenheit" => FAHRENHEIT,
        "particles/cm3" => PARTICLES_PER_CUBIC_CENTIMETER,
        "particles/100 ml" => PARTICLES_PER_100_ML,
        _ => return lowered,
    };
    unit.to_string()
}

/// Conversion from a provider unit into a canonical unit. Pairs with no
/// registered conversion, including unknown provider units, pass values through.
pub fn resolve(provider_unit: &str, canonical_unit: &str) -> Conversion {
    lookup(provider_unit, canonical_unit).unwrap_or(identity)
}

pub fn has_conversion(provider_unit: &str, canonical_unit: &str) -> bool {
    lookup(provider_unit, canonical_unit).is_some()
}

pub fn convert(value: f64, provider_unit: &str, canonical_unit: &str) -> f64 {
    resolve(provider_unit, canonical_unit)(value)
}

fn lookup(provider_unit: &str, canonical_unit: &str) -> Option<Conversion> {
    let from = normalize_unit(provider_unit);
    let to = normalize_unit(canonical_unit);
    CONVERSIONS
        .get(from.as_str())
        .and_then(|targets| targets.get(to.as_str()))
        .copied()
}
