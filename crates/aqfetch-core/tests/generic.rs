use aqfetch_core::generic::{ClientKeys, GenericClient, IngestFiles, MeasurementLayout};
use aqfetch_core::measurand::{ParameterLookup, ProviderParameter};
use aqfetch_core::measures::format_timestamp;
use aqfetch_files::{parse_rows, Row};

fn fixture(name: &str) -> Vec<Row> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);
    let content = std::fs::read_to_string(path).expect("read fixture");
    parse_rows(&content).expect("parse fixture")
}

fn lookup() -> ParameterLookup {
    [
        ("co", ProviderParameter::new("co", "ppb")),
        ("wd", ProviderParameter::new("wind_direction", "deg")),
        ("ws", ProviderParameter::new("wind_speed", "m/s")),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

fn client() -> GenericClient {
    GenericClient::new("testing", lookup(), ClientKeys::default())
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn processes_locations_sensors_and_wide_measurements() {
    let mut client = client();
    client.process(&IngestFiles {
        locations: Some(fixture("locations.csv")),
        sensors: Some(fixture("sensors.csv")),
        measurements: Some(fixture("measurements_wide.csv")),
    });

    assert_eq!(client.locations().len(), 2);
    assert_eq!(client.measures().len(), 2);
    assert_eq!(client.skipped_rows(), 0);

    let first = &client.measures().as_slice()[0];
    assert_eq!(first.sensor_id(), "testing-test_site_1-co");
    assert_close(first.value(), 0.5);
    assert_eq!(format_timestamp(&first.timestamp()), "2024-01-01T00:00:00Z");

    let second = &client.measures().as_slice()[1];
    assert_eq!(second.sensor_id(), "testing-test_site_1-wind_direction");
    assert_close(second.value(), 180.0);
}

#[test]
fn builds_the_location_tree_from_sensor_rows() {
    let mut client = client();
    client.process(&IngestFiles {
        locations: Some(fixture("locations.csv")),
        sensors: Some(fixture("sensors.csv")),
        measurements: Some(fixture("measurements_wide.csv")),
    });

    let site1 = client
        .locations()
        .get("testing-test_site_1")
        .expect("site 1");
    assert_eq!(site1.label.as_deref(), Some("First site"));
    assert_eq!(site1.lat, Some(40.1));
    assert_eq!(site1.lon, Some(-105.2));
    assert_eq!(
        site1.systems.keys().collect::<Vec<_>>(),
        [
            "testing-test_site_1-acme::sniffer",
            "testing-test_site_1-breeze"
        ]
    );
    assert_eq!(site1.sensor_count(), 2);

    let acme = site1
        .systems
        .get("testing-test_site_1-acme::sniffer")
        .expect("acme system");
    assert_eq!(acme.manufacturer_name.as_deref(), Some("Acme"));
    let co = acme.sensors.get("testing-test_site_1-co").expect("co sensor");
    assert_eq!(co.parameter, "co");
    assert_eq!(co.units, "ppm");
    assert_eq!(co.interval_seconds, Some(60));

    let site2 = client
        .locations()
        .get("testing-test_site_2")
        .expect("site 2");
    let default = site2
        .systems
        .get("testing-test_site_2-default")
        .expect("default system");
    assert_eq!(
        default.sensors.keys().collect::<Vec<_>>(),
        ["testing-test_site_2-co", "testing-test_site_2-wind_speed"]
    );
}

#[test]
fn long_measurements_skip_bad_rows_and_keep_the_rest() {
    let mut client = client();
    let rows = fixture("measurements_long.csv");
    assert_eq!(client.layout_of(&rows), Some(MeasurementLayout::Long));

    client.process_measurements(&rows);

    let measures = client.measures().as_slice();
    assert_eq!(measures.len(), 2);
    assert_eq!(measures[0].sensor_id(), "testing-test_site_2-co");
    assert_close(measures[0].value(), 1.2);
    assert_eq!(measures[1].sensor_id(), "testing-test_site_3-co");
    assert_close(measures[1].value(), 0.25);

    // unsupported parameter and unparseable value
    assert_eq!(client.skipped_rows(), 2);

    assert_eq!(
        client.locations().keys().collect::<Vec<_>>(),
        ["testing-test_site_2", "testing-test_site_3"]
    );
    let site3 = client
        .locations()
        .get("testing-test_site_3")
        .expect("site 3");
    assert_eq!(site3.lat, Some(40.3));
    assert!(site3.has_sensor("testing-test_site_3-co"));
    assert!(site3.systems.contains_key("testing-test_site_3-default"));
}

#[test]
fn json_measurements_are_wide_and_skip_nulls() {
    let mut client = client();
    let rows = fixture("measurements.json");
    assert_eq!(client.layout_of(&rows), Some(MeasurementLayout::Wide));

    client.process_measurements(&rows);

    let ids: Vec<&str> = client.measures().iter().map(|m| m.sensor_id()).collect();
    assert_eq!(
        ids,
        [
            "testing-test_site_2-co",
            "testing-test_site_2-wind_speed",
            "testing-test_site_2-wind_speed"
        ]
    );
    assert_close(client.measures().as_slice()[0].value(), 2.0);
    assert_eq!(
        client.measures().from().map(|t| format_timestamp(&t)).as_deref(),
        Some("2024-01-02T00:00:00Z")
    );
    assert_eq!(
        client.measures().to().map(|t| format_timestamp(&t)).as_deref(),
        Some("2024-01-02T01:00:00Z")
    );
}

#[test]
fn location_rows_without_coordinates_are_dropped() {
    let mut client = client();
    let rows: Vec<Row> = vec![
        [("location", "no coords"), ("label", "Nowhere")]
            .into_iter()
            .collect(),
        [("location", "half"), ("lat", "10.0")].into_iter().collect(),
    ];
    client.process_locations(&rows);

    assert!(client.locations().is_empty());
    assert_eq!(client.skipped_rows(), 2);
}

#[test]
fn data_document_has_meta_locations_and_measures() {
    let mut client = client();
    client.process(&IngestFiles {
        locations: Some(fixture("locations.csv")),
        sensors: None,
        measurements: Some(fixture("measurements_wide.csv")),
    });

    let json = serde_json::to_value(client.data()).expect("serialize");
    assert_eq!(json["meta"]["schema"], "v0.1");
    assert_eq!(json["meta"]["source"], "testing");
    assert_eq!(json["meta"]["matching_method"], "ingest-id");
    assert_eq!(json["locations"][0]["location"], "testing-test_site_1");
    assert_eq!(
        json["locations"][0]["systems"][0]["system_id"],
        "testing-test_site_1-default"
    );
    assert_eq!(json["measures"][0]["sensor_id"], "testing-test_site_1-co");
    assert_eq!(json["measures"][0]["timestamp"], "2024-01-01T00:00:00Z");
    assert_eq!(json["measures"].as_array().map(Vec::len), Some(2));
}

#[test]
fn custom_keys_and_timezone() {
    let keys = ClientKeys {
        location_key: "site".to_string(),
        datetime_key: "time".to_string(),
        ..ClientKeys::default()
    };
    let mut client = GenericClient::new("testing", lookup(), keys)
        .with_timezone(chrono_tz::America::Denver);

    let rows: Vec<Row> = vec![[("site", "Alpha"), ("time", "2024-01-01 05:00:00"), ("co", "100")]
        .into_iter()
        .collect()];
    client.process_measurements(&rows);

    let measure = &client.measures().as_slice()[0];
    assert_eq!(measure.sensor_id(), "testing-alpha-co");
    assert_eq!(format_timestamp(&measure.timestamp()), "2024-01-01T12:00:00Z");
}

#[test]
fn non_finite_readings_are_skipped_not_stored() {
    let mut client = client();
    let rows: Vec<Row> = vec![
        [("location", "a"), ("datetime", "2024-01-01T00:00:00Z"), ("co", "inf")]
            .into_iter()
            .collect(),
        [("location", "a"), ("datetime", "2024-01-01T01:00:00Z"), ("co", "1e400")]
            .into_iter()
            .collect(),
        [("location", "a"), ("datetime", "2024-01-01T02:00:00Z"), ("co", "400")]
            .into_iter()
            .collect(),
    ];
    client.process_measurements(&rows);

    assert_eq!(client.skipped_rows(), 2);
    assert_eq!(client.measures().len(), 1);
    let measure = &client.measures().as_slice()[0];
    assert_eq!(measure.sensor_id(), "testing-a-co");
    assert_eq!(format_timestamp(&measure.timestamp()), "2024-01-01T02:00:00Z");
    assert!(client.measures().iter().all(|m| m.value().is_finite()));
}

#[test]
fn oversized_sensor_intervals_are_rejected() {
    let mut client = client();
    let rows: Vec<Row> = vec![
        [("location", "a"), ("parameter", "co"), ("interval_seconds", "1e12")]
            .into_iter()
            .collect(),
        [("location", "a"), ("parameter", "ws"), ("interval_seconds", "4294967295")]
            .into_iter()
            .collect(),
    ];
    client.process_sensors(&rows);

    assert_eq!(client.skipped_rows(), 1);
    let site = client.locations().get("testing-a").expect("site a");
    assert!(!site.has_sensor("testing-a-co"));
    let ws = site
        .systems
        .get("testing-a-default")
        .and_then(|system| system.sensors.get("testing-a-wind_speed"))
        .expect("wind speed sensor");
    assert_eq!(ws.interval_seconds, Some(u32::MAX));
}
