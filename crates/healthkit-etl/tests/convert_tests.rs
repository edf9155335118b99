//! End-to-end tests for the export conversion
//!
//! Each test builds a small export directory (export.xml + workout-routes/)
//! in a temp dir and runs the full pipeline over it.

use std::fs;

use chrono::NaiveDate;
use healthkit_etl::cli::{commands, OutputFormat};
use healthkit_etl::config::PipelineConfig;
use healthkit_etl::models::OutputRow;
use healthkit_etl::pipeline::{run, CancelToken, RunStatus};
use healthkit_etl::storage::{self, ChunkedWriter};
use healthkit_etl::EtlError;
use tempfile::TempDir;

const ROUTE_123: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Apple Health Export" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Route 2024-01-15 8:30am</name><trkseg>
    <trkpt lon="-122.1" lat="37.1"><ele>10.5</ele><time>2024-01-15T14:30:00Z</time></trkpt>
    <trkpt lon="-122.2" lat="37.2"><ele>11.0</ele><time>2024-01-15T14:30:01Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;

fn workout(activity: &str, day: u32, route: Option<&str>) -> String {
    let route = route
        .map(|r| {
            format!(
                r#"<WorkoutRoute sourceName="Apple Watch"><FileReference path="/workout-routes/{}"/></WorkoutRoute>"#,
                r
            )
        })
        .unwrap_or_default();
    format!(
        r#" <Workout workoutActivityType="HKWorkoutActivityType{activity}" duration="45" durationUnit="min" totalDistance="5" totalDistanceUnit="mi" totalEnergyBurned="450" totalEnergyBurnedUnit="kcal" sourceName="Apple Watch" startDate="2024-01-{day:02} 08:30:00 -0600" endDate="2024-01-{day:02} 09:15:00 -0600">{route}</Workout>
"#
    )
}

fn heart_rate(minute: u32, value: &str) -> String {
    format!(
        r#" <Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Apple Watch" unit="count/min" startDate="2024-01-15 08:{minute:02}:00 -0600" endDate="2024-01-15 08:{minute:02}:00 -0600" value="{value}"/>
"#
    )
}

fn document(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<HealthData locale=\"en_US\">\n <ExportDate value=\"2024-02-01 10:00:00 -0600\"/>\n{}</HealthData>\n",
        body
    )
}

/// Lay out an export directory and return a config pointing into it
fn export_dir(temp: &TempDir, body: &str, routes: &[(&str, &str)]) -> PipelineConfig {
    let root = temp.path().join("apple_health_export");
    let route_dir = root.join("workout-routes");
    fs::create_dir_all(&route_dir).unwrap();
    fs::write(root.join("export.xml"), document(body)).unwrap();
    for (name, contents) in routes {
        fs::write(route_dir.join(name), contents).unwrap();
    }
    PipelineConfig::new(root.join("export.xml"))
        .with_output(temp.path().join("out").join("health.parquet"))
}

#[test]
fn test_workout_gets_first_trackpoint_of_its_route() {
    let temp = TempDir::new().unwrap();
    let config = export_dir(
        &temp,
        &workout("Running", 15, Some("route_123.gpx")),
        &[("route_123.gpx", ROUTE_123)],
    );

    let summary = run(&config, &CancelToken::new()).unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.routes.resolved, 1);

    let rows = storage::read_rows(&config.output_path).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.row_type, "WorkoutRunning");
    assert_eq!(row.start_lat, Some(37.1));
    assert_eq!(row.start_lon, Some(-122.1));
    assert_eq!(row.duration_min, Some(45.0));
    assert!((row.distance_km.unwrap() - 8.04672).abs() < 1e-9);
    assert_eq!(row.energy_kcal, Some(450.0));
}

#[test]
fn test_missing_route_file_leaves_coordinates_null() {
    let temp = TempDir::new().unwrap();
    let config = export_dir(
        &temp,
        &workout("Running", 15, Some("route_999.gpx")),
        &[("route_123.gpx", ROUTE_123)],
    );

    let summary = run(&config, &CancelToken::new()).unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.parse.unresolved_routes, 1);
    assert_eq!(summary.parse.skipped, 0);
    assert_eq!(summary.parse.workouts_without_coordinates, 1);

    let rows = storage::read_rows(&config.output_path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].start_lat, None);
    assert_eq!(rows[0].start_lon, None);
}

#[test]
fn test_route_reference_shapes_resolve_through_fallbacks() {
    let temp = TempDir::new().unwrap();
    let body = [
        // Extension missing from the reference
        workout("Walking", 10, Some("route_2024-01-10_8.30am")),
        // Reference is a fragment of the real file name
        workout("Cycling", 11, Some("2024-01-11_8.30am")),
        // Two files contain the fragment: nothing is guessed
        workout("Hiking", 12, Some("2024-01-12")),
        // No route at all
        workout("Yoga", 13, None),
    ]
    .concat();
    let config = export_dir(
        &temp,
        &body,
        &[
            ("route_2024-01-10_8.30am.gpx", ROUTE_123),
            ("route_2024-01-11_8.30am.gpx", ROUTE_123),
            ("route_2024-01-12_7.00am.gpx", ROUTE_123),
            ("route_2024-01-12_6.00pm.gpx", ROUTE_123),
        ],
    );

    let summary = run(&config, &CancelToken::new()).unwrap();
    assert_eq!(summary.routes.resolved, 2);
    assert_eq!(summary.routes.ambiguous, 1);

    let rows = storage::read_rows(&config.output_path).unwrap();
    let coords: Vec<(String, Option<f64>)> = rows
        .iter()
        .map(|r| (r.row_type.clone(), r.start_lat))
        .collect();
    assert_eq!(
        coords,
        vec![
            ("WorkoutWalking".to_string(), Some(37.1)),
            ("WorkoutCycling".to_string(), Some(37.1)),
            ("WorkoutHiking".to_string(), None),
            ("WorkoutYoga".to_string(), None),
        ]
    );
}

#[test]
fn test_row_count_invariant() {
    let temp = TempDir::new().unwrap();
    let mut body = String::new();
    for minute in 0..20 {
        // Every fifth value is not a number
        let value = if minute % 5 == 0 { "n/a".to_string() } else { format!("{}", 60 + minute) };
        body.push_str(&heart_rate(minute, &value));
    }
    body.push_str(r#" <Record type="HKQuantityTypeIdentifierStepCount" sourceName="Phone" value="10"/>
"#);
    body.push_str(&workout("Running", 15, None));
    body.push_str(r#" <ActivitySummary dateComponents="2024-01-15" activeEnergyBurned="500"/>
"#);
    let config = export_dir(&temp, &body, &[]);

    let summary = run(&config, &CancelToken::new()).unwrap();
    let p = &summary.parse;
    assert_eq!(p.records_seen + p.workouts_seen, 22);
    assert_eq!(p.skipped, 5);
    assert_eq!(summary.rows_written + p.skipped, 22);
    assert_eq!(p.ignored, 2);
    assert_eq!(
        storage::count_rows(&config.output_path).unwrap(),
        summary.rows_written
    );
}

#[test]
fn test_two_runs_produce_identical_bytes() {
    let temp = TempDir::new().unwrap();
    let mut body = String::new();
    for minute in 0..30 {
        body.push_str(&heart_rate(minute, &format!("{}", 60 + minute)));
    }
    body.push_str(&workout("Running", 15, Some("route_123.gpx")));
    let config = export_dir(&temp, &body, &[("route_123.gpx", ROUTE_123)]).with_batch_size(7);

    run(&config, &CancelToken::new()).unwrap();
    let first = fs::read(&config.output_path).unwrap();
    fs::remove_file(&config.output_path).unwrap();

    run(&config, &CancelToken::new()).unwrap();
    let second = fs::read(&config.output_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_small_batches_merge_in_source_order() {
    let temp = TempDir::new().unwrap();
    let mut body = String::new();
    for minute in 0..25 {
        body.push_str(&heart_rate(minute, &format!("{}", minute)));
    }
    let config = export_dir(&temp, &body, &[]).with_batch_size(4);

    let summary = run(&config, &CancelToken::new()).unwrap();
    assert_eq!(summary.segments, 7);
    assert!(!config.segment_dir().exists());

    let values: Vec<f64> = storage::read_rows(&config.output_path)
        .unwrap()
        .iter()
        .map(|r| r.value.unwrap())
        .collect();
    assert_eq!(values, (0..25).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn test_malformed_root_produces_no_output() {
    let temp = TempDir::new().unwrap();
    let export = temp.path().join("export.xml");
    fs::write(&export, "<NotHealthData><Record/></NotHealthData>").unwrap();
    let config = PipelineConfig::new(&export).with_output(temp.path().join("health.parquet"));

    let err = run(&config, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, EtlError::MalformedDocument { element: 0, .. }));
    assert!(!config.output_path.exists());
    assert!(!config.segment_dir().exists());
}

#[test]
fn test_truncated_document_is_fatal_and_keeps_written_segments() {
    let temp = TempDir::new().unwrap();
    let mut body = String::new();
    for minute in 0..6 {
        body.push_str(&heart_rate(minute, "70"));
    }
    let config = export_dir(&temp, &body, &[]).with_batch_size(2);
    let truncated = document(&body).replace("</HealthData>\n", "<Record type=");
    fs::write(&config.export_path, truncated).unwrap();

    let err = run(&config, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, EtlError::MalformedDocument { .. }));
    assert!(!config.output_path.exists());
    assert_eq!(storage::list_segments(&config.segment_dir()).unwrap().len(), 3);
}

#[test]
fn test_stale_segments_block_a_new_run_until_merged() {
    let temp = TempDir::new().unwrap();
    let config = export_dir(&temp, &heart_rate(1, "70"), &[]);

    // Leave segments behind the way an interrupted run does
    let mut writer = ChunkedWriter::create(&config.output_path, 1).unwrap();
    writer.push(leftover_row()).unwrap();
    writer.abandon().unwrap();

    let err = run(&config, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, EtlError::StaleSegments(_)));

    let outcome =
        storage::merge_segments(&config.segment_dir(), &config.output_path, 10).unwrap();
    assert_eq!(outcome.segments, 1);
    assert_eq!(storage::count_rows(&config.output_path).unwrap(), 1);

    fs::remove_file(&config.output_path).unwrap();
    assert!(run(&config, &CancelToken::new()).unwrap().is_complete());
}

#[test]
fn test_cancel_before_any_rows_leaves_no_segments() {
    let temp = TempDir::new().unwrap();
    let config = export_dir(&temp, &heart_rate(1, "70"), &[]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = run(&config, &cancel).unwrap();
    assert_eq!(summary.status, RunStatus::Interrupted);
    assert!(!config.output_path.exists());
    assert_eq!(summary.segment_dir, None);
    assert!(!config.segment_dir().exists());

    // Nothing was flushed, so the next run may start straight away
    assert!(run(&config, &CancelToken::new()).unwrap().is_complete());
}

#[test]
fn test_custom_route_dir_and_single_strategy() {
    let temp = TempDir::new().unwrap();
    let elsewhere = temp.path().join("routes-copy");
    fs::create_dir_all(&elsewhere).unwrap();
    fs::write(elsewhere.join("route_123.gpx"), ROUTE_123).unwrap();

    let config = export_dir(&temp, &workout("Running", 15, Some("route_123")), &[])
        .with_route_dir(&elsewhere)
        .with_strategies(vec![healthkit_etl::routes::MatchStrategyKind::Exact]);

    let summary = run(&config, &CancelToken::new()).unwrap();
    assert_eq!(summary.route_files, 1);
    // Exact matching alone cannot pair a reference without its extension
    assert_eq!(summary.routes.not_found, 1);
}

#[tokio::test]
async fn test_convert_command_runs_off_the_async_runtime() {
    let temp = TempDir::new().unwrap();
    let config = export_dir(
        &temp,
        &workout("Running", 15, Some("route_123.gpx")),
        &[("route_123.gpx", ROUTE_123)],
    );

    commands::convert(config.clone(), OutputFormat::Json)
        .await
        .unwrap();
    assert_eq!(storage::count_rows(&config.output_path).unwrap(), 1);

    // A second run into the same, now populated, destination still succeeds
    commands::convert(config.clone(), OutputFormat::Table)
        .await
        .unwrap();
}

fn leftover_row() -> OutputRow {
    let t = NaiveDate::from_ymd_opt(2024, 1, 14)
        .unwrap()
        .and_hms_opt(23, 59, 0)
        .unwrap();
    OutputRow {
        row_type: "HeartRate".to_string(),
        value: Some(64.0),
        value_category: None,
        unit: Some("count/min".to_string()),
        start_date: t,
        end_date: t,
        duration_min: None,
        distance_km: None,
        energy_kcal: None,
        source_name: "Apple Watch".to_string(),
        start_lat: None,
        start_lon: None,
    }
}
