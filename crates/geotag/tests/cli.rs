use std::fs;
use std::path::Path;

use assert_cmd::Command;
use geotag::core::{bearing_towards, pixel_from_bearing};
use nalgebra::{Point2, Vector2};
use predicates::prelude::*;
use tempfile::TempDir;

const TARGET: (f64, f64) = (120_000.0, 487_000.0);
const PANOS: [(&str, f64, f64); 3] = [
    ("pano_a", 0.0, 12.5),
    ("pano_b", 3.0, 12.0),
    ("pano_c", -1.8, 12.2),
];

fn target() -> Point2<f64> {
    Point2::new(TARGET.0, TARGET.1)
}

fn camera(dx: f64, dy: f64) -> Point2<f64> {
    target() + Vector2::new(dx, dy)
}

fn column(dx: f64, dy: f64) -> f64 {
    pixel_from_bearing(bearing_towards(camera(dx, dy), target()), 2000.0)
}

fn write_cameras(dir: &Path) -> std::path::PathBuf {
    let entries: Vec<String> = PANOS
        .iter()
        .map(|&(id, dx, dy)| {
            let c = camera(dx, dy);
            format!(r#""{id}": {{"x": {:.6}, "y": {:.6}}}"#, c.x, c.y)
        })
        .collect();
    let path = dir.join("cameras.json");
    fs::write(&path, format!("{{{}}}", entries.join(","))).unwrap();
    path
}

fn write_coco(dir: &Path, name: &str) -> std::path::PathBuf {
    let entries: Vec<String> = PANOS
        .iter()
        .map(|&(id, dx, dy)| {
            let x = column(dx, dy) - 20.0;
            format!(
                r#"{{"image_id": "{id}.jpg", "category_id": 1, "score": 0.9,
                    "bbox": [{x:.6}, 500.0, 40.0, 150.0],
                    "segmentation": {{"size": [1000, 2000], "counts": ""}}}}"#
            )
        })
        .collect();
    let path = dir.join(name);
    fs::write(&path, format!("[{}]", entries.join(","))).unwrap();
    path
}

fn write_center_csv(dir: &Path, name: &str) -> std::path::PathBuf {
    let mut text = String::from("pano_id,center_x\n");
    for &(id, dx, dy) in &PANOS {
        text.push_str(&format!("{id},{:.6}\n", column(dx, dy)));
    }
    text.push_str("broken row without a center\n");
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn geotag() -> Command {
    Command::cargo_bin("geotag").expect("binary builds")
}

#[test]
fn default_config_prints_every_parameter() {
    geotag()
        .arg("default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_dst_cam_object\": 15.0"))
        .stdout(predicate::str::contains("\"icm_iterations\": 15"))
        .stdout(predicate::str::contains("\"kind\": \"rijks_driehoek\""));
}

#[test]
fn run_writes_one_located_object() {
    let dir = TempDir::new().unwrap();
    let cameras = write_cameras(dir.path());
    let detections = write_coco(dir.path(), "coco.json");
    let output = dir.path().join("objects.csv");
    let report = dir.path().join("report.json");

    geotag()
        .args(["--log-level", "warn", "run", "--seed", "42"])
        .arg("--detections")
        .arg(&detections)
        .arg("--cameras")
        .arg(&cameras)
        .arg("--output")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success();

    let csv = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "lat,lon,score");
    assert_eq!(lines.len(), 2);
    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields[2], "3");
    let lat: f64 = fields[0].parse().unwrap();
    let lon: f64 = fields[1].parse().unwrap();
    approx::assert_abs_diff_eq!(lat, 52.3696, epsilon = 0.01);
    approx::assert_abs_diff_eq!(lon, 4.8734, epsilon = 0.01);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["detections"], 3);
    assert_eq!(report["seed"], 42);
    assert!(report["error"].is_null());
}

#[test]
fn unknown_panorama_fails_and_is_reported() {
    let dir = TempDir::new().unwrap();
    let cameras = dir.path().join("cameras.json");
    fs::write(&cameras, r#"{"pano_a": {"x": 120000.0, "y": 487012.5}}"#).unwrap();
    let detections = write_coco(dir.path(), "coco.json");
    let report = dir.path().join("report.json");

    geotag()
        .arg("run")
        .arg("--detections")
        .arg(&detections)
        .arg("--cameras")
        .arg(&cameras)
        .arg("--output")
        .arg(dir.path().join("objects.csv"))
        .arg("--report")
        .arg(&report)
        .assert()
        .failure()
        .stderr(predicate::str::contains("pano_b"));

    let text = fs::read_to_string(&report).unwrap();
    assert!(text.contains("camera lookup failed"));
}

#[test]
fn run_without_cameras_is_a_usage_error() {
    geotag()
        .args(["run", "--detections", "nowhere.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--cameras"));
}

#[test]
fn batch_handles_coco_and_csv_inputs() {
    let dir = TempDir::new().unwrap();
    let cameras = write_cameras(dir.path());
    let inputs = dir.path().join("inputs");
    fs::create_dir(&inputs).unwrap();
    write_coco(&inputs, "first.json");
    write_center_csv(&inputs, "second.csv");
    let outputs = dir.path().join("outputs");

    geotag()
        .args(["--log-level", "off", "batch", "--seed", "1"])
        .arg("--input-dir")
        .arg(&inputs)
        .arg("--output-dir")
        .arg(&outputs)
        .arg("--cameras")
        .arg(&cameras)
        .assert()
        .success()
        .stdout(predicate::str::contains("first.json\t1"))
        .stdout(predicate::str::contains("second.csv\t1"));

    for name in ["first_locations.csv", "second_locations.csv"] {
        let csv = fs::read_to_string(outputs.join(name)).unwrap();
        assert!(csv.starts_with("lat,lon,score\n"));
        assert!(csv.trim_end().ends_with(",3"));
    }
}

#[test]
fn config_file_drives_a_run() {
    let dir = TempDir::new().unwrap();
    let cameras = write_cameras(dir.path());
    let detections = write_coco(dir.path(), "coco.json");
    let output = dir.path().join("from_config.csv");
    let config = dir.path().join("run.json");
    fs::write(
        &config,
        format!(
            r#"{{"detections_path": {:?}, "cameras_path": {:?}, "output_path": {:?},
                "params": {{"seed": 9, "linkage": "average"}}}}"#,
            detections.to_string_lossy(),
            cameras.to_string_lossy(),
            output.to_string_lossy()
        ),
    )
    .unwrap();

    geotag()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();
    assert!(fs::read_to_string(&output).unwrap().contains(",3"));
}

#[cfg(feature = "tracing")]
#[test]
fn json_logs_carry_the_locate_span() {
    let dir = TempDir::new().unwrap();
    let cameras = write_cameras(dir.path());
    let detections = write_coco(dir.path(), "coco.json");

    geotag()
        .args(["--json-logs", "run", "--seed", "5"])
        .arg("--detections")
        .arg(&detections)
        .arg("--cameras")
        .arg(&cameras)
        .arg("--output")
        .arg(dir.path().join("objects.csv"))
        .assert()
        .success()
        .stdout(predicate::str::contains("locate_file"));
}
