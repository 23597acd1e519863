//! Integration tests for the command line interface.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with an isolated config directory.
fn oro(config_home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("oro");
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("ORO_MODEL")
        .env_remove("ORO_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_detection_options() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--tile-size"))
        .stdout(predicate::str::contains("--regions"))
        .stdout(predicate::str::contains("--target-crs"));
}

#[test]
fn test_no_inputs_prints_first_time_help() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("oro config init"));
}

#[test]
fn test_config_path_is_under_config_home() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains("oro"));
}

#[test]
fn test_config_init_then_show() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    oro(&home)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    oro(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tile_size = 512"))
        .stdout(predicate::str::contains("EPSG:4326"));
}

#[test]
fn test_config_path_env_override() {
    let home = TempDir::new().unwrap();
    let custom = home.path().join("site").join("oro.toml");

    oro(&home)
        .env("ORO_CONFIG", &custom)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(custom.exists());

    oro(&home)
        .env("ORO_CONFIG", &custom)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("oro.toml"));
}

#[test]
fn test_models_list_empty() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No models configured."));
}

#[test]
fn test_models_add_requires_existing_files() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .args([
            "models",
            "add",
            "vessels",
            "--path",
            "/nonexistent/vessels.onnx",
            "--labels",
            "/nonexistent/vessels.txt",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("model file does not exist"));
}

#[test]
fn test_models_add_then_list() {
    let home = TempDir::new().unwrap();
    let model = home.path().join("vessels.onnx");
    let labels = home.path().join("vessels.txt");
    std::fs::write(&model, b"not really onnx").unwrap();
    std::fs::write(&labels, "ship\nbarge\n").unwrap();

    oro(&home)
        .args(["models", "add", "vessels", "--type", "yolo-obb", "--default"])
        .arg("--path")
        .arg(&model)
        .arg("--labels")
        .arg(&labels)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added model 'vessels' (yolo-obb)"));

    oro(&home)
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vessels (yolo-obb) [default]"));
}

#[test]
fn test_detect_without_model_fails() {
    let home = TempDir::new().unwrap();
    let image = home.path().join("scene.tif");
    std::fs::write(&image, b"").unwrap();

    oro(&home)
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no model selected"));
}

#[test]
fn test_rejects_confidence_out_of_range() {
    let home = TempDir::new().unwrap();
    oro(&home)
        .args(["scene.tif", "-c", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("confidence must be between"));
}

#[test]
fn test_rejects_overlap_not_smaller_than_tile() {
    let home = TempDir::new().unwrap();
    let model = home.path().join("vessels.onnx");
    let labels = home.path().join("vessels.txt");
    std::fs::write(&model, b"").unwrap();
    std::fs::write(&labels, "ship\n").unwrap();
    oro(&home)
        .args(["models", "add", "vessels", "--default"])
        .arg("--path")
        .arg(&model)
        .arg("--labels")
        .arg(&labels)
        .assert()
        .success();

    let image = home.path().join("scene.tif");
    std::fs::write(&image, b"").unwrap();
    oro(&home)
        .arg(&image)
        .args(["--tile-size", "256", "--overlap", "256"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be smaller than tile_size"));
}
