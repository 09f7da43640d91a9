use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_case(dir: &Path) -> PathBuf {
    let path = dir.join("case6ww.json");
    Command::cargo_bin("volt")
        .unwrap()
        .args(["case6ww", "--out", path.to_str().unwrap()])
        .assert()
        .success();
    path
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn volt_case6ww_prints_network() {
    Command::cargo_bin("volt")
        .unwrap()
        .arg("case6ww")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"base_mva\": 100.0"))
        .stdout(predicate::str::contains("Line 5-6"));
}

#[test]
fn volt_pf_dc_runs() {
    let tmp = tempdir().unwrap();
    let case = write_case(tmp.path());
    let solved = tmp.path().join("solved.json");

    let result = stdout_json(Command::cargo_bin("volt").unwrap().args([
        "pf",
        "dc",
        case.to_str().unwrap(),
        "--solver",
        "gauss",
        "-o",
        solved.to_str().unwrap(),
    ]));
    assert_eq!(result["slack_bus"], 1);
    let flow = result["branch_flow_mw"][2].as_f64().unwrap();
    assert!((flow - 33.1045).abs() < 1e-3, "flow {}", flow);

    let network: Value = serde_json::from_str(&fs::read_to_string(&solved).unwrap()).unwrap();
    let angle = network["buses"][5]["angle"].as_f64().unwrap();
    assert!((angle + 5.7418).abs() < 1e-3, "angle {}", angle);
}

#[test]
fn volt_opf_dc_runs() {
    let tmp = tempdir().unwrap();
    let case = write_case(tmp.path());

    let result = stdout_json(
        Command::cargo_bin("volt")
            .unwrap()
            .args(["opf", case.to_str().unwrap()]),
    );
    assert_eq!(result["method"], "dc");
    assert_eq!(result["status"]["converged"], true);
    let objective = result["objective"].as_f64().unwrap();
    assert!((objective - 3046.4125).abs() < 1e-2, "objective {}", objective);
    let total: f64 = result["generators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["p_mw"].as_f64().unwrap())
        .sum();
    assert!((total - 210.0).abs() < 1e-4);
}

#[test]
fn volt_opf_ac_from_config() {
    let tmp = tempdir().unwrap();
    let case = write_case(tmp.path());
    let config = tmp.path().join("opf.toml");
    fs::write(&config, "method = \"ac\"\n\n[pips]\nmax_iterations = 100\n").unwrap();
    let solved = tmp.path().join("solved.json");

    let result = stdout_json(Command::cargo_bin("volt").unwrap().args([
        "opf",
        case.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--out",
        solved.to_str().unwrap(),
    ]));
    assert_eq!(result["method"], "ac");
    assert_eq!(result["status"]["converged"], true);
    assert!(result["objective"].as_f64().unwrap() > 3046.4125);
    assert!(solved.exists());
}

#[test]
fn volt_opf_reports_missing_file() {
    let tmp = tempdir().unwrap();
    Command::cargo_bin("volt")
        .unwrap()
        .args(["opf", tmp.path().join("missing.json").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading network"));
}

#[test]
fn volt_opf_rejects_unknown_method() {
    Command::cargo_bin("volt")
        .unwrap()
        .args(["opf", "case.json", "--method", "socp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown OPF method"));
}
