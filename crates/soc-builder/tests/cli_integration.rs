//! Integration tests for the socgen CLI.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow as _;
use clap as _;
use env_logger as _;
use log as _;
use serde as _;
use soc_builder as _;
use soc_core as _;

fn socgen() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_socgen"));
    command.env("RUST_LOG", "warn");
    command
}

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("board.toml");
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn build_writes_artifacts_for_default_board() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let out = temp_dir.path().join("generated");

    let output = socgen()
        .args(["build", "--out"])
        .arg(&out)
        .output()
        .expect("run socgen");
    assert!(output.status.success(), "{output:?}");

    for name in ["regions.ld", "mem.h", "soc.h", "csr.csv", "memory_map.json"] {
        assert!(out.join(name).is_file(), "{name} missing");
    }
    let soc_h = fs::read_to_string(out.join("soc.h")).expect("soc.h");
    assert!(soc_h.contains("#define CONFIG_CPU_RESET_ADDR 0x20028000"));
}

#[test]
fn show_json_reflects_config_override() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        temp_dir.path(),
        "gateware-size = 0x30000\n[cpu]\nname = \"vexriscv\"\n",
    );

    let output = socgen()
        .args(["show", "--json", "--config"])
        .arg(&config)
        .output()
        .expect("run socgen");
    assert!(output.status.success(), "{output:?}");

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is json");
    assert_eq!(value["regions"][1]["name"], "rom");
    assert_eq!(value["regions"][1]["base"], 0x2003_0000_u32);
    assert_eq!(value["masters"][1], "vexriscv");
}

#[test]
fn overlapping_config_fails_with_both_region_names() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp_dir.path(), "[csr]\nbase = 0x40001000\n");

    let output = socgen()
        .args(["build", "--config"])
        .arg(&config)
        .arg("--out")
        .arg(temp_dir.path().join("out"))
        .output()
        .expect("run socgen");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'csr'"), "{stderr}");
    assert!(stderr.contains("'main_ram'"), "{stderr}");
    assert!(!temp_dir.path().join("out").exists());
}

#[test]
fn reset_trace_prints_release_edge() {
    let output = socgen()
        .args(["reset-trace", "--edges", "5000"])
        .output()
        .expect("run socgen");
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("system reset asserted"));
    assert_eq!(lines[1], "edge     4095: system reset released");
}

#[test]
fn missing_config_file_is_an_error() {
    let output = socgen()
        .args(["show", "--config", "/nonexistent/board.toml"])
        .output()
        .expect("run socgen");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("board.toml"), "{stderr}");
}
