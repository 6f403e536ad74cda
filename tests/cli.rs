use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn build_scene() -> NamedTempFile {
    let scene = r#"<scene>
  <object>
    <name>Camera</name>
    <type>camera</type>
    <position>0 -10 4</position>
  </object>
  <object>
    <name>Lamp</name>
    <type>light</type>
    <position>0 0 5</position>
    <attenuation>1 0 0</attenuation>
  </object>
  <object>
    <name>Ground</name>
    <type>mesh</type>
  </object>
</scene>
"#;

    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn cli_prints_summary_and_probe_report() {
    let scene = build_scene();
    let mut cmd = Command::cargo_bin("umbra-runtime").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 objects (1 lights)"))
        .stdout(contains(" - Camera (camera)"))
        .stdout(contains(" - Lamp (light)"))
        .stdout(contains(" - Ground (mesh)"))
        .stdout(contains("Shadow probes (sampler=pcf, near=1.0, far=500.0):"))
        .stdout(contains(" - lit"))
        .stdout(contains(" - occluded"));
}

#[test]
fn cli_accepts_sampler_and_frustum_overrides() {
    let scene = build_scene();
    let mut cmd = Command::cargo_bin("umbra-runtime").expect("binary exists");
    cmd.arg(scene.path())
        .arg("--summary-only")
        .arg("--sampler")
        .arg("nearest")
        .arg("--shadow-near")
        .arg("5")
        .arg("--shadow-far")
        .arg("100");
    cmd.assert()
        .success()
        .stdout(contains("Shadow probes (sampler=nearest, near=5.0, far=100.0):"));
}

#[test]
fn cli_rejects_unknown_sampler() {
    let scene = build_scene();
    let mut cmd = Command::cargo_bin("umbra-runtime").expect("binary exists");
    cmd.arg(scene.path())
        .arg("--summary-only")
        .arg("--sampler")
        .arg("gaussian");
    cmd.assert().failure().stderr(contains("gaussian"));
}

#[test]
fn cli_requires_a_scene_path() {
    let mut cmd = Command::cargo_bin("umbra-runtime").expect("binary exists");
    cmd.assert().failure().stderr(contains("Usage:"));
}
