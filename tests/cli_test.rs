//! Integration tests for the kiln binary
//!
//! Only commands that do not need a container runtime are exercised here.

mod common;

use common::{fingerprint_of, TestProject};
use kiln::core::model::Fingerprint;
use kiln::infra::artifact_cache::{ArtifactCache, FsArtifactCache};
use std::path::Path;
use std::process::{Command, Output};

/// Run kiln with isolated cache and config directories
fn run_kiln(project: &TestProject, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
    cmd.current_dir(project.path())
        .env("KILN_CACHE_DIR", project.path().join("kiln-cache"))
        .env("KILN_CONFIG_DIR", project.path().join("kiln-config"))
        .env_remove("KILN_COMPILED_DIR")
        .env_remove("RUST_LOG");
    cmd.args(args);
    cmd.output().expect("Failed to execute kiln")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn store(project: &TestProject, cache_dir: &Path, fingerprint: &str) {
    let out = project.path().join(format!("out-{fingerprint}"));
    std::fs::create_dir_all(&out).unwrap();
    FsArtifactCache::new(cache_dir)
        .persist(&Fingerprint::new(fingerprint), &out)
        .unwrap();
}

#[test]
fn test_levels_in_dependency_order() {
    let project = TestProject::new();
    project.write_release("consul", &["consul>go-1.4,ruby", "go-1.4", "ruby"]);

    let output = run_kiln(&project, &["levels", "-r", "consul/release.toml"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    let level1 = text.find("Level 1:").unwrap();
    assert!(text.find("consul/go-1.4").unwrap() < level1);
    assert!(text.find("consul/ruby").unwrap() < level1);
    assert!(text.find("consul/consul").unwrap() > level1);
}

#[test]
fn test_levels_json_skips_compiled_packages() {
    let project = TestProject::new();
    project.write_release("consul", &["consul>go-1.4", "go-1.4"]);
    let cache = project.path().join("kiln-cache/compiled");
    store(&project, &cache, &fingerprint_of("consul", "go-1.4"));

    let output = run_kiln(&project, &["--json", "levels", "-r", "consul/release.toml"]);

    assert!(output.status.success());
    let levels: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let levels = levels.as_array().unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0][0]["package"], "consul/consul");
}

#[test]
fn test_packages_lists_compiled_flag() {
    let project = TestProject::new();
    project.write_release("tor", &["tor>libevent", "libevent"]);
    let cache = project.path().join("explicit-cache");
    store(&project, &cache, &fingerprint_of("tor", "libevent"));

    let output = run_kiln(
        &project,
        &[
            "--json",
            "packages",
            "-r",
            "tor/release.toml",
            "--all",
            "--cache-dir",
            cache.to_str().unwrap(),
        ],
    );

    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let libevent = rows.iter().find(|r| r["name"] == "libevent").unwrap();
    assert_eq!(libevent["compiled"], true);
    let tor = rows.iter().find(|r| r["name"] == "tor").unwrap();
    assert_eq!(tor["compiled"], false);
    assert_eq!(tor["dependencies"], serde_json::json!(["libevent"]));
}

#[test]
fn test_jobs_lists_job_packages() {
    let project = TestProject::new();
    project.write_release("tor", &["tor>libevent", "libevent"]);

    let output = run_kiln(&project, &["--json", "jobs", "-r", "tor/release.toml"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        rows,
        serde_json::json!([
            { "release": "tor", "name": "libevent", "packages": ["libevent"] },
            { "release": "tor", "name": "tor", "packages": ["tor"] },
        ])
    );

    let output = run_kiln(&project, &["jobs", "-r", "tor/release.toml"]);
    assert!(stdout(&output).contains("tor/tor: tor"));
}

#[test]
fn test_clean_cache_removes_unreferenced_entries() {
    let project = TestProject::new();
    project.write_release("tor", &["tor"]);
    let cache = project.path().join("kiln-cache/compiled");
    store(&project, &cache, &fingerprint_of("tor", "tor"));
    store(&project, &cache, "stale-fp");

    let output = run_kiln(&project, &["clean-cache", "-r", "tor/release.toml"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("stale-fp"));
    assert!(!cache.join("stale-fp").exists());
    assert!(cache.join(fingerprint_of("tor", "tor")).exists());
}

#[test]
fn test_duplicate_release_fails() {
    let project = TestProject::new();
    project.write_release("tor", &["tor"]);

    let output = run_kiln(
        &project,
        &["levels", "-r", "tor/release.toml", "-r", "tor/release.toml"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Release 'tor' has been loaded more than once"));
}

#[test]
fn test_compile_dry_run_does_not_need_a_runtime() {
    let project = TestProject::new();
    project.write_release("tor", &["tor>libevent", "libevent"]);

    let output = run_kiln(
        &project,
        &["compile", "-r", "tor/release.toml", "--dry-run", "--runtime", "nonexistent"],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("tor/libevent"));
}
