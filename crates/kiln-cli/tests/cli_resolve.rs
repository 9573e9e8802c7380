use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const BUILD: &str = r#"
[project]
name = "app"
group = "com.example"
version = "1.0.0"

[configurations.implementation]
dependencies = ["org.slf4j:slf4j-api:1.7.36", "com.acme:core:2.0"]

[configurations.testImplementation]
extends-from = ["implementation"]
dependencies = ["org.junit:junit:4.13"]

[[modules]]
module = "org.slf4j:slf4j-api"
version = "1.7.36"
artifacts = ["slf4j-api-1.7.36.jar"]

[[modules]]
module = "org.slf4j:slf4j-api"
version = "2.0.9"
artifacts = ["slf4j-api-2.0.9.jar"]

[[modules]]
module = "com.acme:core"
version = "2.0"
dependencies = ["org.slf4j:slf4j-api:2.0.9"]
artifacts = ["core-2.0.jar"]

[[modules]]
module = "org.junit:junit"
version = "4.13"
artifacts = ["junit-4.13.jar"]
"#;

fn project(build: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("Kiln.toml"), build).unwrap();
    tmp
}

fn kiln_cmd(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(tmp.path()).env("HOME", tmp.path());
    cmd
}

#[test]
fn test_resolve_prints_selected_modules() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["resolve", "implementation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org.slf4j:slf4j-api:2.0.9"))
        .stdout(predicate::str::contains("com.acme:core:2.0"))
        .stdout(predicate::str::contains("1.7.36").not())
        .stderr(predicate::str::contains("Resolved"));
}

#[test]
fn test_resolve_all_configurations_by_default() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains("org.junit:junit:4.13"))
        .stderr(predicate::str::contains("testImplementation (3 modules)"));
}

#[test]
fn test_resolve_json_output() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["resolve", "implementation", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"configuration\": \"implementation\""))
        .stdout(predicate::str::contains("\"cache_hit\": false"));
}

#[test]
fn test_resolve_missing_module_fails() {
    let tmp = project(&BUILD.replace("com.acme:core:2.0\"]", "com.acme:core:2.0\", \"org:gone:1.0\"]"));

    kiln_cmd(&tmp)
        .args(["resolve", "implementation"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("org:gone not found"));
}

#[test]
fn test_resolve_summarizes_several_failures() {
    let tmp = project(&BUILD.replace("com.acme:core:2.0\"]", "com.acme:core:2.0\", \"org:gone:1.0\"]"));

    kiln_cmd(&tmp)
        .arg("resolve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("org:gone not found"))
        .stderr(predicate::str::contains("2 of 2 configurations failed"));
}

#[test]
fn test_resolve_unknown_configuration_fails() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["resolve", "runtime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration 'runtime'"));
}

#[test]
fn test_tree_shows_upgraded_edge() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["tree", "implementation"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("implementation\n"))
        .stdout(predicate::str::contains("org.slf4j:slf4j-api:1.7.36 -> 2.0.9"));
}

#[test]
fn test_tree_conflicts() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["tree", "implementation", "--conflicts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org.slf4j:slf4j-api"));
}

#[test]
fn test_tree_why() {
    let tmp = project(BUILD);

    kiln_cmd(&tmp)
        .args(["tree", "testImplementation", "--why", "junit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Path to junit:"));
}

#[test]
fn test_missing_build_file() {
    let tmp = TempDir::new().unwrap();

    kiln_cmd(&tmp)
        .args(["resolve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No Kiln.toml found"));
}
