//! The `fuzzkit` binary as a user runs it

use assert_cmd::Command;
use fuzzkit::archive::{BundleMetadata, Engine, FuzzerEntry, RunEnvironment};
use predicates::prelude::*;
use tempfile::TempDir;

fn fuzzkit() -> Command {
    let mut cmd = Command::cargo_bin("fuzzkit").unwrap();
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    fuzzkit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle"))
        .stdout(predicate::str::contains("execute"))
        .stdout(predicate::str::contains("remote-run"))
        .stdout(predicate::str::contains("container"));
}

#[test]
fn test_execute_outside_a_bundle() {
    let dir = TempDir::new().unwrap();
    fuzzkit()
        .arg("-C")
        .arg(dir.path())
        .arg("execute")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bundle.yaml"));
}

#[test]
fn test_execute_lists_bundled_fuzz_tests() {
    let dir = TempDir::new().unwrap();
    let mut fuzzing = FuzzerEntry::new("parse_fuzzer", Engine::LibFuzzer);
    fuzzing.path = Some("parse_fuzzer/bin/parse_fuzzer".to_string());
    let mut coverage = fuzzing.clone();
    coverage.engine = Engine::LlvmCov;
    BundleMetadata {
        fuzzers: vec![fuzzing, coverage],
        docker_base_image: "ubuntu:22.04".to_string(),
        run_environment: RunEnvironment {
            docker: "ubuntu:22.04".to_string(),
        },
        code_revision: None,
    }
    .write_to_dir(dir.path())
    .unwrap();

    fuzzkit()
        .arg("-C")
        .arg(dir.path())
        .arg("execute")
        .assert()
        .success()
        .stdout(predicate::str::contains("This bundle is based on: ubuntu:22.04"))
        .stdout(predicate::str::contains("run fuzz test with: fuzzkit execute parse_fuzzer"))
        .stdout(predicate::str::contains("using: LIBFUZZER"))
        .stdout(predicate::str::contains("LLVM_COV").not());
}

#[test]
fn test_execute_name_conflicts_with_single_flag() {
    fuzzkit()
        .args(["execute", "parse_fuzzer", "--single-fuzz-test"])
        .assert()
        .code(2);
}

#[test]
fn test_remote_run_requires_a_server() {
    let dir = TempDir::new().unwrap();
    fuzzkit()
        .arg("-C")
        .arg(dir.path())
        .args(["remote-run", "--project", "projects/demo"])
        .env_remove("FUZZKIT_SERVER")
        .assert()
        .failure()
        .stderr(predicate::str::contains("server"));
}
