//! Running fuzz tests out of an extracted bundle

use std::fs;
use std::path::Path;
use std::time::Duration;

use fuzzkit::archive::{extract, BundleMetadata, Engine, FuzzerEntry};
use fuzzkit::bundler::{BundleOptions, Bundler, NativeAdapter};
use fuzzkit::config::BuildSystem;
use fuzzkit::executor::{ExecuteError, Executor, GENERATED_CORPUS_DIR, MANAGED_SEED_DIR};
use tempfile::TempDir;

use super::common::fixtures::ScriptedBuilder;

/// Records its arguments and part of its environment in the working directory
const RECORDING_FUZZER: &str = r#"#!/bin/sh
printf '%s\n' "$@" > args.txt
echo "NO_FUZZKIT=$NO_FUZZKIT" > env.txt
echo "FUZZ_MODE=$FUZZ_MODE" >> env.txt
exit "${EXIT_CODE:-0}"
"#;

#[cfg(unix)]
fn bundle_native_project(names: &[&str], exit_code: u8) -> (TempDir, TempDir) {
    use super::common::fixtures::write_executable;

    let project = TempDir::new().unwrap();
    for name in names {
        write_executable(&project.path().join("build").join(name), RECORDING_FUZZER);
    }

    let mut options = BundleOptions::new(project.path(), BuildSystem::CMake);
    options.output_path = project.path().join("out/fuzz_tests.tar.gz");
    options.fuzz_tests = names.iter().map(|n| n.to_string()).collect();
    options.env = vec![
        "FUZZ_MODE=ci".to_string(),
        format!("EXIT_CODE={exit_code}"),
    ];
    options.engine_args = vec!["-runs=100".to_string()];
    options.timeout = Some(Duration::from_secs(30));
    options.allow_unsupported_platform = true;

    let adapter = NativeAdapter::new(Box::new(ScriptedBuilder::native(project.path())))
        .with_required_tools(vec![]);
    let bundle = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap();

    let extracted = TempDir::new().unwrap();
    extract(&bundle, extracted.path()).unwrap();
    (project, extracted)
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_single_native_fuzz_test() {
    let (_project, bundle) = bundle_native_project(&["parse_fuzzer"], 0);
    let executor = Executor::load(bundle.path()).unwrap();

    let code = executor.run(None).await.unwrap();
    assert_eq!(code, 0);

    let args = read_lines(&bundle.path().join("args.txt"));
    let root = bundle.path().display().to_string();
    assert_eq!(
        args,
        vec![
            format!("-artifact_prefix={root}/"),
            "-max_total_time=30".to_string(),
            "-runs=100".to_string(),
            format!("{root}/{GENERATED_CORPUS_DIR}"),
            format!("{root}/{MANAGED_SEED_DIR}"),
        ]
    );
    assert_eq!(
        read_lines(&bundle.path().join("env.txt")),
        vec!["NO_FUZZKIT=1", "FUZZ_MODE=ci"]
    );
    assert!(bundle.path().join(GENERATED_CORPUS_DIR).is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_passes_exit_code_through() {
    let (_project, bundle) = bundle_native_project(&["parse_fuzzer"], 77);
    let executor = Executor::load(bundle.path()).unwrap();

    assert_eq!(executor.run(Some("parse_fuzzer")).await.unwrap(), 77);
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_requires_a_name_with_several_tests() {
    let (_project, bundle) = bundle_native_project(&["parse_fuzzer", "decode_fuzzer"], 0);
    let executor = Executor::load(bundle.path()).unwrap();

    let err = executor.run(None).await.unwrap_err();
    assert!(matches!(err, ExecuteError::AmbiguousFuzzer { count: 2 }));
    assert!(err.is_expected());

    let err = executor.run(Some("nope")).await.unwrap_err();
    assert!(matches!(err, ExecuteError::UnknownFuzzer(name) if name == "nope"));

    assert_eq!(executor.run(Some("decode_fuzzer")).await.unwrap(), 0);
}

#[test]
fn test_missing_metadata() {
    let dir = TempDir::new().unwrap();
    let err = Executor::load(dir.path()).err().unwrap();
    assert!(matches!(err, ExecuteError::MissingMetadata(_)));
    assert!(err.to_string().contains("bundle.yaml"));
}

#[test]
fn test_jvm_entry_runner_options() {
    let dir = TempDir::new().unwrap();
    let mut entry = FuzzerEntry::new("com.example.FuzzTest::fuzzJson", Engine::JavaLibFuzzer);
    entry.runtime_paths = vec![
        "com.example.FuzzTest_fuzzJson/manifest.jar".to_string(),
        "runtime_deps/classes".to_string(),
    ];
    let metadata = BundleMetadata {
        fuzzers: vec![entry],
        ..Default::default()
    };
    metadata.write_to_dir(dir.path()).unwrap();

    let executor = Executor::load(dir.path()).unwrap();
    let entry = executor.resolve(None).unwrap();
    let options = executor.runner_options(entry).unwrap();

    match options.target {
        fuzzkit::executor::RunTarget::Jvm {
            class,
            method,
            class_paths,
        } => {
            assert_eq!(class, "com.example.FuzzTest");
            assert_eq!(method.as_deref(), Some("fuzzJson"));
            assert_eq!(
                class_paths,
                vec![
                    dir.path().join("com.example.FuzzTest_fuzzJson/manifest.jar"),
                    dir.path().join("runtime_deps/classes"),
                ]
            );
        }
        other => panic!("unexpected target: {other:?}"),
    }
    assert_eq!(options.max_run_time, None);
}
