//! Bundling a project end to end and reading the result back

use std::fs;

use fuzzkit::archive::{extract, BundleMetadata, Engine};
use fuzzkit::bundler::{BundleError, BundleOptions, Bundler, JazzerAdapter, NativeAdapter};
use fuzzkit::config::BuildSystem;
use tempfile::TempDir;

use super::common::fixtures::{write_file, JvmProject, ScriptedBuilder};

fn jvm_options(project: &JvmProject, out: &TempDir) -> BundleOptions {
    let mut options = BundleOptions::new(project.path(), BuildSystem::Maven);
    options.output_path = out.path().join("fuzz_tests.tar.gz");
    options.docker_image = "maven:3.9-eclipse-temurin-17".to_string();
    options.commit = Some("0123456789abcdef".to_string());
    options.branch = Some("main".to_string());
    options
}

#[test]
fn test_jvm_bundle_with_discovered_tests() {
    let project = JvmProject::new();
    let out = TempDir::new().unwrap();
    let builder = ScriptedBuilder::jvm(project.path(), project.runtime_deps());
    let builds = builder.builds.clone();
    let adapter = JazzerAdapter::new(Box::new(builder)).with_required_tools(vec![]);

    let bundle = Bundler::with_adapter(jvm_options(&project, &out), Box::new(adapter))
        .bundle()
        .unwrap();
    assert_eq!(bundle, out.path().join("fuzz_tests.tar.gz"));

    let extracted = TempDir::new().unwrap();
    extract(&bundle, extracted.path()).unwrap();
    let metadata = BundleMetadata::from_dir(extracted.path()).unwrap();

    let names: Vec<_> = metadata.fuzzers.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["com.example.AnotherFuzzTest", "com.example.FuzzTest"]);
    assert!(metadata
        .fuzzers
        .iter()
        .all(|f| f.engine == Engine::JavaLibFuzzer));

    let fuzz_test = &metadata.fuzzers[1];
    assert_eq!(
        fuzz_test.runtime_paths,
        vec![
            "com.example.FuzzTest/manifest.jar",
            "runtime_deps/mylib.jar",
            "runtime_deps/classes",
            "runtime_deps/test-classes",
        ]
    );
    assert_eq!(metadata.docker_base_image, "maven:3.9-eclipse-temurin-17");
    assert_eq!(metadata.run_environment.docker, "maven:3.9-eclipse-temurin-17");
    let revision = metadata.code_revision.unwrap();
    assert_eq!(revision.git.commit.as_deref(), Some("0123456789abcdef"));
    assert_eq!(revision.git.branch.as_deref(), Some("main"));

    for path in [
        "com.example.FuzzTest/manifest.jar",
        "com.example.AnotherFuzzTest/manifest.jar",
        "runtime_deps/mylib.jar",
        "runtime_deps/classes/com/example/Parser.class",
        "runtime_deps/test-classes/com/example/FuzzTest.class",
    ] {
        assert!(extracted.path().join(path).is_file(), "missing {path}");
    }

    // One build per test
    let mut built: Vec<_> = builds.lock().iter().flatten().cloned().collect();
    built.sort();
    assert_eq!(built, vec!["com.example.AnotherFuzzTest", "com.example.FuzzTest"]);
}

#[test]
fn test_jvm_bundle_with_named_test_and_seeds() {
    let project = JvmProject::new();
    let out = TempDir::new().unwrap();
    let corpus = project.path().join("seed_corpus");
    write_file(&corpus.join("crash-1"), "{\"a\":");
    let dict = project.path().join("json.dict");
    write_file(&dict, "kw=\"null\"\n");

    let mut options = jvm_options(&project, &out);
    options.fuzz_tests = vec!["com.example.FuzzTest".to_string()];
    options.seed_corpus_dirs = vec![corpus];
    options.dictionary = Some(dict);
    options.engine_args = vec!["-use_value_profile=1".to_string()];

    let builder = ScriptedBuilder::jvm(project.path(), project.runtime_deps());
    let adapter = JazzerAdapter::new(Box::new(builder)).with_required_tools(vec![]);
    let bundle = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap();

    let extracted = TempDir::new().unwrap();
    extract(&bundle, extracted.path()).unwrap();
    let metadata = BundleMetadata::from_dir(extracted.path()).unwrap();

    assert_eq!(metadata.fuzzers.len(), 1);
    let entry = &metadata.fuzzers[0];
    assert_eq!(entry.dictionary.as_deref(), Some("dict"));
    assert_eq!(entry.seeds.as_deref(), Some("seeds"));
    assert_eq!(entry.engine_options.flags, vec!["-use_value_profile=1"]);
    assert_eq!(
        fs::read_to_string(extracted.path().join("seeds/seed_corpus/crash-1")).unwrap(),
        "{\"a\":"
    );
    assert!(extracted.path().join("dict").is_file());
}

#[cfg(unix)]
#[test]
fn test_native_bundle_orders_coverage_entries_last() {
    use super::common::fixtures::write_executable;

    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_executable(&project.path().join("build/parse_fuzzer"), "#!/bin/sh\n");
    write_executable(&project.path().join("build/parse_fuzzer_cov"), "#!/bin/sh\n");
    write_executable(&project.path().join("build/decode_fuzzer"), "#!/bin/sh\n");

    let mut options = BundleOptions::new(project.path(), BuildSystem::CMake);
    options.output_path = out.path().join("native.tar.gz");
    options.fuzz_tests = vec!["parse_fuzzer".to_string(), "decode_fuzzer".to_string()];
    options.allow_unsupported_platform = true;

    let adapter = NativeAdapter::new(Box::new(ScriptedBuilder::native(project.path())))
        .with_required_tools(vec![]);
    let bundle = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap();

    let extracted = TempDir::new().unwrap();
    extract(&bundle, extracted.path()).unwrap();
    let metadata = BundleMetadata::from_dir(extracted.path()).unwrap();

    let summary: Vec<_> = metadata
        .fuzzers
        .iter()
        .map(|f| (f.name.as_str(), f.engine.as_str(), f.path.as_deref().unwrap_or("")))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("parse_fuzzer", "LIBFUZZER", "parse_fuzzer/bin/parse_fuzzer"),
            ("decode_fuzzer", "LIBFUZZER", "decode_fuzzer/bin/decode_fuzzer"),
            ("parse_fuzzer", "LLVM_COV", "parse_fuzzer/coverage/bin/parse_fuzzer_cov"),
        ]
    );
    assert!(extracted
        .path()
        .join("parse_fuzzer/bin/parse_fuzzer")
        .is_file());
}

#[cfg(unix)]
#[test]
fn test_native_bundle_without_names_takes_every_fuzz_test() {
    use super::common::fixtures::write_executable;

    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_executable(&project.path().join("build/parse_fuzzer"), "#!/bin/sh\n");
    write_executable(&project.path().join("build/decode_fuzzer"), "#!/bin/sh\n");

    let mut options = BundleOptions::new(project.path(), BuildSystem::CMake);
    options.output_path = out.path().join("native.tar.gz");
    options.allow_unsupported_platform = true;

    let builder = ScriptedBuilder::native(project.path());
    let builds = builder.builds.clone();
    let adapter = NativeAdapter::new(Box::new(builder)).with_required_tools(vec![]);
    let bundle = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap();

    let extracted = TempDir::new().unwrap();
    extract(&bundle, extracted.path()).unwrap();
    let metadata = BundleMetadata::from_dir(extracted.path()).unwrap();
    let names: Vec<_> = metadata.fuzzers.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["decode_fuzzer", "parse_fuzzer"]);
    assert_eq!(
        *builds.lock(),
        vec![vec!["decode_fuzzer".to_string(), "parse_fuzzer".to_string()]]
    );
}

#[test]
fn test_native_bundle_without_test_names() {
    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut options = BundleOptions::new(project.path(), BuildSystem::CMake);
    options.output_path = out.path().join("native.tar.gz");
    options.allow_unsupported_platform = true;

    let adapter = NativeAdapter::new(Box::new(ScriptedBuilder::native(project.path())))
        .with_required_tools(vec![]);
    let err = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap_err();

    assert!(matches!(err, BundleError::NoFuzzTestsFound));
    assert!(err.is_expected());
    assert!(!out.path().join("native.tar.gz").exists());
}

#[test]
fn test_failed_build_leaves_no_bundle() {
    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut options = BundleOptions::new(project.path(), BuildSystem::CMake);
    options.output_path = out.path().join("native.tar.gz");
    options.fuzz_tests = vec!["missing_fuzzer".to_string()];
    options.allow_unsupported_platform = true;

    let adapter = NativeAdapter::new(Box::new(ScriptedBuilder::native(project.path())))
        .with_required_tools(vec![]);
    let err = Bundler::with_adapter(options, Box::new(adapter))
        .bundle()
        .unwrap_err();

    assert!(matches!(err, BundleError::Build(_)));
    assert!(!out.path().join("native.tar.gz").exists());
}
