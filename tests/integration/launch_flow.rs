//! Launcher behavior against built artifacts: member lookup, runner
//! invocation and structural failures

use std::ffi::OsString;
use std::fs;

use satchel::config::{Layout, PAYLOAD_MARKER};
use satchel::{LaunchError, Launcher};

use super::common::fixtures::{launcher_bytes, write, TestInputs};

#[test]
fn test_invocation_targets_embedded_project() {
    let inputs = TestInputs::new();
    let report = inputs.build("assistant");

    let plan = Launcher::new(inputs.settings())
        .prepare(&report.path)
        .unwrap();

    let target = &inputs.target;
    let config = target.join("project").join("config.yaml");
    assert_eq!(plan.members.runner, target.join("runner"));
    assert_eq!(plan.members.config, config);
    assert_eq!(plan.members.cache_dir, Some(target.join("cache")));

    let invocation = &plan.invocation;
    assert_eq!(invocation.program, target.join("runner"));
    assert_eq!(invocation.cwd, target.join("project"));
    assert_eq!(
        invocation.env("ROBOCORP_HOME"),
        Some(target.join("cache").as_path())
    );
    assert!(invocation.env("ROBOCORP_HOME").unwrap().is_absolute());
    assert_eq!(
        invocation.args,
        vec![
            OsString::from("run"),
            OsString::from("--robot"),
            config.into_os_string(),
        ]
    );
}

#[test]
fn test_layout_is_read_from_manifest() {
    let inputs = TestInputs::new();
    let report = inputs.build("assistant");

    let plan = Launcher::new(inputs.settings())
        .prepare(&report.path)
        .unwrap();
    assert_eq!(plan.layout, inputs.layout());
    assert_ne!(plan.layout, Layout::default());
}

#[test]
fn test_missing_cache_only_drops_env() {
    let inputs = TestInputs::new();
    let report = inputs.build_without_cache("assistant");

    let plan = Launcher::new(inputs.settings())
        .prepare(&report.path)
        .unwrap();
    assert_eq!(plan.members.cache_dir, None);
    assert!(plan.invocation.envs.is_empty());
    assert_eq!(plan.members.runner, inputs.target.join("runner"));
}

#[test]
fn test_missing_config_is_reported() {
    let inputs = TestInputs::new();
    let output = inputs.root.join("assistant");
    let mut request = inputs.request(&output);
    request.layout.config_file = "missing.yaml".to_string();

    let report = satchel::Packager::new(inputs.settings())
        .build(&request)
        .expect("a missing config only warns at build time");

    let err = Launcher::new(inputs.settings())
        .prepare(&report.path)
        .unwrap_err();
    match &err {
        LaunchError::ConfigNotFound { name, searched, .. } => {
            assert_eq!(name, "missing.yaml");
            assert!(!searched.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 6);
}

#[test]
fn test_zero_bytes_after_marker_is_structural_error() {
    let inputs = TestInputs::new();
    let artifact = inputs.root.join("truncated");
    let mut bytes = launcher_bytes(b"launcher");
    bytes.extend_from_slice(PAYLOAD_MARKER);
    write(&artifact, bytes);

    let err = Launcher::new(inputs.settings())
        .prepare(&artifact)
        .unwrap_err();
    assert!(matches!(err, LaunchError::InvalidArchive { .. }));
    assert_ne!(err.exit_code(), 0);
    assert!(!inputs.target.exists(), "nothing may be extracted");
}

#[test]
fn test_garbage_after_marker_leaves_previous_extraction() {
    let inputs = TestInputs::new();
    let report = inputs.build("assistant");
    let launcher = Launcher::new(inputs.settings());
    launcher.prepare(&report.path).unwrap();

    let artifact = inputs.root.join("corrupt");
    let mut bytes = launcher_bytes(b"launcher");
    bytes.extend_from_slice(PAYLOAD_MARKER);
    bytes.extend_from_slice(b"definitely not a zip archive");
    write(&artifact, bytes);

    let err = launcher.prepare(&artifact).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(inputs.target.join("project").join("config.yaml").is_file());
}

#[test]
fn test_artifact_without_marker() {
    let inputs = TestInputs::new();
    let artifact = inputs.root.join("plain");
    write(&artifact, b"just some program bytes");

    let err = Launcher::new(inputs.settings())
        .prepare(&artifact)
        .unwrap_err();
    assert!(matches!(err, LaunchError::MarkerNotFound { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_custom_marker_round_trip() {
    const MARKER: &[u8] = b"===CUSTOM_SEPARATOR===";

    let inputs = TestInputs::new();
    let settings = inputs.settings().with_marker(MARKER);
    let output = inputs.root.join("assistant");
    let report = satchel::Packager::new(settings.clone())
        .build(&inputs.request(&output))
        .unwrap();

    let bytes = fs::read(&report.path).unwrap();
    let separator = report.archive_offset as usize - MARKER.len();
    assert_eq!(&bytes[separator..report.archive_offset as usize], MARKER);

    let plan = Launcher::new(settings).prepare(&report.path).unwrap();
    assert_eq!(plan.payload.offset(), report.archive_offset);
    assert_eq!(plan.members.runner, inputs.target.join("runner"));

    // The default marker only appears in the launcher bytes, with no archive after it.
    let err = Launcher::new(inputs.settings())
        .prepare(&report.path)
        .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[cfg(unix)]
mod unix {
    use super::*;
    use crate::integration::common::fixtures::read_record;

    #[test]
    fn test_runner_receives_invocation() {
        let inputs = TestInputs::new();
        let report = inputs.build("assistant");

        let code = Launcher::new(inputs.settings()).run(&report.path).unwrap();
        assert_eq!(code, 0);

        let project = inputs.target.join("project");
        let record = read_record(&project);
        let value = |key: &str| -> Vec<String> {
            record
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect()
        };

        let cwd = fs::canonicalize(&value("cwd")[0]).unwrap();
        assert_eq!(cwd, fs::canonicalize(&project).unwrap());
        assert_eq!(
            value("home"),
            vec![inputs.target.join("cache").display().to_string()]
        );
        assert_eq!(
            value("arg"),
            vec![
                "run".to_string(),
                "--robot".to_string(),
                project.join("config.yaml").display().to_string(),
            ]
        );
    }

    #[test]
    fn test_runner_exit_code_is_propagated() {
        let inputs = TestInputs::new();
        write(&inputs.runner, "#!/bin/sh\nexit 7\n");
        let report = inputs.build("assistant");

        let code = Launcher::new(inputs.settings()).run(&report.path).unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    fn test_runner_runs_without_cache() {
        let inputs = TestInputs::new();
        let report = inputs.build_without_cache("assistant");

        let code = Launcher::new(inputs.settings()).run(&report.path).unwrap();
        assert_eq!(code, 0);

        let record = read_record(&inputs.target.join("project"));
        assert!(record.iter().any(|(k, _)| k == "arg"));
    }
}
