//! Tests for error types

use std::error::Error as _;

use cluster_testbed::Error;

#[test]
fn test_not_found_error() {
    let error = Error::NotFound("topology ring".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Not found"));
    assert!(error_str.contains("topology ring"));
    assert_eq!(error.kind(), "not_found");
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("unknown strategy \"greedy\"".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("greedy"));
    assert_eq!(error.kind(), "invalid_input");
}

#[test]
fn test_upstream_error() {
    let error = Error::upstream("control plane", "create project: 500 Internal Server Error");
    let error_str = format!("{error}");
    assert!(error_str.contains("control plane unavailable"));
    assert!(error_str.contains("500"));
    assert_eq!(error.kind(), "upstream_unavailable");
}

#[test]
fn test_partial_configuration_error() {
    let error = Error::PartialConfiguration {
        node: "alpha".to_string(),
        detail: "login prompt timed out".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("alpha"));
    assert!(error_str.contains("login prompt timed out"));
    assert_eq!(error.kind(), "partial_configuration");
}

#[test]
fn test_pipeline_error_keeps_root_kind() {
    let error = Error::NotFound("topology ring".to_string()).in_stage("provisioning");
    let error_str = format!("{error}");
    assert!(error_str.contains("Stage provisioning failed"));
    assert_eq!(error.kind(), "not_found");
    assert!(matches!(error.root(), Error::NotFound(_)));
    assert!(error.source().is_some());
}

#[test]
fn test_nested_pipeline_error() {
    let error = Error::Timeout("console 127.0.0.1:5000".to_string())
        .in_stage("provisioning")
        .in_stage("pipeline");
    assert_eq!(error.kind(), "timeout");
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert_eq!(error.kind(), "io");
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
    assert_eq!(error.kind(), "json");
}

#[test]
fn test_other_error() {
    let error = Error::Other("no addresses assigned".to_string());
    let error_str = format!("{error}");
    assert_eq!(error_str, "no addresses assigned");
    assert_eq!(error.kind(), "internal");
}

#[test]
fn test_error_debug() {
    let error = Error::AmbiguousIdentifier("display name beta".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("AmbiguousIdentifier"));
}

#[test]
fn test_result_type_alias() {
    #[allow(clippy::unnecessary_wraps)]
    fn returns_result() -> cluster_testbed::Result<u64> {
        Ok(42)
    }

    assert_eq!(returns_result().unwrap(), 42);
}

#[test]
fn test_result_type_alias_error() {
    fn returns_error() -> cluster_testbed::Result<u64> {
        Err(Error::Other("test error".to_string()))
    }

    assert!(returns_error().is_err());
}
