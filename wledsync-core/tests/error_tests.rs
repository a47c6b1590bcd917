//! Integration tests for error handling

use wledsync_core::error::{ResultExt, WledSyncError};

#[test]
fn test_error_context_chaining() {
    let base_error = WledSyncError::device("Connection refused");
    let with_context = base_error.with_context("Sending frame to 192.168.1.50");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Sending frame to 192.168.1.50"));
    assert!(msg.contains("Connection refused"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = WledSyncError::wled("HTTP 404");
    let hint_before = base_error.user_hint();

    let with_context = base_error
        .with_context("Reading matrix size")
        .with_context("Starting cast");

    assert!(hint_before.is_some());
    assert_eq!(hint_before, with_context.user_hint());
    assert!(matches!(with_context.root(), WledSyncError::Wled(_)));
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), WledSyncError> = Err(WledSyncError::config("rate is zero"));
    let err = result.context("Loading cast settings").unwrap_err();

    assert!(format!("{}", err).starts_with("Loading cast settings: "));
    assert!(err.is_user_recoverable());
}

#[test]
fn test_user_hints() {
    let err = WledSyncError::device("test");
    assert!(err.user_hint().unwrap().contains("reachable"));

    let err = WledSyncError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    let err = WledSyncError::SourceNotFound("win=Foo".to_string());
    assert!(err.user_hint().unwrap().contains("list-sources"));

    let err = WledSyncError::CastAlreadyRunning;
    assert!(err.user_hint().unwrap().contains("wledvideosync stop"));

    // Internal failures carry no hint
    assert!(WledSyncError::process("test").user_hint().is_none());
    assert!(WledSyncError::protocol("test").user_hint().is_none());
}

#[test]
fn test_user_recoverable() {
    assert!(WledSyncError::device("test").is_user_recoverable());
    assert!(WledSyncError::wled("test").is_user_recoverable());
    assert!(WledSyncError::action("test").is_user_recoverable());
    assert!(WledSyncError::NoActiveCast.is_user_recoverable());

    assert!(!WledSyncError::process("test").is_user_recoverable());
    assert!(!WledSyncError::capture("test").is_user_recoverable());
    assert!(!WledSyncError::Unsupported("test".to_string()).is_user_recoverable());
}

#[test]
fn test_error_display_format() {
    assert_eq!(
        WledSyncError::protocol("Invalid buffer size. 27 != 30").to_string(),
        "Protocol error: Invalid buffer size. 27 != 30"
    );
    assert_eq!(WledSyncError::NoActiveCast.to_string(), "No active cast");
    assert_eq!(
        WledSyncError::action("unknown action 'fly'").to_string(),
        "Invalid action: unknown action 'fly'"
    );
}

#[test]
fn test_external_conversions() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(WledSyncError::from(io), WledSyncError::Io(_)));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(WledSyncError::from(json), WledSyncError::Ipc(_)));

    let toml = toml::from_str::<toml::Value>("= 1").unwrap_err();
    assert!(matches!(WledSyncError::from(toml), WledSyncError::Config(_)));
}
