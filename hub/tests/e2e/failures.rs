//! E2E test: connection and call failures with real processes

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mcp_hub::error::SessionError;
use mcp_hub::mcp::{ServerSpec, SessionConfig, SessionManager};
use serde_json::json;
use tempfile::tempdir;

use crate::prerequisites::fs_spec;

#[tokio::test]
async fn test_missing_command_fails_to_spawn() {
    let sessions = SessionManager::new(SessionConfig::default());
    let err = sessions
        .connect("ghost", ServerSpec::new("definitely-not-a-real-mcp-server"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Connection { .. }));
    assert!(!sessions.is_connected("ghost").await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_that_exits_fails_handshake() {
    let sessions = SessionManager::new(SessionConfig {
        handshake_timeout: Duration::from_secs(10),
        ..Default::default()
    });
    let result = sessions.connect("quitter", ServerSpec::new("true")).await;

    assert!(result.is_err());
    assert!(!sessions.is_connected("quitter").await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_silent_process_times_out() {
    let sessions = SessionManager::new(SessionConfig {
        handshake_timeout: Duration::from_millis(300),
        ..Default::default()
    });
    let err = sessions
        .connect("mute", ServerSpec::new("sleep").with_args(["30"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Timeout { .. }));
    assert!(sessions.list_connected().await.is_empty());
}

#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_missing_file_is_tool_execution_error() {
    let dir = tempdir().unwrap();
    let sessions = SessionManager::new(SessionConfig::default());
    sessions.connect("fs", fs_spec(dir.path())).await.unwrap();

    let err = sessions
        .execute_tool("fs", "read_file", json!({"path": "nope.txt"}))
        .await
        .unwrap_err();
    assert!(
        matches!(err, SessionError::ToolExecution { ref tool, .. } if tool == "read_file"),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(err.kind(), "tool_execution_error");
    assert!(err.to_string().contains("not found"));

    let err = sessions
        .execute_tool("fs", "read_file", json!({"path": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "schema_validation_error");

    sessions.shutdown().await;
}

/// A named pipe with no writer: opening it for reading blocks
#[cfg(unix)]
fn blocking_fifo(dir: &Path) -> PathBuf {
    let path = dir.join("pipe");
    let status = std::process::Command::new("mkfifo")
        .arg(&path)
        .status()
        .expect("mkfifo not available");
    assert!(status.success());
    path
}

#[cfg(unix)]
#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_disconnect_ends_blocked_call_with_transport_closed() {
    let dir = tempdir().unwrap();
    blocking_fifo(dir.path());

    let sessions = Arc::new(SessionManager::new(SessionConfig {
        tool_timeout: Duration::from_secs(60),
        ..Default::default()
    }));
    sessions.connect("fs", fs_spec(dir.path())).await.unwrap();

    let caller = sessions.clone();
    let call = tokio::spawn(async move {
        caller
            .execute_tool("fs", "read_file", json!({"path": "pipe"}))
            .await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!call.is_finished());

    sessions.disconnect("fs").await;

    let result = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("blocked call did not finish after disconnect")
        .unwrap();
    let err = result.unwrap_err();
    assert!(
        matches!(err, SessionError::TransportClosed(ref server) if server == "fs"),
        "unexpected error: {:?}",
        err
    );
    assert!(!sessions.is_connected("fs").await);
}

#[cfg(unix)]
#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_blocked_call_times_out_and_session_stays_connected() {
    let dir = tempdir().unwrap();
    blocking_fifo(dir.path());
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();

    let sessions = SessionManager::new(SessionConfig {
        tool_timeout: Duration::from_millis(500),
        ..Default::default()
    });
    sessions.connect("fs", fs_spec(dir.path())).await.unwrap();

    let started = std::time::Instant::now();
    let err = sessions
        .execute_tool("fs", "read_file", json!({"path": "pipe"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout { .. }), "unexpected error: {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(sessions.is_connected("fs").await);
    let output = sessions
        .execute_tool("fs", "read_file", json!({"path": "a.txt"}))
        .await
        .unwrap();
    assert_eq!(output.content, "a");

    sessions.shutdown().await;
}
