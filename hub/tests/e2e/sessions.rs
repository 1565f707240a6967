//! E2E test: sessions against real `fs-mcp` processes

use mcp_hub::error::SessionError;
use mcp_hub::mcp::{SessionConfig, SessionManager, ToolCatalog, ToolFormat};
use serde_json::json;
use tempfile::tempdir;

use crate::prerequisites::fs_spec;

#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_fs_connect_call_disconnect() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "remember the milk\n").unwrap();

    let sessions = SessionManager::new(SessionConfig::default());
    let response = sessions.connect("fs", fs_spec(dir.path())).await.unwrap();

    let names: Vec<_> = response.tools.iter().map(|t| t.name.as_str()).collect();
    println!("fs tools: {:?}", names);
    assert!(names.contains(&"read_file"));
    assert!(names.contains(&"list"));
    assert!(response.tools.iter().all(|t| t.server_name == "fs"));

    let output = sessions
        .execute_tool("fs", "read_file", json!({"path": "notes.txt"}))
        .await
        .unwrap();
    assert_eq!(output.content, "remember the milk\n");

    sessions.disconnect("fs").await;
    let err = sessions
        .execute_tool("fs", "read_file", json!({"path": "notes.txt"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotConnected(_)));
}

#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_same_tool_name_on_two_servers() {
    let fs_root = tempdir().unwrap();
    std::fs::write(fs_root.path().join("from_fs.txt"), "").unwrap();
    let git_root = tempdir().unwrap();
    std::fs::write(git_root.path().join("from_git.txt"), "").unwrap();

    let sessions = SessionManager::new(SessionConfig::default());
    sessions.connect("fs", fs_spec(fs_root.path())).await.unwrap();
    sessions.connect("git", fs_spec(git_root.path())).await.unwrap();

    let catalog = ToolCatalog::build(&sessions.get_all_tools().await);
    let names: Vec<_> = catalog.names().collect();
    assert!(names.contains(&"fs__list"));
    assert!(names.contains(&"git__list"));

    let declared = catalog.declarations(ToolFormat::OpenAi);
    assert!(declared
        .iter()
        .any(|d| d["function"]["name"] == "git__list"));

    let resolved = catalog.resolve("git__list").unwrap();
    let output = sessions
        .execute_tool(&resolved.server_name, &resolved.tool_name, json!({}))
        .await
        .unwrap();
    assert!(output.content.contains("from_git.txt"));
    assert!(!output.content.contains("from_fs.txt"));

    sessions.shutdown().await;
    assert!(sessions.list_connected().await.is_empty());
}

#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_tool_error_leaves_session_usable() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();

    let sessions = SessionManager::new(SessionConfig::default());
    sessions.connect("fs", fs_spec(dir.path())).await.unwrap();

    let err = sessions
        .execute_tool("fs", "read_file", json!({"path": "../../etc/passwd"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "tool_execution_error");

    let output = sessions
        .execute_tool("fs", "read_file", json!({"path": "a.txt"}))
        .await
        .unwrap();
    assert_eq!(output.content, "a");
    sessions.shutdown().await;
}

#[tokio::test]
#[ignore = "requires built workspace binaries"]
async fn test_reconnect_replaces_session() {
    let first = tempdir().unwrap();
    std::fs::write(first.path().join("first.txt"), "").unwrap();
    let second = tempdir().unwrap();
    std::fs::write(second.path().join("second.txt"), "").unwrap();

    let sessions = SessionManager::new(SessionConfig::default());
    sessions.connect("fs", fs_spec(first.path())).await.unwrap();
    sessions.connect("fs", fs_spec(second.path())).await.unwrap();

    assert_eq!(sessions.list_connected().await.len(), 1);
    let output = sessions.execute_tool("fs", "list", json!({})).await.unwrap();
    assert!(output.content.contains("second.txt"));
    sessions.shutdown().await;
}
