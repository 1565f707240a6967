//! Locate the binaries the E2E scenarios spawn

use std::path::{Path, PathBuf};

use mcp_hub::mcp::ServerSpec;

/// Workspace root: the parent of the hub crate
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".."))
}

/// Built `fs-mcp` binary, debug preferred
pub fn fs_mcp_binary() -> Option<PathBuf> {
    let target = workspace_root().join("target");
    ["debug", "release"]
        .iter()
        .map(|profile| target.join(profile).join("fs-mcp"))
        .find(|path| path.exists())
}

/// Spec for an `fs-mcp` process serving `root`
pub fn fs_spec(root: &Path) -> ServerSpec {
    let binary = fs_mcp_binary().expect("fs-mcp not built. Run: cargo build --workspace");
    ServerSpec::new(binary.display().to_string())
        .with_env("FS_MCP_ROOT", root.display().to_string())
        .with_env("RUST_LOG", "warn")
}

#[test]
#[ignore = "prerequisites check - run first"]
fn test_prerequisites() {
    println!("\n=== E2E Prerequisites Check ===\n");

    let binary = fs_mcp_binary();
    println!(
        "fs-mcp binary: {}",
        match &binary {
            Some(path) => format!("found at {}", path.display()),
            None => "not found (run: cargo build --workspace)".to_string(),
        }
    );

    assert!(binary.is_some(), "Binaries not built. Run: cargo build --workspace");
}
