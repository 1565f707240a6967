//! Parameter types for fs-mcp tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Path of the file to read, relative to the server root")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Directory to list, relative to the server root (default: root)")]
    #[serde(default = "default_dir")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FileInfoParams {
    #[schemars(description = "Path of the file or directory")]
    pub path: String,
}

fn default_dir() -> String {
    ".".to_string()
}
