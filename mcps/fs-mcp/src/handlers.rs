//! Tool handlers
//!
//! Each handler takes the root and its params and returns the tool result.
//! Failures of the operation itself come back as `isError` results; only a
//! malformed path is a protocol-level `invalid_params`.

use chrono::{DateTime, Utc};
use mcp_common::{invalid_params, json_success, text_error, text_success, CallToolResult, McpError};
use serde::Serialize;
use std::fs::Metadata;
use tokio::fs;

use crate::params::{FileInfoParams, ListParams, ReadFileParams};
use crate::root::Root;
use crate::types::{
    EntryType, FileEntry, FileInfoResponse, FsError, FsResult, ListResponse, MAX_FILE_SIZE,
};

/// Turn a failed operation into the tool response the client sees
pub fn fs_error_to_result(err: FsError) -> Result<CallToolResult, McpError> {
    match err {
        FsError::InvalidPath(_) => Err(invalid_params(err.to_string())),
        err => Ok(text_error(err.to_string())),
    }
}

fn respond<T: Serialize>(outcome: FsResult<T>) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(data) => json_success(&data),
        Err(e) => fs_error_to_result(e),
    }
}

fn entry_type(metadata: &Metadata) -> EntryType {
    if metadata.is_symlink() {
        EntryType::Symlink
    } else if metadata.is_dir() {
        EntryType::Directory
    } else {
        EntryType::File
    }
}

/// Return the file's text content as-is
pub async fn read_file(root: &Root, params: ReadFileParams) -> Result<CallToolResult, McpError> {
    match read_contents(root, &params.path).await {
        Ok(content) => Ok(text_success(content)),
        Err(e) => fs_error_to_result(e),
    }
}

async fn read_contents(root: &Root, requested: &str) -> FsResult<String> {
    let path = root.resolve(requested)?;

    let metadata = fs::metadata(&path).await?;
    if metadata.is_dir() {
        return Err(FsError::IsADirectory(requested.to_string()));
    }
    if metadata.len() > MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge {
            size: metadata.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let content = fs::read_to_string(&path).await?;
    tracing::debug!("Read {} ({} bytes)", path.display(), content.len());
    Ok(content)
}

pub async fn list(root: &Root, params: ListParams) -> Result<CallToolResult, McpError> {
    respond(list_entries(root, &params.path).await)
}

async fn list_entries(root: &Root, requested: &str) -> FsResult<ListResponse> {
    let path = root.resolve(requested)?;
    if !path.is_dir() {
        return Err(FsError::NotADirectory(requested.to_string()));
    }

    let mut entries = Vec::new();
    let mut dir = fs::read_dir(&path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let Ok(metadata) = fs::symlink_metadata(entry.path()).await else {
            continue;
        };
        let entry_type = entry_type(&metadata);
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            entry_type,
            size: (entry_type == EntryType::File).then_some(metadata.len()),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ListResponse {
        path: root.relative(&path),
        count: entries.len(),
        entries,
    })
}

pub async fn file_info(root: &Root, params: FileInfoParams) -> Result<CallToolResult, McpError> {
    respond(describe(root, &params.path).await)
}

async fn describe(root: &Root, requested: &str) -> FsResult<FileInfoResponse> {
    let path = root.resolve(requested)?;
    let metadata = fs::metadata(&path).await?;
    let modified: Option<DateTime<Utc>> = metadata.modified().ok().map(Into::into);

    Ok(FileInfoResponse {
        path: root.relative(&path),
        entry_type: entry_type(&metadata),
        size: metadata.len(),
        modified,
        readonly: metadata.permissions().readonly(),
    })
}
