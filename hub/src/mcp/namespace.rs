//! Tool namespacing and provider-specific tool declarations
//!
//! Tools from every connected server are flattened into one catalog. Each
//! tool is exposed to the model as `{server}__{tool}` and its description is
//! prefixed with `[{server}]`, so two servers exposing the same tool name
//! never collide.
//!
//! Reversal splits on the first `__`. Server names are validated at connect
//! time so that the first separator is always the join point:
//!
//! | Namespaced | Server | Tool |
//! |------------|--------|------|
//! | `fs__read_file` | fs | read_file |
//! | `git__list` | git | list |
//! | `db__raw__query` | db | raw__query |

use std::collections::HashMap;

use serde_json::{json, Value};

use super::types::ToolDescriptor;
use crate::error::SessionError;

/// Separator between server and tool name
pub const SEPARATOR: &str = "__";

/// Build the namespaced id for a tool
pub fn join(server: &str, tool: &str) -> String {
    format!("{}{}{}", server, SEPARATOR, tool)
}

/// Split a namespaced id on the first separator
pub fn reverse(namespaced: &str) -> Option<(&str, &str)> {
    let (server, tool) = namespaced.split_once(SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// Reject server names that would make namespaced ids ambiguous
///
/// Names must be non-empty, use only ASCII alphanumerics, `-` and `_`, must
/// not contain the separator and must not end with `_` (otherwise
/// `a_` + `__` + `b` would split as `a` / `_b`).
pub fn validate_server_name(name: &str) -> Result<(), SessionError> {
    let invalid = |reason: &str| SessionError::InvalidServerName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(invalid(&format!("character '{}' is not allowed", c)));
    }
    if name.contains(SEPARATOR) {
        return Err(invalid("name contains the '__' namespace separator"));
    }
    if name.ends_with('_') {
        return Err(invalid("name ends with '_'"));
    }
    Ok(())
}

/// Wire format of tool declarations expected by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    /// OpenAI chat completions function tools
    OpenAi,
    /// Ollama `/api/chat` tools (OpenAI shape, simplified schemas)
    Ollama,
    /// Anthropic messages API tools
    Anthropic,
}

/// A catalog entry resolved from a namespaced id
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub namespaced: String,
    pub server_name: String,
    pub tool_name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Flat, collision-free set of tools built for one orchestration call
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<ResolvedTool>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build the catalog from session snapshots
    pub fn build(tools: &[ToolDescriptor]) -> Self {
        let mut catalog = Self::default();

        for tool in tools {
            let namespaced = join(&tool.server_name, &tool.name);
            if catalog.index.contains_key(&namespaced) {
                tracing::warn!("Duplicate tool '{}' ignored", namespaced);
                continue;
            }

            let description = match tool.description.as_deref() {
                Some(d) if !d.is_empty() => format!("[{}] {}", tool.server_name, d),
                _ => format!("[{}]", tool.server_name),
            };

            catalog.index.insert(namespaced.clone(), catalog.entries.len());
            catalog.entries.push(ResolvedTool {
                namespaced,
                server_name: tool.server_name.clone(),
                tool_name: tool.name.clone(),
                description,
                input_schema: tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            });
        }

        catalog
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Namespaced ids in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.namespaced.as_str())
    }

    /// Reverse a namespaced id; only ids present in the catalog resolve
    pub fn resolve(&self, namespaced: &str) -> Option<&ResolvedTool> {
        let (server, tool) = reverse(namespaced)?;
        self.index
            .get(namespaced)
            .map(|&i| &self.entries[i])
            .filter(|e| e.server_name == server && e.tool_name == tool)
    }

    /// Render declarations in a provider's format
    pub fn declarations(&self, format: ToolFormat) -> Vec<Value> {
        self.entries
            .iter()
            .map(|entry| match format {
                ToolFormat::OpenAi => json!({
                    "type": "function",
                    "function": {
                        "name": entry.namespaced,
                        "description": entry.description,
                        "parameters": entry.input_schema,
                    }
                }),
                ToolFormat::Ollama => json!({
                    "type": "function",
                    "function": {
                        "name": entry.namespaced,
                        "description": entry.description,
                        "parameters": clean_schema_for_ollama(&entry.input_schema),
                    }
                }),
                ToolFormat::Anthropic => json!({
                    "name": entry.namespaced,
                    "description": entry.description,
                    "input_schema": entry.input_schema,
                }),
            })
            .collect()
    }
}

/// Strip schema keys that confuse Ollama models
pub fn clean_schema_for_ollama(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => {
            let mut cleaned = serde_json::Map::new();
            for (key, value) in obj {
                if key == "$schema" || key == "title" || key == "additionalProperties" {
                    continue;
                }
                cleaned.insert(key.clone(), clean_schema_for_ollama(value));
            }
            Value::Object(cleaned)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(clean_schema_for_ollama).collect()),
        other => other.clone(),
    }
}
