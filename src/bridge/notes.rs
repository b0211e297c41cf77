//! Sample vault tools
//!
//! Interface-level stand-ins for the real vault host: the handlers
//! operate on an in-memory note map behind the same `ToolHandler`
//! seam the host plugs into. The bridge binary registers these so
//! the served tool set is non-empty out of the box.

use crate::model::ToolSource;
use crate::registry::executor::{HostContext, ToolOutput, handler_fn};
use crate::registry::{ToolDefinition, ToolRegistry};
use crate::{NotegateError, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory note store shared by the sample tools
#[derive(Default)]
pub struct NoteVault {
    notes: RwLock<HashMap<String, String>>,
}

impl NoteVault {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed the vault with a starter note set
    pub fn with_samples() -> Arc<Self> {
        let vault = Self::default();
        {
            let mut notes = vault.notes.write();
            notes.insert(
                "welcome.md".to_string(),
                "# Welcome\n\nThis vault is served by notegate.".to_string(),
            );
            notes.insert(
                "daily/2026-08-01.md".to_string(),
                "# Daily note\n\n- [ ] wire up the gateway".to_string(),
            );
        }
        Arc::new(vault)
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.notes.read().get(path).cloned()
    }

    pub fn write(&self, path: &str, content: &str) {
        self.notes
            .write()
            .insert(path.to_string(), content.to_string());
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.notes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        let mut hits: Vec<String> = self
            .notes
            .read()
            .iter()
            .filter(|(path, content)| {
                path.to_lowercase().contains(&query) || content.to_lowercase().contains(&query)
            })
            .map(|(path, _)| path.clone())
            .collect();
        hits.sort();
        hits
    }
}

fn string_arg(arguments: &Map<String, Value>, key: &str) -> Result<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| NotegateError::validation(format!("{} must be a string", key)))
}

/// Register the sample note tools against a registry
pub fn register_note_tools(registry: &ToolRegistry, vault: Arc<NoteVault>) -> Result<()> {
    let read_vault = vault.clone();
    registry.register(
        ToolDefinition {
            name: "read_note".to_string(),
            description: "Read a note from the vault by path".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string", "description": "Vault-relative note path"}},
                "required": ["path"],
            }),
            handler: handler_fn(move |arguments: Map<String, Value>, _ctx: HostContext| {
                let vault = read_vault.clone();
                async move {
                    let path = string_arg(&arguments, "path")?;
                    match vault.read(&path) {
                        Some(content) => Ok(ToolOutput::text(content)),
                        None => Ok(ToolOutput::error(format!("Note not found: {}", path))),
                    }
                }
            }),
        },
        ToolSource::Builtin,
    )?;

    let edit_vault = vault.clone();
    registry.register(
        ToolDefinition {
            name: "edit_note".to_string(),
            description: "Replace the content of a note".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Vault-relative note path"},
                    "content": {"type": "string", "description": "New note content"},
                },
                "required": ["path", "content"],
            }),
            handler: handler_fn(move |arguments: Map<String, Value>, _ctx: HostContext| {
                let vault = edit_vault.clone();
                async move {
                    let path = string_arg(&arguments, "path")?;
                    let content = string_arg(&arguments, "content")?;
                    vault.write(&path, &content);
                    Ok(ToolOutput::text(format!("Updated {}", path)))
                }
            }),
        },
        ToolSource::Builtin,
    )?;

    let list_vault = vault.clone();
    registry.register(
        ToolDefinition {
            name: "list_notes".to_string(),
            description: "List all note paths in the vault".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            handler: handler_fn(move |_arguments: Map<String, Value>, _ctx: HostContext| {
                let vault = list_vault.clone();
                async move { Ok(ToolOutput::text(vault.paths().join("\n"))) }
            }),
        },
        ToolSource::Builtin,
    )?;

    registry.register(
        ToolDefinition {
            name: "search_notes".to_string(),
            description: "Search note paths and contents".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"query": {"type": "string", "description": "Case-insensitive query"}},
                "required": ["query"],
            }),
            handler: handler_fn(move |arguments: Map<String, Value>, _ctx: HostContext| {
                let vault = vault.clone();
                async move {
                    let query = string_arg(&arguments, "query")?;
                    let hits = vault.search(&query);
                    if hits.is_empty() {
                        Ok(ToolOutput::text("No matches"))
                    } else {
                        Ok(ToolOutput::text(hits.join("\n")))
                    }
                }
            }),
        },
        ToolSource::Builtin,
    )?;

    Ok(())
}
