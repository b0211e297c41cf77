//! Tool registry
//!
//! One in-memory registry backs both the MCP surface and the legacy
//! v1 REST surface, so the two always serve the identical tool set.
//! The registry maintains a canonical fingerprint over the set; the
//! fingerprint changes exactly when the observable tool set changes.

pub mod executor;

pub use executor::{
    HandlerFn, HostContext, PreconditionState, SharedPreconditions, ToolExecutor, ToolHandler,
    ToolOutput, handler_fn,
};

use crate::model::{ToolDescriptor, ToolSource};
use crate::{NotegateError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// A registered tool: wire descriptor plus its handler
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Wire form served by `tools/list` and `GET /bridge/v1/tools`
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

struct RegisteredTool {
    definition: Arc<ToolDefinition>,
    #[allow(dead_code)]
    source: ToolSource,
}

/// In-memory tool registry with fingerprint change detection
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    fingerprint: watch::Sender<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let (fingerprint, _) = watch::channel(fingerprint_tools(&[]));
        Self {
            tools: RwLock::new(HashMap::new()),
            fingerprint,
        }
    }

    /// Register a tool definition under a source tag.
    ///
    /// Names are unique across sources; a duplicate is rejected with a
    /// distinct error so loaders can tell collisions from bad input.
    pub fn register(&self, definition: ToolDefinition, source: ToolSource) -> Result<()> {
        if definition.name.is_empty() || definition.name.contains(char::is_whitespace) {
            return Err(NotegateError::validation(format!(
                "invalid tool name: {:?}",
                definition.name
            )));
        }

        {
            let mut tools = self.tools.write();
            if tools.contains_key(&definition.name) {
                return Err(NotegateError::DuplicateTool {
                    name: definition.name,
                });
            }
            tools.insert(
                definition.name.clone(),
                RegisteredTool {
                    definition: Arc::new(definition),
                    source,
                },
            );
        }

        self.publish_fingerprint();
        Ok(())
    }

    /// Remove a tool by name; an absent name is a no-op.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.tools.write().remove(name).is_some();
        if removed {
            self.publish_fingerprint();
        }
        removed
    }

    /// Current tools in stable name order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.read();
        let mut descriptors: Vec<ToolDescriptor> = tools
            .values()
            .map(|tool| tool.definition.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Look up a tool definition by name
    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.tools.read().get(name).map(|t| t.definition.clone())
    }

    /// Current fingerprint over the tool set
    pub fn fingerprint(&self) -> String {
        self.fingerprint.borrow().clone()
    }

    /// Subscribe to fingerprint changes (for listChanged fan-out)
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.fingerprint.subscribe()
    }

    fn publish_fingerprint(&self) {
        let next = fingerprint_tools(&self.list());
        // send_if_modified keeps the watch quiet when the set is unchanged
        self.fingerprint.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint a tool set: each tool canonicalised to
/// `{name, description, inputSchema}` with recursive key sort, JSON
/// encoded without insignificant whitespace, concatenated in name
/// order, SHA-256 hashed and rendered as lowercase hex.
pub fn fingerprint_tools(descriptors: &[ToolDescriptor]) -> String {
    let mut sorted: Vec<&ToolDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for descriptor in sorted {
        let mut canonical = String::new();
        canonical_json(
            &serde_json::json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "inputSchema": descriptor.input_schema,
            }),
            &mut canonical,
        );
        hasher.update(canonical.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Serialise a JSON value with object keys sorted recursively and no
/// insignificant whitespace.
fn canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                canonical_json(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
