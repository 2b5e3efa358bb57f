//! Tool catalog view: the read-only server/tool snapshot used per turn.
//!
//! Provides:
//! - The `Server` / `Tool` / `ToolParameter` records handed to the engine
//! - Conversion from an MCP `inputSchema` into an ordered parameter list
//! - Lookup helpers: exact name, `get_`-prefixed alias, owning server

use serde::{Deserialize, Serialize};

use super::types::McpToolDefinition;

/// Prefix tried when a pseudo-call names `weather(...)` but the tool is `get_weather`.
pub const ALIAS_PREFIX: &str = "get_";

// ─── Records ────────────────────────────────────────────────────────────────

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// A named remote operation exposed by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl Tool {
    /// Build a tool from an MCP definition, flattening the JSON Schema
    /// `properties` (declaration order) and `required` list.
    pub fn from_definition(def: &McpToolDefinition) -> Self {
        let required: Vec<&str> = def
            .input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = def
            .input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| ToolParameter {
                        name: name.clone(),
                        param_type: schema
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("string")
                            .to_string(),
                        required: required.contains(&name.as_str()),
                        description: schema
                            .get("description")
                            .and_then(|d| d.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: def.name.clone(),
            description: def.description.trim().to_string(),
            parameters,
        }
    }
}

/// A collection of tools reachable through one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

// ─── Lookup ─────────────────────────────────────────────────────────────────

/// Find a tool by exact name across every server, first server wins.
pub fn find_tool<'a>(catalog: &'a [Server], name: &str) -> Option<&'a Tool> {
    catalog
        .iter()
        .flat_map(|server| server.tools.iter())
        .find(|tool| tool.name == name)
}

/// Find a tool by exact name, then by its `get_`-prefixed alias.
pub fn find_tool_with_alias<'a>(catalog: &'a [Server], name: &str) -> Option<&'a Tool> {
    find_tool(catalog, name).or_else(|| {
        if name.starts_with(ALIAS_PREFIX) {
            None
        } else {
            find_tool(catalog, &format!("{ALIAS_PREFIX}{name}"))
        }
    })
}

/// The first tool whose name contains `needle` (case-insensitive).
pub fn find_tool_containing<'a>(catalog: &'a [Server], needle: &str) -> Option<&'a Tool> {
    let needle = needle.to_lowercase();
    catalog
        .iter()
        .flat_map(|server| server.tools.iter())
        .find(|tool| tool.name.to_lowercase().contains(&needle))
}

/// The server that owns `tool_name`.
pub fn server_for_tool<'a>(catalog: &'a [Server], tool_name: &str) -> Option<&'a Server> {
    catalog
        .iter()
        .find(|server| server.tools.iter().any(|tool| tool.name == tool_name))
}

/// Total number of tools across all servers.
pub fn tool_count(catalog: &[Server]) -> usize {
    catalog.iter().map(|server| server.tools.len()).sum()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) fn tool(name: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: String::new(),
        parameters: Vec::new(),
    }
}

#[cfg(test)]
pub(crate) fn server(id: &str, tools: &[&str]) -> Server {
    Server {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        tools: tools.iter().map(|name| tool(name)).collect(),
    }
}
