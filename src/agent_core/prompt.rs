//! System prompt built from the live catalog.

use super::extractor::{ENVELOPE_METHOD, ENVELOPE_VERSION};
use crate::mcp_client::catalog::{Server, Tool};

const INTRO: &str = "You are a helpful assistant running on the user's machine.";

/// Build the system message for a turn.
///
/// Lists every server's tools with their parameters, then explains the
/// `<tool_call>` envelope. With an empty catalog the model is told to answer
/// directly.
pub fn build_system_prompt(catalog: &[Server]) -> String {
    let servers: Vec<&Server> = catalog.iter().filter(|s| !s.tools.is_empty()).collect();
    if servers.is_empty() {
        return format!(
            "{INTRO}\n\nNo tools are available in this session. Answer from your own knowledge \
             and do not emit tool calls."
        );
    }

    let mut sections = Vec::with_capacity(servers.len());
    for server in &servers {
        let mut lines = vec![match server.description.trim() {
            "" => format!("## {}", server.name),
            desc => format!("## {} ({desc})", server.name),
        }];
        lines.extend(server.tools.iter().map(describe_tool));
        sections.push(lines.join("\n"));
    }

    let example_tool = servers
        .first()
        .and_then(|s| s.tools.first())
        .map(|t| t.name.as_str())
        .unwrap_or("tool_name");

    format!(
        "{INTRO} You can call the tools below.\n\n\
         # Available tools\n\n{tools}\n\n\
         # Calling a tool\n\n\
         To call a tool, reply with a single block of this exact form:\n\n\
         <tool_call>{{\"jsonrpc\":\"{ENVELOPE_VERSION}\",\"id\":\"1\",\"method\":\"{ENVELOPE_METHOD}\",\
         \"params\":{{\"name\":\"{example_tool}\",\"parameters\":{{...}}}}}}</tool_call>\n\n\
         Rules:\n\
         - Call at most one tool per reply.\n\
         - Use only the tool names listed above and fill in their parameters.\n\
         - After the result comes back, answer the user in plain language.\n\
         - If no tool is needed, just answer.",
        tools = sections.join("\n\n"),
    )
}

fn describe_tool(tool: &Tool) -> String {
    let mut line = format!("- {}", tool.name);
    if !tool.description.is_empty() {
        line.push_str(": ");
        line.push_str(&tool.description);
    }
    for param in &tool.parameters {
        let required = if param.required { "required" } else { "optional" };
        line.push_str(&format!("\n    - {} ({}, {required})", param.name, param.param_type));
        if !param.description.is_empty() {
            line.push_str(&format!(": {}", param.description));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::catalog::{server, ToolParameter};

    #[test]
    fn test_empty_catalog() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("No tools are available"));
        assert!(!prompt.contains("<tool_call>"));
    }

    #[test]
    fn test_server_without_tools_counts_as_empty() {
        let prompt = build_system_prompt(&[server("idle", &[])]);
        assert!(prompt.contains("No tools are available"));
    }

    #[test]
    fn test_lists_tools_and_parameters() {
        let mut weather = server("weather", &["get_weather"]);
        weather.description = "Forecasts".to_string();
        weather.tools[0].description = "Current conditions".to_string();
        weather.tools[0].parameters = vec![ToolParameter {
            name: "location".to_string(),
            param_type: "string".to_string(),
            required: true,
            description: "City name".to_string(),
        }];

        let prompt = build_system_prompt(&[weather, server("math", &["calculate"])]);
        assert!(prompt.contains("(Forecasts)"));
        assert!(prompt.contains("- get_weather: Current conditions"));
        assert!(prompt.contains("- location (string, required): City name"));
        assert!(prompt.contains("- calculate"));
        assert!(prompt.contains(r#""method":"execute_tool""#));
        assert!(prompt.contains(r#""name":"get_weather""#));
        assert!(prompt.contains("at most one tool per reply"));
    }
}
