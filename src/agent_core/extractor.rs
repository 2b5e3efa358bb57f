//! Tool-call extraction from free-form model text.
//!
//! Models announce tool calls in several incompatible ways. Each surface
//! syntax is a `CallMatcher`; the `Extractor` runs them in precedence order
//! and the first matcher that yields a resolved candidate wins:
//!
//! 1. `StructuredEnvelope`: a fenced ```` ```tool_call ```` block or a
//!    `<tool_call>…</tool_call>` tag holding a JSON-RPC `execute_tool` call
//! 2. `PseudoCall`: `get_weather("Paris")`, `search(query='rust')`
//! 3. `NaturalLanguageDirective`: `Using tool: calculate(expression=2+2)`
//! 4. `WeatherFallback`: a weather question with no explicit call
//!
//! Candidates are resolved against the catalog (unknown names are dropped)
//! and deduplicated by `RequestKey`, first occurrence wins.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::ExtractError;
use super::types::{SourceGrammar, ToolCallCandidate};
use super::weather_fallback::WeatherFallback;
use crate::mcp_client::catalog::{find_tool, find_tool_with_alias, Server};

/// Version string required in the envelope's `jsonrpc` / `protocolVersion`.
pub const ENVELOPE_VERSION: &str = "2.0";

/// The only method the envelope may carry.
pub const ENVELOPE_METHOD: &str = "execute_tool";

// ─── Matcher Strategy ───────────────────────────────────────────────────────

/// One surface syntax for tool calls.
///
/// `find` returns candidates already resolved against `catalog`, in the
/// order they appear in `text`.
pub trait CallMatcher: Send + Sync {
    fn grammar(&self) -> SourceGrammar;

    fn find(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate>;
}

// ─── Extractor ──────────────────────────────────────────────────────────────

pub struct Extractor {
    matchers: Vec<Box<dyn CallMatcher>>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::with_matchers(vec![
            Box::new(StructuredEnvelope),
            Box::new(PseudoCall),
            Box::new(NaturalLanguageDirective),
            Box::new(WeatherFallback),
        ])
    }
}

impl Extractor {
    /// Install a custom ordered matcher list (highest precedence first).
    pub fn with_matchers(matchers: Vec<Box<dyn CallMatcher>>) -> Self {
        Self { matchers }
    }

    /// All candidates from the highest-precedence matcher that found any.
    pub fn detect(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
        self.run(text, catalog, |_| true)
    }

    /// Like `detect`, restricted to matchers of one grammar.
    pub fn detect_grammar(
        &self,
        text: &str,
        catalog: &[Server],
        grammar: SourceGrammar,
    ) -> Vec<ToolCallCandidate> {
        self.run(text, catalog, |m| m.grammar() == grammar)
    }

    fn run(
        &self,
        text: &str,
        catalog: &[Server],
        enabled: impl Fn(&dyn CallMatcher) -> bool,
    ) -> Vec<ToolCallCandidate> {
        for matcher in &self.matchers {
            if !enabled(&**matcher) {
                continue;
            }
            let found = matcher.find(text, catalog);
            if !found.is_empty() {
                let candidates = dedup(found);
                tracing::debug!(
                    grammar = ?matcher.grammar(),
                    count = candidates.len(),
                    "tool call candidates detected"
                );
                return candidates;
            }
        }
        Vec::new()
    }
}

/// Drop candidates whose `RequestKey` was already seen.
fn dedup(candidates: Vec<ToolCallCandidate>) -> Vec<ToolCallCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.request_key()))
        .collect()
}

// ─── Resolution ─────────────────────────────────────────────────────────────

/// Resolve `name` to a catalog tool, or drop it.
///
/// `with_alias` also tries `get_<name>`.
pub(crate) fn resolve(
    catalog: &[Server],
    name: &str,
    args: Map<String, Value>,
    grammar: SourceGrammar,
    with_alias: bool,
) -> Option<ToolCallCandidate> {
    let tool = if with_alias {
        find_tool_with_alias(catalog, name)
    } else {
        find_tool(catalog, name)
    };

    match tool {
        Some(tool) => Some(ToolCallCandidate::new(&tool.name, args, grammar)),
        None => {
            tracing::debug!(tool = name, grammar = ?grammar, "discarding call to unknown tool");
            None
        }
    }
}

/// Compile a pattern once. A bad pattern disables its matcher instead of
/// panicking.
pub(crate) fn compiled(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid extractor pattern");
            None
        }
    })
    .as_ref()
}

// ─── 1. Structured Envelope ─────────────────────────────────────────────────

pub struct StructuredEnvelope;

impl CallMatcher for StructuredEnvelope {
    fn grammar(&self) -> SourceGrammar {
        SourceGrammar::Structured
    }

    fn find(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
        static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
        static TAGGED: OnceLock<Option<Regex>> = OnceLock::new();

        let patterns = [
            compiled(&FENCED, r"(?s)```tool_call[ \t]*\r?\n?(.*?)```"),
            compiled(&TAGGED, r"(?s)<tool_call>(.*?)</tool_call>"),
        ];

        let mut blocks: Vec<(usize, &str)> = Vec::new();
        for re in patterns.into_iter().flatten() {
            for caps in re.captures_iter(text) {
                if let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) {
                    blocks.push((whole.start(), body.as_str()));
                }
            }
        }
        blocks.sort_by_key(|(start, _)| *start);

        blocks
            .into_iter()
            .filter_map(|(_, body)| match parse_envelope(body) {
                Ok((name, args)) => resolve(catalog, &name, args, self.grammar(), false),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed tool_call block");
                    None
                }
            })
            .collect()
    }
}

/// Parse one envelope body into `(tool name, arguments)`.
pub fn parse_envelope(body: &str) -> Result<(String, Map<String, Value>), ExtractError> {
    let value: Value = serde_json::from_str(body.trim()).map_err(|e| ExtractError::InvalidJson {
        reason: e.to_string(),
    })?;
    let envelope = value.as_object().ok_or(ExtractError::NotAnObject)?;

    let version = envelope
        .get("jsonrpc")
        .or_else(|| envelope.get("protocolVersion"))
        .ok_or(ExtractError::MissingVersion)?;
    if version.as_str() != Some(ENVELOPE_VERSION) {
        return Err(ExtractError::WrongVersion {
            version: match version {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        });
    }

    let method = envelope
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if method != ENVELOPE_METHOD {
        return Err(ExtractError::WrongMethod {
            method: method.to_string(),
        });
    }

    let params = envelope.get("params").and_then(Value::as_object);
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ExtractError::MissingName)?;

    let args = match params.and_then(|p| p.get("parameters")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(ExtractError::InvalidParameters {
                found: json_type_name(other).to_string(),
            })
        }
    };

    Ok((name.to_string(), args))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── 2. Pseudo-call ─────────────────────────────────────────────────────────

pub struct PseudoCall;

impl CallMatcher for PseudoCall {
    fn grammar(&self) -> SourceGrammar {
        SourceGrammar::PseudoCall
    }

    fn find(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
        static CALL: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = compiled(
            &CALL,
            r#"\b([A-Za-z_][A-Za-z0-9_]*)\(\s*(?:([A-Za-z_][A-Za-z0-9_]*)\s*=\s*)?(?:"([^"]*)"|'([^']*)')\s*\)"#,
        ) else {
            return Vec::new();
        };

        re.captures_iter(text)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str();
                let value = caps.get(3).or_else(|| caps.get(4))?.as_str();
                let key = caps
                    .get(2)
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_else(|| infer_argument_key(name).to_string());

                let mut args = Map::new();
                args.insert(key, Value::String(value.to_string()));
                resolve(catalog, name, args, self.grammar(), true)
            })
            .collect()
    }
}

/// Argument name for a pseudo-call that gave only a value.
pub fn infer_argument_key(tool_name: &str) -> &'static str {
    let lower = tool_name.to_lowercase();
    if lower.contains("weather") {
        "location"
    } else if lower.contains("calculate") {
        "expression"
    } else {
        "query"
    }
}

// ─── 3. Natural-language Directive ──────────────────────────────────────────

pub struct NaturalLanguageDirective;

impl CallMatcher for NaturalLanguageDirective {
    fn grammar(&self) -> SourceGrammar {
        SourceGrammar::NaturalLanguage
    }

    fn find(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
        static DIRECTIVE: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(re) = compiled(
            &DIRECTIVE,
            r"(?i)using\s+tool:\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\(",
        ) else {
            return Vec::new();
        };

        re.captures_iter(text)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str();
                let rest = &text[caps.get(0)?.end()..];
                let Some(parts) = split_directive_args(rest) else {
                    tracing::debug!(tool = name, "directive has no closing parenthesis on its line");
                    return None;
                };
                resolve(catalog, name, parse_directive_args(&parts), self.grammar(), false)
            })
            .collect()
    }
}

/// Split the argument list that follows `name(` into raw `k=v` pieces.
///
/// Stops at the `)` that closes the call, so nested parentheses stay inside
/// a value. Commas and parentheses inside a quoted value are literal; a
/// quote only opens right after `(`, `=` or `,`. `None` if the call is not
/// closed before the end of the line.
fn split_directive_args(rest: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev = '(';
    let mut start = 0;

    for (i, c) in rest.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
                prev = c;
            }
            continue;
        }
        match c {
            '"' | '\'' if matches!(prev, '(' | '=' | ',') => quote = Some(c),
            '(' => depth += 1,
            ')' if depth == 0 => {
                parts.push(&rest[start..i]);
                return Some(parts);
            }
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&rest[start..i]);
                start = i + 1;
            }
            '\n' => return None,
            _ => {}
        }
        if !c.is_whitespace() {
            prev = c;
        }
    }
    None
}

/// `k=v` pieces into a map of strings. Pieces without `=` are ignored.
fn parse_directive_args(parts: &[&str]) -> Map<String, Value> {
    parts
        .iter()
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = strip_quotes(key.trim());
            if key.is_empty() {
                return None;
            }
            Some((
                key.to_string(),
                Value::String(strip_quotes(value.trim()).to_string()),
            ))
        })
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::catalog::server;
    use serde_json::json;

    fn catalog() -> Vec<Server> {
        vec![
            server("weather", &["get_weather", "get_alerts"]),
            server("math", &["calculate"]),
            server("web", &["search"]),
        ]
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_structured_tag_block() {
        let text = r#"Let me check.
<tool_call>{"jsonrpc":"2.0","id":"1","method":"execute_tool","params":{"name":"get_weather","parameters":{"location":"Seattle"}}}</tool_call>"#;
        let found = Extractor::default().detect(text, &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "get_weather");
        assert_eq!(found[0].args, args(json!({"location": "Seattle"})));
        assert_eq!(found[0].source_grammar, SourceGrammar::Structured);
    }

    #[test]
    fn test_structured_fenced_block_with_protocol_version() {
        let text = "```tool_call\n{\"protocolVersion\":\"2.0\",\"method\":\"execute_tool\",\"params\":{\"name\":\"calculate\",\"parameters\":{\"expression\":\"6*7\"}}}\n```";
        let found = Extractor::default().detect(text, &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "calculate");
        assert_eq!(found[0].args, args(json!({"expression": "6*7"})));
    }

    #[test]
    fn test_structured_duplicates_collapse_regardless_of_key_order() {
        let text = r#"
<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"search","parameters":{"query":"rust","limit":5}}}</tool_call>
<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"search","parameters":{"limit":5,"query":"rust"}}}</tool_call>"#;
        let found = Extractor::default().detect(text, &catalog());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_structured_keeps_block_order() {
        let text = r#"
<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"calculate","parameters":{"expression":"1+1"}}}</tool_call>
```tool_call
{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"search","parameters":{"query":"x"}}}
```"#;
        let found = Extractor::default().detect(text, &catalog());
        let names: Vec<&str> = found.iter().map(|c| c.tool_name.as_str()).collect();
        assert_eq!(names, vec!["calculate", "search"]);
    }

    #[test]
    fn test_structured_bad_block_is_skipped_and_scan_continues() {
        let text = r#"
<tool_call>{not json}</tool_call>
<tool_call>{"jsonrpc":"1.0","method":"execute_tool","params":{"name":"search"}}</tool_call>
<tool_call>{"jsonrpc":"2.0","method":"run","params":{"name":"search"}}</tool_call>
<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"search"}}</tool_call>"#;
        let found = Extractor::default().detect(text, &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "search");
        assert!(found[0].args.is_empty());
    }

    #[test]
    fn test_parse_envelope_errors() {
        assert!(matches!(
            parse_envelope("[1,2]"),
            Err(ExtractError::NotAnObject)
        ));
        assert_eq!(
            parse_envelope(r#"{"method":"execute_tool","params":{"name":"x"}}"#),
            Err(ExtractError::MissingVersion)
        );
        assert_eq!(
            parse_envelope(r#"{"jsonrpc":2.0,"method":"execute_tool","params":{"name":"x"}}"#),
            Err(ExtractError::WrongVersion {
                version: "2.0".into()
            })
        );
        assert_eq!(
            parse_envelope(r#"{"jsonrpc":"2.0","method":"execute_tool","params":{}}"#),
            Err(ExtractError::MissingName)
        );
        assert_eq!(
            parse_envelope(
                r#"{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"x","parameters":"Paris"}}"#
            ),
            Err(ExtractError::InvalidParameters {
                found: "string".into()
            })
        );
    }

    #[test]
    fn test_structured_unknown_tool_discarded() {
        let text = r#"<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"launch_rocket"}}</tool_call>"#;
        assert!(Extractor::default().detect(text, &catalog()).is_empty());
    }

    #[test]
    fn test_structured_wins_over_pseudo_call() {
        let text = r#"I could call search("rust") but instead:
<tool_call>{"jsonrpc":"2.0","method":"execute_tool","params":{"name":"calculate","parameters":{"expression":"2+2"}}}</tool_call>"#;
        let found = Extractor::default().detect(text, &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "calculate");
        assert_eq!(found[0].source_grammar, SourceGrammar::Structured);
    }

    #[test]
    fn test_pseudo_call_inferred_keys_and_alias() {
        let found = Extractor::default().detect(r#"weather("Paris") then calculate('3*3')"#, &catalog());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].tool_name, "get_weather");
        assert_eq!(found[0].args, args(json!({"location": "Paris"})));
        assert_eq!(found[1].args, args(json!({"expression": "3*3"})));
        assert_eq!(found[1].source_grammar, SourceGrammar::PseudoCall);
    }

    #[test]
    fn test_pseudo_call_explicit_key() {
        let found = Extractor::default().detect(r#"search(topic="tokio")"#, &catalog());
        assert_eq!(found[0].args, args(json!({"topic": "tokio"})));
    }

    #[test]
    fn test_infer_argument_key() {
        assert_eq!(infer_argument_key("get_weather"), "location");
        assert_eq!(infer_argument_key("Calculate"), "expression");
        assert_eq!(infer_argument_key("search"), "query");
    }

    #[test]
    fn test_directive() {
        let found = Extractor::default().detect("Using tool: calculate(expression=2+2)", &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "calculate");
        assert_eq!(found[0].args, args(json!({"expression": "2+2"})));
        assert_eq!(found[0].source_grammar, SourceGrammar::NaturalLanguage);
    }

    #[test]
    fn test_directive_multiple_args_stripped_quotes() {
        let found = Extractor::default().detect(
            "using tool: search(query='rust async', limit=5, junk)",
            &catalog(),
        );
        assert_eq!(found[0].args, args(json!({"query": "rust async", "limit": "5"})));
    }

    #[test]
    fn test_directive_nested_parentheses() {
        let found = Extractor::default()
            .detect("Using tool: calculate(expression=(2+3)*4) to get the total", &catalog());
        assert_eq!(found[0].args, args(json!({"expression": "(2+3)*4"})));
    }

    #[test]
    fn test_directive_comma_inside_quotes() {
        let found = Extractor::default().detect(
            r#"Using tool: search(query="rust, tokio", limit=5)"#,
            &catalog(),
        );
        assert_eq!(found[0].args, args(json!({"query": "rust, tokio", "limit": "5"})));
    }

    #[test]
    fn test_directive_unclosed_is_ignored() {
        assert!(Extractor::default()
            .detect("Using tool: search(query=rust\nmore text)", &[server("web", &["search"])])
            .is_empty());
    }

    #[test]
    fn test_split_directive_args() {
        assert_eq!(split_directive_args("a=1, b='x)y')"), Some(vec!["a=1", " b='x)y'"]));
        assert_eq!(split_directive_args(")"), Some(vec![""]));
        assert_eq!(split_directive_args("a=(1"), None);
    }

    #[test]
    fn test_no_tool_call_no_weather() {
        assert!(Extractor::default()
            .detect("Hello! How can I help you today?", &catalog())
            .is_empty());
    }

    #[test]
    fn test_weather_fallback_through_extractor() {
        let found = Extractor::default().detect("What's the weather in Paris?", &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "get_weather");
        assert_eq!(found[0].args, args(json!({"location": "Paris"})));
        assert_eq!(found[0].source_grammar, SourceGrammar::DomainFallback);
    }

    #[test]
    fn test_weather_fallback_suppressed_by_explicit_call() {
        let found = Extractor::default()
            .detect("The weather in Oslo needs search(\"oslo news\")", &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "search");
    }

    #[test]
    fn test_detect_grammar_restricts_matchers() {
        let extractor = Extractor::default();
        let text = "Using tool: calculate(expression=1) and the weather in Rome";
        let fallback = extractor.detect_grammar(text, &catalog(), SourceGrammar::DomainFallback);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].tool_name, "get_weather");
    }

    struct Always(&'static str);

    impl CallMatcher for Always {
        fn grammar(&self) -> SourceGrammar {
            SourceGrammar::NaturalLanguage
        }

        fn find(&self, _text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
            resolve(catalog, self.0, Map::new(), self.grammar(), false)
                .into_iter()
                .collect()
        }
    }

    #[test]
    fn test_custom_matcher_order() {
        let extractor = Extractor::with_matchers(vec![
            Box::new(Always("launch_rocket")),
            Box::new(Always("search")),
            Box::new(StructuredEnvelope),
        ]);
        let found = extractor.detect("anything", &catalog());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "search");
    }
}
