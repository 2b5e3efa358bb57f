//! Weather domain fallback.
//!
//! Small models often answer "let me check the weather in Paris" without
//! emitting any call. When no explicit call was found, the text mentions
//! weather and the catalog has a weather tool, the location is pulled out of
//! the text and turned into a call.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::extractor::{compiled, CallMatcher};
use super::types::{SourceGrammar, ToolCallCandidate};
use crate::mcp_client::catalog::{find_tool_containing, Server};

/// Argument name the fallback fills in.
pub const LOCATION_ARG: &str = "location";

/// Longest accepted location; anything longer is a sentence, not a place.
const MAX_LOCATION_CHARS: usize = 60;

/// Place names longer than this many words are cut.
const MAX_PLACE_WORDS: usize = 4;

/// Words allowed between `weather`/`forecast` and the preposition
/// ("weather *will be like* in Tokyo").
const MAX_GAP_WORDS: usize = 3;

/// Words the location patterns catch that are not places.
const NOT_A_PLACE: &[&str] = &[
    "me", "you", "him", "her", "them", "us", "it", "there", "here", "that", "this",
    "my area", "your area", "the area", "my location", "your location",
];

/// A place name ends before any of these.
const STOP_WORDS: &[&str] = &[
    "today", "tomorrow", "tonight", "now", "right", "currently", "later", "this", "next",
    "for", "like", "please", "me", "be", "going", "to", "and", "or", "on", "in", "at",
    "with", "will", "is", "are", "was", "so", "then", "thanks",
];

/// Trailing characters that close a clause; the word before them is the last one.
const CLAUSE_END: &[char] = &['?', '!', '.', ',', ';', ':', '"', '\'', ')'];

pub struct WeatherFallback;

impl CallMatcher for WeatherFallback {
    fn grammar(&self) -> SourceGrammar {
        SourceGrammar::DomainFallback
    }

    fn find(&self, text: &str, catalog: &[Server]) -> Vec<ToolCallCandidate> {
        if !text.to_lowercase().contains("weather") {
            return Vec::new();
        }
        let Some(tool) = find_tool_containing(catalog, "weather") else {
            return Vec::new();
        };
        let Some(location) = extract_location(text) else {
            tracing::debug!(tool = %tool.name, "weather mentioned but no location found");
            return Vec::new();
        };

        let mut args = Map::new();
        args.insert(LOCATION_ARG.to_string(), Value::String(location));
        vec![ToolCallCandidate::new(&tool.name, args, self.grammar())]
    }
}

/// Find a location in `text`.
///
/// The whole text is tried after `weather`/`forecast` first; then an
/// embedded `User message:` fragment is tried the same way and, failing
/// that, after any bare preposition.
pub fn extract_location(text: &str) -> Option<String> {
    if let Some(found) = after_anchor(text) {
        return Some(found);
    }
    let fragment = user_message_fragment(text)?;
    after_anchor(fragment).or_else(|| after_any_preposition(fragment))
}

fn preposition() -> Option<&'static Regex> {
    static PREPOSITION: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&PREPOSITION, r"(?i)\b(?:in|for|at|near|around)\s+")
}

/// `weather [up to three words] <preposition> <place>`.
fn after_anchor(text: &str) -> Option<String> {
    static ANCHOR: OnceLock<Option<Regex>> = OnceLock::new();
    let anchor = compiled(&ANCHOR, r"(?i)\b(?:weather|forecast)\b")?;
    let preposition = preposition()?;

    for found in anchor.find_iter(text) {
        let tail = &text[found.end()..];
        for prep in preposition.find_iter(tail) {
            let gap = &tail[..prep.start()];
            if gap.contains(|c: char| CLAUSE_END.contains(&c) || c == '\n')
                || gap.split_whitespace().count() > MAX_GAP_WORDS
            {
                break;
            }
            if let Some(place) = place_after(&tail[prep.end()..]) {
                return Some(place);
            }
        }
    }
    None
}

fn after_any_preposition(text: &str) -> Option<String> {
    preposition()?
        .find_iter(text)
        .find_map(|prep| place_after(&text[prep.end()..]))
}

/// The run of place-like words at the start of `rest`, up to a stop word,
/// a clause end or the end of the line.
fn place_after(rest: &str) -> Option<String> {
    let line = rest.lines().next().unwrap_or_default();
    let mut words = Vec::new();
    for token in line.split_whitespace() {
        let word = token.trim_end_matches(CLAUSE_END);
        if !is_place_word(word) || STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            break;
        }
        words.push(word);
        if word.len() != token.len() || words.len() == MAX_PLACE_WORDS {
            break;
        }
    }

    let place = clean_location(&words.join(" "));
    is_plausible_location(&place).then_some(place)
}

/// Letters in any script, plus the joiners found in place names.
fn is_place_word(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_alphabetic)
        && word
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | '.'))
}

fn is_plausible_location(loc: &str) -> bool {
    !loc.is_empty()
        && loc.chars().count() <= MAX_LOCATION_CHARS
        && !NOT_A_PLACE.contains(&loc.to_lowercase().as_str())
}

/// The rest of the line after `User message:`.
fn user_message_fragment(text: &str) -> Option<&str> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = compiled(&MARKER, r"(?i)user message:\s*([^\n]+)")?;
    let fragment = re.captures(text)?.get(1)?.as_str();
    Some(fragment.trim().trim_matches(|c| c == '"' || c == '\''))
}

fn clean_location(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(|c: char| c == '.' || c == '\'' || c == '-' || c.is_whitespace())
        .to_string()
}
