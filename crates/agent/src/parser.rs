//! Tool-call extraction from free-form model output.
//!
//! The model invokes a tool by emitting a span of the form:
//!
//! ```text
//! <tool_call>name key="value" key2="value2" /></tool_call>
//! <tool_call>name key="value"</tool_call>
//! ```
//!
//! Only the first complete span in a reply is honored. Attribute values may
//! contain anything except an unescaped `"`; `\"` and `\\` are unescaped.

use apexclaw_core::tool::ToolArgs;
use regex_lite::Regex;
use std::sync::LazyLock;

const OPEN: &str = "<tool_call>";
const CLOSE: &str = "</tool_call>";
const SELF_CLOSE: &str = "/>";

static ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"((?:[^"\\]|\\.)*)""#).ok()
});

/// A tool call extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToolCall {
    pub name: String,
    pub args: ToolArgs,
}

impl ParsedToolCall {
    /// The arguments as a JSON object of string values.
    pub fn args_json(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_else(|_| "{}".into())
    }
}

/// Find the first tool call in `reply`.
pub fn parse_tool_call(reply: &str) -> Option<ParsedToolCall> {
    let mut search_from = 0;

    while let Some(offset) = reply[search_from..].find(OPEN) {
        let body_start = search_from + offset + OPEN.len();
        let body_len = scan_body(&reply[body_start..])?;
        let body = reply[body_start..body_start + body_len].trim();

        if let Some(call) = parse_body(body) {
            return Some(call);
        }
        search_from = body_start + body_len;
    }

    None
}

/// Length of the span body up to (not including) its terminator, skipping
/// terminators that appear inside quoted values.
fn scan_body(rest: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;

    for (i, c) in rest.char_indices() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }

        if c == '"' {
            in_quote = true;
        } else if rest[i..].starts_with(SELF_CLOSE) || rest[i..].starts_with(CLOSE) {
            return Some(i);
        }
    }

    None
}

fn parse_body(body: &str) -> Option<ParsedToolCall> {
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() || name.contains(['"', '=', '<', '>']) {
        return None;
    }

    Some(ParsedToolCall {
        name: name.to_string(),
        args: parse_attributes(&body[name_end..]),
    })
}

/// Decode every well-formed `key="value"` pair; anything else is skipped.
pub fn parse_attributes(text: &str) -> ToolArgs {
    let mut args = ToolArgs::new();
    let Some(re) = ATTRIBUTE.as_ref() else {
        return args;
    };

    for caps in re.captures_iter(text) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            args.insert(key.as_str().to_string(), unescape(value.as_str()));
        }
    }
    args
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a tool call in the grammar `parse_tool_call` accepts.
pub fn format_tool_call(name: &str, args: &ToolArgs) -> String {
    let mut out = format!("{OPEN}{name}");
    for (key, value) in args {
        out.push_str(&format!(" {key}=\"{}\"", escape(value)));
    }
    out.push(' ');
    out.push_str(SELF_CLOSE);
    out.push_str(CLOSE);
    out
}

/// Strip every `<think>…</think>` span and surrounding whitespace.
///
/// An unterminated `<think>` is left in place.
pub fn clean_reply(reply: &str) -> String {
    let mut text = reply.to_string();
    while let Some(start) = text.find("<think>") {
        let Some(rel_end) = text[start..].find("</think>") else {
            break;
        };
        text.replace_range(start..start + rel_end + "</think>".len(), "");
    }
    text.trim().to_string()
}
