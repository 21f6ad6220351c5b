//! Out-of-band markers carried on the stream callback.
//!
//! Besides the final reply, a streaming run may push control chunks to its
//! callback: tool-phase markers around each tool execution and progress
//! sentinels from long-running tools. Dispatchers must not render these as
//! user-visible text; `is_control_chunk` tells them apart.

use serde::{Deserialize, Serialize};
use std::fmt;

const TOOL_CALL_PREFIX: &str = "__TOOL_CALL:";
const TOOL_RESULT_PREFIX: &str = "__TOOL_RESULT:";
const PROGRESS_PREFIX: &str = "\u{0}PROGRESS:";

const MAX_MESSAGE_CHARS: usize = 200;
const MAX_DETAIL_CHARS: usize = 500;

/// Payload of a progress sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub message: String,
    pub percent: u8,
    pub state: String,
    #[serde(default)]
    pub detail: String,
}

impl ProgressUpdate {
    /// Build an update, clamping `percent` and truncating long text.
    pub fn new(percent: u8, message: &str, state: &str, detail: &str) -> Self {
        Self {
            message: truncate(message, MAX_MESSAGE_CHARS),
            percent: percent.min(100),
            state: state.to_string(),
            detail: truncate(detail, MAX_DETAIL_CHARS),
        }
    }
}

/// A control chunk on the stream callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMarker {
    ToolCall(String),
    ToolResult(String),
    Progress(ProgressUpdate),
}

impl StreamMarker {
    /// Decode a chunk produced by `to_string`, if it is a marker.
    pub fn parse(chunk: &str) -> Option<Self> {
        if let Some(rest) = chunk.strip_prefix(TOOL_CALL_PREFIX) {
            return tool_name(rest).map(StreamMarker::ToolCall);
        }
        if let Some(rest) = chunk.strip_prefix(TOOL_RESULT_PREFIX) {
            return tool_name(rest).map(StreamMarker::ToolResult);
        }
        let json = chunk.strip_prefix(PROGRESS_PREFIX)?.strip_suffix('\u{0}')?;
        serde_json::from_str(json).ok().map(StreamMarker::Progress)
    }
}

fn tool_name(rest: &str) -> Option<String> {
    rest.strip_suffix("__\n").map(str::to_string)
}

impl fmt::Display for StreamMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMarker::ToolCall(name) => writeln!(f, "{TOOL_CALL_PREFIX}{name}__"),
            StreamMarker::ToolResult(name) => writeln!(f, "{TOOL_RESULT_PREFIX}{name}__"),
            StreamMarker::Progress(update) => {
                let json = serde_json::to_string(update).map_err(|_| fmt::Error)?;
                write!(f, "{PROGRESS_PREFIX}{json}\u{0}")
            }
        }
    }
}

/// Whether a stream chunk is a control marker rather than reply text.
pub fn is_control_chunk(chunk: &str) -> bool {
    chunk.starts_with(TOOL_CALL_PREFIX)
        || chunk.starts_with(TOOL_RESULT_PREFIX)
        || chunk.starts_with(PROGRESS_PREFIX)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_markers_render() {
        assert_eq!(
            StreamMarker::ToolCall("shell".into()).to_string(),
            "__TOOL_CALL:shell__\n"
        );
        assert_eq!(
            StreamMarker::ToolResult("shell".into()).to_string(),
            "__TOOL_RESULT:shell__\n"
        );
    }

    #[test]
    fn progress_sentinel_is_nul_delimited_json() {
        let marker = StreamMarker::Progress(ProgressUpdate::new(40, "Downloading", "running", ""));
        let chunk = marker.to_string();
        assert!(chunk.starts_with("\u{0}PROGRESS:{"));
        assert!(chunk.ends_with("}\u{0}"));
        assert_eq!(StreamMarker::parse(&chunk), Some(marker));
    }

    #[test]
    fn progress_text_is_escaped_and_truncated() {
        let long = "x".repeat(600);
        let update = ProgressUpdate::new(250, "say \"hi\"\u{0}", "running", &long);
        assert_eq!(update.percent, 100);
        assert_eq!(update.detail.chars().count(), MAX_DETAIL_CHARS + 1);

        let long_msg = ProgressUpdate::new(1, &long, "running", "");
        assert_eq!(long_msg.message.chars().count(), MAX_MESSAGE_CHARS + 1);

        let chunk = StreamMarker::Progress(update).to_string();
        // The only raw NULs are the delimiters.
        assert_eq!(chunk.matches('\u{0}').count(), 2);
    }

    #[test]
    fn control_chunks_are_recognized() {
        assert!(is_control_chunk("__TOOL_CALL:datetime__\n"));
        assert!(is_control_chunk("__TOOL_RESULT:datetime__\n"));
        assert!(is_control_chunk(
            &StreamMarker::Progress(ProgressUpdate::new(1, "a", "b", "c")).to_string()
        ));
        assert!(!is_control_chunk("It's 22:39 IST."));
        assert!(!is_control_chunk(""));
    }

    #[test]
    fn parse_round_trips_tool_markers() {
        let marker = StreamMarker::ToolResult("web_fetch".into());
        assert_eq!(StreamMarker::parse(&marker.to_string()), Some(marker));
        assert_eq!(StreamMarker::parse("hello"), None);
    }
}
