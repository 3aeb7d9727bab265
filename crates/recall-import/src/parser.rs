//! OpenClaw transcript decoding.
//!
//! One JSON object per line. `session` lines carry the start time,
//! `message` lines carry a `user`, `assistant` or `toolResult` message whose
//! content is a string or a list of blocks. Everything else is ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use recall_store::Role;

use crate::error::ImportError;

pub const READ_BUFFER_BYTES: usize = 1 << 20;
pub const MAX_LINE_BYTES: usize = 10 << 20;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireLine {
    Session {
        #[serde(default)]
        timestamp: Value,
    },
    Message {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        timestamp: Value,
        message: WireMessage,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: WireContent,
    #[serde(default)]
    tool_call_id: Option<String>,
    #[serde(default)]
    timestamp: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
    #[default]
    Empty,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    /// JSON text.
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedMessage {
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    /// None when the line's timestamp could not be read.
    pub timestamp: Option<DateTime<Utc>>,
    pub tool_calls: Vec<ParsedToolCall>,
    /// Set on tool results.
    pub tool_call_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedTranscript {
    pub started_at: Option<DateTime<Utc>>,
    pub messages: Vec<ParsedMessage>,
    /// Lines that were not valid JSON or not valid UTF-8.
    pub skipped_lines: usize,
}

impl ParsedTranscript {
    pub fn tool_call_count(&self) -> usize {
        self.messages.iter().map(|m| m.tool_calls.len()).sum()
    }
}

/// RFC 3339 first, then unix milliseconds (number or numeric string).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

pub fn parse_file(path: &Path) -> Result<ParsedTranscript, ImportError> {
    let file = File::open(path).map_err(|e| ImportError::io(path, e))?;
    parse_reader(BufReader::with_capacity(READ_BUFFER_BYTES, file), path, MAX_LINE_BYTES)
}

/// Decode a transcript. Malformed lines are skipped; a line longer than
/// `max_line` bytes fails the whole file.
pub fn parse_reader<R: BufRead>(
    mut reader: R,
    path: &Path,
    max_line: usize,
) -> Result<ParsedTranscript, ImportError> {
    let mut out = ParsedTranscript::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        // Room for the line plus a CRLF terminator.
        let read = (&mut reader)
            .take(max_line as u64 + 2)
            .read_until(b'\n', &mut buf)
            .map_err(|e| ImportError::io(path, e))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = buf
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(&buf[..]);
        if line.len() > max_line {
            return Err(ImportError::LineTooLong {
                path: path.to_path_buf(),
                line: line_no,
                limit: max_line,
            });
        }

        let Ok(text) = std::str::from_utf8(line) else {
            warn!(path = %path.display(), line = line_no, "skipping non-UTF-8 line");
            out.skipped_lines += 1;
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<WireLine>(text) {
            Ok(WireLine::Session { timestamp }) => {
                if out.started_at.is_none() {
                    out.started_at = parse_timestamp(&timestamp);
                }
            }
            Ok(WireLine::Message {
                id,
                timestamp,
                message,
            }) => {
                if let Some(msg) = convert_message(id, &timestamp, message) {
                    out.messages.push(msg);
                }
            }
            Ok(WireLine::Other) => {}
            Err(e) => {
                warn!(path = %path.display(), line = line_no, error = %e, "skipping malformed line");
                out.skipped_lines += 1;
            }
        }
    }
    Ok(out)
}

fn convert_message(id: Option<String>, timestamp: &Value, message: WireMessage) -> Option<ParsedMessage> {
    let role = match message.role.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "toolResult" => Role::Tool,
        other => {
            debug!(role = other, "ignoring message role");
            return None;
        }
    };

    let mut text = Vec::new();
    let mut tool_calls = Vec::new();
    match message.content {
        WireContent::Text(s) => text.push(s),
        WireContent::Blocks(blocks) => {
            for block in blocks {
                match block.kind.as_str() {
                    "text" => text.extend(block.text),
                    "toolCall" => tool_calls.push(ParsedToolCall {
                        id: block.id.unwrap_or_default(),
                        name: block.name.unwrap_or_default(),
                        arguments: match block.arguments {
                            Some(Value::String(s)) => s,
                            Some(v) => v.to_string(),
                            None => "{}".to_string(),
                        },
                    }),
                    // thinking and unknown blocks
                    _ => {}
                }
            }
        }
        WireContent::Empty => {}
    }

    Some(ParsedMessage {
        id,
        role,
        content: text.join("\n").trim().to_string(),
        timestamp: parse_timestamp(timestamp).or_else(|| parse_timestamp(&message.timestamp)),
        tool_calls,
        tool_call_id: message.tool_call_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn parse(input: &str) -> ParsedTranscript {
        parse_reader(input.as_bytes(), Path::new("test.jsonl"), MAX_LINE_BYTES).unwrap()
    }

    #[test]
    fn session_header_and_messages() {
        let out = parse(concat!(
            r#"{"type":"session","timestamp":"2026-02-10T12:00:00Z"}"#, "\n",
            r#"{"type":"message","id":"m1","timestamp":"2026-02-10T12:00:05Z","message":{"role":"user","content":"hi"}}"#, "\n",
            r#"{"type":"message","id":"m2","timestamp":"2026-02-10T12:00:10Z","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"hello"}]}}"#, "\n",
        ));
        assert_eq!(out.started_at, Some(Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()));
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(out.messages[0].content, "hi");
        assert_eq!(out.messages[1].content, "hello");
        assert_eq!(out.messages[1].id.as_deref(), Some("m2"));
        assert_eq!(out.skipped_lines, 0);
    }

    #[test]
    fn tool_calls_and_results() {
        let out = parse(concat!(
            r#"{"type":"message","timestamp":"2026-02-10T12:00:05Z","message":{"role":"assistant","content":[{"type":"toolCall","id":"c1","name":"read","arguments":{"path":"a.txt"}}]}}"#, "\n",
            r#"{"type":"message","timestamp":"2026-02-10T12:00:06Z","message":{"role":"toolResult","toolCallId":"c1","content":[{"type":"text","text":"file body"}]}}"#, "\n",
        ));
        assert_eq!(out.tool_call_count(), 1);
        let call = &out.messages[0].tool_calls[0];
        assert_eq!(call.name, "read");
        assert_eq!(call.arguments, r#"{"path":"a.txt"}"#);
        assert_eq!(out.messages[0].content, "");
        assert_eq!(out.messages[1].role, Role::Tool);
        assert_eq!(out.messages[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(out.messages[1].content, "file body");
    }

    #[test]
    fn malformed_and_unknown_lines() {
        let out = parse(concat!(
            "{not json\n",
            r#"{"type":"model_change","provider":"x"}"#, "\n",
            "\n",
            r#"{"type":"message","message":{"role":"custom","content":"x"}}"#, "\r\n",
            r#"{"type":"message","message":{"role":"user","content":"kept"}}"#, "\r\n",
        ));
        assert_eq!(out.skipped_lines, 1);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].content, "kept");
        assert_eq!(out.messages[0].timestamp, None);
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2026-02-10T12:00:00.000000000Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2026-02-10T13:00:00+01:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis().to_string())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
    }

    #[test]
    fn inner_timestamp_is_a_fallback() {
        let out = parse(
            r#"{"type":"message","message":{"role":"user","content":"hi","timestamp":1770724800000}}"#,
        );
        assert_eq!(
            out.messages[0].timestamp,
            Some(Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn overlong_line_is_rejected() {
        let input = format!(
            "{}\n{}\n",
            r#"{"type":"session"}"#,
            json!({"type": "message", "message": {"role": "user", "content": "x".repeat(200)}})
        );
        let err = parse_reader(input.as_bytes(), Path::new("big.jsonl"), 64).unwrap_err();
        assert!(matches!(err, ImportError::LineTooLong { line: 2, limit: 64, .. }), "{err}");
    }
}
