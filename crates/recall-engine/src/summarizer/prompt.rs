//! Metadata prompt, transcript condensing and response parsing.

use serde::Deserialize;
use tracing::warn;

use recall_store::{ArchivedMessage, Role};

pub const SESSION_TYPES: &[&str] = &[
    "debugging",
    "architecture",
    "philosophy",
    "casual",
    "planning",
    "operations",
    "creative",
];

pub const SYSTEM_PROMPT: &str = "You summarize archived conversation sessions.\n\
Respond with a single JSON object and nothing else: no prose, no code fences.\n\
The object must have exactly these keys:\n\
- \"title\": short title, at most 8 words\n\
- \"tags\": array of 1-5 lowercase topic tags\n\
- \"one_liner\": one sentence describing the session\n\
- \"paragraph\": 2-4 sentences covering what was discussed and decided\n\
- \"detailed\": a fuller account of the session\n\
- \"key_decisions\": array of decisions that were made\n\
- \"participants\": array of people or agents involved\n\
- \"session_type\": one of debugging, architecture, philosophy, casual, planning, operations, creative";

const TRUNCATED: &str = "... (truncated)";

/// `[HH:MM] role: content` lines, system messages skipped. Stops once the
/// output passes `max_bytes`.
pub fn condense_transcript(messages: &[ArchivedMessage], max_bytes: usize) -> String {
    let mut out = String::new();
    for msg in messages.iter().filter(|m| m.role != Role::System) {
        if out.len() > max_bytes {
            out.push_str(TRUNCATED);
            break;
        }
        out.push_str(&format!(
            "[{}] {}: {}\n",
            msg.timestamp.format("%H:%M"),
            msg.role,
            msg.content.trim()
        ));
    }
    out
}

pub fn user_prompt(transcript: &str) -> String {
    format!("Summarize this session.\n\n<transcript>\n{transcript}</transcript>")
}

/// Decoded model output.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetadataResponse {
    pub title: String,
    pub tags: Vec<String>,
    pub one_liner: String,
    pub paragraph: String,
    pub detailed: String,
    pub key_decisions: Vec<String>,
    pub participants: Vec<String>,
    pub session_type: String,
}

fn strip_fences(raw: &str) -> &str {
    let s = raw.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Decode the model response. Undecodable output becomes the paragraph so a
/// session is never left without some summary.
pub fn parse_response(raw: &str) -> MetadataResponse {
    let body = strip_fences(raw);
    match serde_json::from_str::<MetadataResponse>(body) {
        Ok(parsed) => {
            if !parsed.session_type.is_empty() && !SESSION_TYPES.contains(&parsed.session_type.as_str()) {
                warn!(session_type = %parsed.session_type, "unexpected session type");
            }
            parsed
        }
        Err(e) => {
            warn!(error = %e, "metadata response is not JSON, keeping raw text");
            MetadataResponse {
                paragraph: body.to_string(),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use recall_core::ids::{ConversationId, SessionId};

    fn msg(role: Role, content: &str, minute: i64) -> ArchivedMessage {
        let t = Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap() + Duration::minutes(minute);
        ArchivedMessage::new(&SessionId::from_raw("s"), &ConversationId::from_raw("c"), role, content, t)
    }

    #[test]
    fn transcript_skips_system_and_formats_lines() {
        let out = condense_transcript(
            &[
                msg(Role::System, "preamble", 0),
                msg(Role::User, "hi", 1),
                msg(Role::Assistant, "hello", 2),
            ],
            8000,
        );
        assert_eq!(out, "[09:01] user: hi\n[09:02] assistant: hello\n");
    }

    #[test]
    fn transcript_truncates_past_limit() {
        let long = "x".repeat(60);
        let messages: Vec<_> = (0..10).map(|i| msg(Role::User, &long, i)).collect();
        let out = condense_transcript(&messages, 100);
        assert!(out.ends_with(TRUNCATED), "{out}");
        assert_eq!(out.matches("user:").count(), 2);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"title\":\"Boiler\",\"tags\":[\"home\"],\"one_liner\":\"Checked it.\",\
                   \"session_type\":\"operations\"}\n```";
        let parsed = parse_response(raw);
        assert_eq!(parsed.title, "Boiler");
        assert_eq!(parsed.tags, vec!["home"]);
        assert_eq!(parsed.one_liner, "Checked it.");
        assert!(parsed.key_decisions.is_empty());
    }

    #[test]
    fn non_json_falls_back_to_paragraph() {
        let parsed = parse_response("We talked about the boiler.");
        assert_eq!(parsed.paragraph, "We talked about the boiler.");
        assert!(parsed.title.is_empty());
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn unknown_session_type_is_kept() {
        let parsed = parse_response(r#"{"title":"t","session_type":"gardening"}"#);
        assert_eq!(parsed.session_type, "gardening");
    }

    #[test]
    fn prompt_lists_every_session_type() {
        for t in SESSION_TYPES {
            assert!(SYSTEM_PROMPT.contains(t));
        }
    }
}
