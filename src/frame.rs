//! Chat stream framing.
//!
//! The body is a sequence of `\n`-terminated lines. Only lines that start with
//! `data: ` carry meaning; everything else (blank separators, comments) is
//! skipped. Bytes are buffered until a full line is available, so multi-byte
//! UTF-8 sequences split across chunks decode correctly.

use chat_backend::{Language, Message, MessageId};
use serde_json::Value;
use tracing::debug;

use crate::router::Phase;

const DATA_PREFIX: &str = "data: ";

/// One decoded unit of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `[DONE]`: logical end marker. The transport may still be open.
    Done,
    /// `[USER_MESSAGE:<json>]`: the stored user message for this send.
    UserMessage(Message),
    /// `[ASSISTANT_MESSAGE_ID:<id>]`
    AssistantMessageId(MessageId),
    /// `[PHASE:...]`
    Phase(Phase),
    /// `{"content": "..."}`: one incremental text fragment.
    Payload(String),
    /// `{"error": "..."}`: the server gave up on this request.
    ServerError(String),
}

/// Why a `data: ` line produced no frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedLine {
    InvalidUtf8,
    UnknownSentinel(String),
    InvalidUserMessage(String),
    EmptyMessageId,
    InvalidJson(String),
    MissingContent,
}

/// Incremental decoder for one chat stream. Create a fresh one per session.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    dropped: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one raw chunk and returns every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let decoded = decode_line(strip_carriage_return(&self.pending[consumed..end]));
            if let Some(frame) = self.record(decoded) {
                frames.push(frame);
            }
            consumed = end + 1;
        }
        self.pending.drain(..consumed);

        frames
    }

    /// Decodes a trailing line left without its terminator when the body ends.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.pending);
        let line = strip_carriage_return(&rest);
        if line.is_empty() {
            return Vec::new();
        }
        let decoded = decode_line(line);
        self.record(decoded).into_iter().collect()
    }

    /// Number of `data: ` lines discarded as malformed so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn record(&mut self, result: Result<Option<Frame>, MalformedLine>) -> Option<Frame> {
        match result {
            Ok(frame) => frame,
            Err(reason) => {
                self.dropped += 1;
                debug!(?reason, "dropping malformed stream line");
                None
            }
        }
    }
}

fn decode_line(line: &[u8]) -> Result<Option<Frame>, MalformedLine> {
    match std::str::from_utf8(line) {
        Ok(line) => parse_line(line),
        Err(_) if line.starts_with(DATA_PREFIX.as_bytes()) => Err(MalformedLine::InvalidUtf8),
        Err(_) => Ok(None),
    }
}

fn strip_carriage_return(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Classifies one line without its terminator.
///
/// `Ok(None)` means the line carries no frame (not a `data: ` line).
pub fn parse_line(line: &str) -> Result<Option<Frame>, MalformedLine> {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    if let Some(inner) = data
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        return parse_sentinel(inner).map(Some);
    }

    parse_json_frame(data).map(Some)
}

fn parse_sentinel(inner: &str) -> Result<Frame, MalformedLine> {
    match inner {
        "DONE" => return Ok(Frame::Done),
        "PHASE:TRANSLATING" => return Ok(Frame::Phase(Phase::TranslatingUser)),
        "PHASE:RESPONDING" => return Ok(Frame::Phase(Phase::Responding)),
        "PHASE:TRANSLATING_RESPONSE" => return Ok(Frame::Phase(Phase::TranslatingResponse)),
        _ => {}
    }

    if let Some(json) = inner.strip_prefix("USER_MESSAGE:") {
        return parse_user_message(json).map(Frame::UserMessage);
    }

    if let Some(id) = inner.strip_prefix("ASSISTANT_MESSAGE_ID:") {
        let id = id.trim();
        let id = id
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(id);
        if id.is_empty() {
            return Err(MalformedLine::EmptyMessageId);
        }
        return Ok(Frame::AssistantMessageId(id.to_string()));
    }

    Err(MalformedLine::UnknownSentinel(inner.to_string()))
}

/// The user echo carries `{id, content, originalLanguage?, translatedContent?}`
/// and may omit `role`; ids may arrive as strings or numbers.
fn parse_user_message(json: &str) -> Result<Message, MalformedLine> {
    let invalid = |reason: &str| MalformedLine::InvalidUserMessage(reason.to_string());

    let value: Value =
        serde_json::from_str(json).map_err(|error| invalid(&error.to_string()))?;
    let object = value.as_object().ok_or_else(|| invalid("not an object"))?;

    let id = match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(invalid("missing id")),
    };
    let content = object
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut message = Message::user(id, content);
    if let Some(language) = object
        .get("originalLanguage")
        .and_then(Value::as_str)
        .and_then(Language::parse)
    {
        message = message.with_original_language(language);
    }
    if let Some(translation) = object.get("translatedContent").and_then(Value::as_str) {
        message = message.with_translation(translation);
    }

    Ok(message)
}

fn parse_json_frame(data: &str) -> Result<Frame, MalformedLine> {
    let value: Value = serde_json::from_str(data)
        .map_err(|error| MalformedLine::InvalidJson(error.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(MalformedLine::MissingContent);
    };

    match object.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Ok(Frame::ServerError(message.clone())),
        Some(other) => return Ok(Frame::ServerError(other.to_string())),
    }

    object
        .get("content")
        .and_then(Value::as_str)
        .map(|content| Frame::Payload(content.to_string()))
        .ok_or(MalformedLine::MissingContent)
}

#[cfg(test)]
mod tests {
    use chat_backend::{Language, Message};
    use pretty_assertions::assert_eq;

    use super::{parse_line, Frame, FrameDecoder, MalformedLine};
    use crate::router::Phase;

    #[test]
    fn feed_buffers_partial_lines_across_chunks() {
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.feed(b"data: {\"con"), Vec::<Frame>::new());
        assert_eq!(decoder.pending_len(), 11);
        assert_eq!(
            decoder.feed(b"tent\":\"He\"}\n\ndata: {\"content\":\"llo\"}\n"),
            vec![
                Frame::Payload("He".to_string()),
                Frame::Payload("llo".to_string())
            ]
        );
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn feed_reassembles_utf8_split_inside_a_code_point() {
        let line = "data: {\"content\":\"안녕\"}\n".as_bytes();
        let split = line
            .iter()
            .position(|&b| b >= 0x80)
            .expect("line has a multi-byte character")
            + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        assert_eq!(
            decoder.feed(&line[split..]),
            vec![Frame::Payload("안녕".to_string())]
        );
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn carriage_returns_and_non_data_lines_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b": keep-alive\r\nevent: ping\r\ndata: [DONE]\r\n\r\n");

        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn sentinels_are_matched_before_json() {
        assert_eq!(
            parse_line("data: [PHASE:TRANSLATING]"),
            Ok(Some(Frame::Phase(Phase::TranslatingUser)))
        );
        assert_eq!(
            parse_line("data: [PHASE:RESPONDING]"),
            Ok(Some(Frame::Phase(Phase::Responding)))
        );
        assert_eq!(
            parse_line("data: [PHASE:TRANSLATING_RESPONSE]"),
            Ok(Some(Frame::Phase(Phase::TranslatingResponse)))
        );
        assert_eq!(
            parse_line("data: [ASSISTANT_MESSAGE_ID:\"a1\"]"),
            Ok(Some(Frame::AssistantMessageId("a1".to_string())))
        );
        assert_eq!(
            parse_line("data: [ASSISTANT_MESSAGE_ID:42]"),
            Ok(Some(Frame::AssistantMessageId("42".to_string())))
        );
    }

    #[test]
    fn user_message_sentinel_reads_echo_without_role() {
        let frame = parse_line(
            r#"data: [USER_MESSAGE:{"id": "u1", "content": "안녕", "originalLanguage": "ko", "translatedContent": ""}]"#,
        );

        assert_eq!(
            frame,
            Ok(Some(Frame::UserMessage(
                Message::user("u1", "안녕").with_original_language(Language::Source)
            )))
        );
    }

    #[test]
    fn error_object_becomes_server_error_frame() {
        assert_eq!(
            parse_line(r#"data: {"error": "Unauthorized access to this thread"}"#),
            Ok(Some(Frame::ServerError(
                "Unauthorized access to this thread".to_string()
            )))
        );
    }

    #[test]
    fn malformed_lines_are_counted_and_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {not json\ndata: {\"text\":\"x\"}\ndata: [PHASE:UNKNOWN]\ndata: [USER_MESSAGE:{}]\ndata: {\"content\":\"ok\"}\n",
        );

        assert_eq!(frames, vec![Frame::Payload("ok".to_string())]);
        assert_eq!(decoder.dropped(), 4);
        assert_eq!(
            parse_line("data: [PHASE:UNKNOWN]"),
            Err(MalformedLine::UnknownSentinel("PHASE:UNKNOWN".to_string()))
        );
    }

    #[test]
    fn finish_flushes_unterminated_trailing_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"content\":\"tail\"}").is_empty());

        assert_eq!(decoder.finish(), vec![Frame::Payload("tail".to_string())]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn malformed_lines_split_across_chunks_are_counted_once() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.feed(b"data: {bro").is_empty());
        assert_eq!(
            decoder.feed(b"ken\r\ndata: {\"content\":\"a\"}\ndata: \xff\xfe\n"),
            vec![Frame::Payload("a".to_string())]
        );
        assert_eq!(decoder.dropped(), 2);

        assert!(decoder.feed(b"data: [NOPE]").is_empty());
        assert!(decoder.finish().is_empty());
        assert_eq!(decoder.dropped(), 3);
        assert_eq!(decoder.pending_len(), 0);
    }
}
