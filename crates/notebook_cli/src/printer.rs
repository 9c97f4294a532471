use std::collections::HashMap;
use std::io::{self, Write};

use chat_backend::{Message, MessageId, Role};

/// Streams message content to a terminal as the transcript grows.
///
/// Only content is streamed; translations arrive later and are printed by
/// [`write_transcript`] once the session ends.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: HashMap<MessageId, usize>,
    last: Option<MessageId>,
}

impl TranscriptPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes whatever content of `messages` has not been written yet.
    pub fn update<W: Write>(&mut self, out: &mut W, messages: &[Message]) -> io::Result<()> {
        for message in messages {
            let printed = match self.printed.get(&message.id) {
                Some(&printed) => printed,
                None => {
                    if self.last.is_some() {
                        writeln!(out)?;
                    }
                    write!(out, "{}: ", role_label(message.role))?;
                    self.printed.insert(message.id.clone(), 0);
                    self.last = Some(message.id.clone());
                    0
                }
            };

            match message.content.get(printed..) {
                Some(rest) if !rest.is_empty() => {
                    if self.last.as_deref() != Some(message.id.as_str()) {
                        writeln!(out)?;
                        write!(out, "{}: {}", role_label(message.role), &message.content[..printed])?;
                        self.last = Some(message.id.clone());
                    }
                    out.write_all(rest.as_bytes())?;
                    self.printed.insert(message.id.clone(), message.content.len());
                }
                _ => {}
            }
        }
        out.flush()
    }
}

/// Writes the whole transcript, one message per block, translations indented.
pub fn write_transcript<W: Write>(out: &mut W, messages: &[Message]) -> io::Result<()> {
    for message in messages {
        writeln!(out, "{}: {}", role_label(message.role), message.content)?;
        if let Some(translation) = &message.translated_content {
            writeln!(out, "  ({translation})")?;
        }
    }
    out.flush()
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "tutor",
    }
}
