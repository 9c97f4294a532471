//! Phase state machine and payload dispatch.
//!
//! [`reduce`] is a deterministic reducer over `(RouterState, Transcript,
//! Frame)`. It performs no I/O and never logs; what happened to each frame is
//! reported through the returned [`Reduction`].

use std::collections::HashMap;

use chat_backend::{Message, MessageId};

use crate::frame::Frame;
use crate::transcript::Transcript;

/// The logical channel currently receiving payload frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Init,
    TranslatingUser,
    Responding,
    TranslatingResponse,
}

/// Message field fed by an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    UserTranslation,
    AssistantContent,
    AssistantTranslation,
}

/// Growing text buffer tied to one message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub target_message_id: MessageId,
    pub buffer: String,
}

/// Per-session routing state. Accumulators are created lazily and never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterState {
    phase: Phase,
    user_message_id: Option<MessageId>,
    assistant_message_id: Option<MessageId>,
    accumulators: HashMap<(Channel, MessageId), Accumulator>,
}

impl RouterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user_message_id(&self) -> Option<&str> {
        self.user_message_id.as_deref()
    }

    pub fn assistant_message_id(&self) -> Option<&str> {
        self.assistant_message_id.as_deref()
    }

    pub fn accumulator(&self, channel: Channel, target: &str) -> Option<&Accumulator> {
        self.accumulators.get(&(channel, target.to_string()))
    }

    fn accumulate(&mut self, channel: Channel, target: &str, fragment: &str) -> &str {
        let accumulator = self
            .accumulators
            .entry((channel, target.to_string()))
            .or_insert_with(|| Accumulator {
                target_message_id: target.to_string(),
                buffer: String::new(),
            });
        accumulator.buffer.push_str(fragment);
        &accumulator.buffer
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptChange {
    Appended(MessageId),
    ContentPatched(MessageId),
    TranslationPatched(MessageId),
}

/// A payload frame that could not be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Payload before any phase sentinel.
    Preamble,
    /// User translation with no recorded or existing user message.
    UnknownUserMessage(Option<MessageId>),
    /// Response content before `[ASSISTANT_MESSAGE_ID:...]`.
    MissingAssistantId,
    /// Response translation for an assistant message not in the transcript.
    UnknownAssistantMessage(Option<MessageId>),
}

/// Outcome of reducing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// State may have moved; the transcript did not.
    Unchanged,
    Changed(TranscriptChange),
    Dropped(DropReason),
    /// The server reported a failure for this request.
    ServerError(String),
}

impl Reduction {
    pub fn changed_transcript(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

pub fn reduce(state: &mut RouterState, transcript: &mut Transcript, frame: Frame) -> Reduction {
    match frame {
        Frame::Done => Reduction::Unchanged,
        Frame::ServerError(message) => Reduction::ServerError(message),
        Frame::Phase(phase) => {
            state.phase = phase;
            Reduction::Unchanged
        }
        Frame::AssistantMessageId(id) => {
            state.assistant_message_id = Some(id);
            Reduction::Unchanged
        }
        Frame::UserMessage(message) => {
            let id = message.id.clone();
            state.user_message_id = Some(id.clone());
            if transcript.append(message) {
                Reduction::Changed(TranscriptChange::Appended(id))
            } else {
                Reduction::Unchanged
            }
        }
        Frame::Payload(fragment) => dispatch_payload(state, transcript, &fragment),
    }
}

fn dispatch_payload(state: &mut RouterState, transcript: &mut Transcript, fragment: &str) -> Reduction {
    match state.phase {
        Phase::Init => Reduction::Dropped(DropReason::Preamble),
        Phase::TranslatingUser => {
            let Some(id) = state
                .user_message_id
                .clone()
                .filter(|id| transcript.contains(id))
            else {
                return Reduction::Dropped(DropReason::UnknownUserMessage(
                    state.user_message_id.clone(),
                ));
            };
            let translation = state.accumulate(Channel::UserTranslation, &id, fragment);
            transcript.patch_translation(&id, translation);
            Reduction::Changed(TranscriptChange::TranslationPatched(id))
        }
        Phase::Responding => {
            let Some(id) = state.assistant_message_id.clone() else {
                return Reduction::Dropped(DropReason::MissingAssistantId);
            };
            let content = state.accumulate(Channel::AssistantContent, &id, fragment);
            if transcript.patch_content(&id, content) {
                Reduction::Changed(TranscriptChange::ContentPatched(id))
            } else {
                transcript.append(Message::assistant(id.clone(), content));
                Reduction::Changed(TranscriptChange::Appended(id))
            }
        }
        Phase::TranslatingResponse => {
            let Some(id) = state
                .assistant_message_id
                .clone()
                .filter(|id| transcript.contains(id))
            else {
                return Reduction::Dropped(DropReason::UnknownAssistantMessage(
                    state.assistant_message_id.clone(),
                ));
            };
            let translation = state.accumulate(Channel::AssistantTranslation, &id, fragment);
            transcript.patch_translation(&id, translation);
            Reduction::Changed(TranscriptChange::TranslationPatched(id))
        }
    }
}
