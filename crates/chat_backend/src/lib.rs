//! Collaborator contract shared by the streaming engine and its backends.
//!
//! This crate defines the request/response shapes of the notebook backend
//! (conversations, messages, bookmarks, translation lookups) and the
//! [`ChatBackend`] seam through which the engine opens a raw chat stream. It
//! contains no transport code and no frame decoding: backends hand raw body
//! chunks to the caller exactly as they arrive.

use std::ops::ControlFlow;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Opaque, server-assigned conversation (thread) identifier.
pub type ConversationId = String;

/// Opaque, server-assigned message identifier.
pub type MessageId = String;

/// Shared cancellation flag for one streaming request.
pub type CancelSignal = Arc<AtomicBool>;

/// Receives raw body chunks in arrival order. Returning `Break` stops reading.
pub type ChunkSink<'a> = &'a mut dyn FnMut(&[u8]) -> ControlFlow<()>;

/// Default chat model requested when callers do not pick one.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Language a message was originally written in.
///
/// `Source` is the learner's own language (`"ko"` on the wire) and `Target`
/// the language conversations are held in (`"en"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Source,
    Target,
}

impl Language {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "ko" | "source" => Self::Source,
            "en" | "target" => Self::Target,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "ko",
            Self::Target => "en",
        }
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown language code '{raw}'")))
    }
}

/// One transcript entry as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        deserialize_with = "lenient_language",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_language: Option<Language>,
    #[serde(
        default,
        deserialize_with = "non_empty_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub translated_content: Option<String>,
}

impl Message {
    #[must_use]
    pub fn user(id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    #[must_use]
    pub fn assistant(id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    #[must_use]
    pub fn new(id: impl Into<MessageId>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            original_language: None,
            translated_content: None,
        }
    }

    #[must_use]
    pub fn with_original_language(mut self, language: Language) -> Self {
        self.original_language = Some(language);
        self
    }

    #[must_use]
    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        let translation = translation.into();
        self.translated_content = (!translation.is_empty()).then_some(translation);
        self
    }
}

fn lenient_language<'de, D>(deserializer: D) -> Result<Option<Language>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Language::parse))
}

fn non_empty_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.is_empty()))
}

/// Conversation (thread) listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkKind {
    Word,
    Sentence,
}

impl BookmarkKind {
    /// Single tokens are saved as words; anything longer as a sentence.
    pub fn for_text(text: &str) -> Self {
        if text.split_whitespace().count() <= 1 {
            Self::Word
        } else {
            Self::Sentence
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub thread_id: ConversationId,
    pub text: String,
    pub translation: String,
    #[serde(rename = "type")]
    pub kind: BookmarkKind,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Input for the create-bookmark collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    pub conversation_id: ConversationId,
    pub text: String,
    pub translation: String,
    pub kind: BookmarkKind,
}

impl NewBookmark {
    #[must_use]
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        text: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            conversation_id: conversation_id.into(),
            kind: BookmarkKind::for_text(&text),
            text,
            translation: translation.into(),
        }
    }
}

/// Input required to open one chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    pub message: String,
    pub translate_to_english: bool,
    pub auto_translate_responses: bool,
    pub model: String,
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub backend_id: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("request was cancelled")]
    Cancelled,
}

impl BackendError {
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Backend interface consumed by the engine.
///
/// Every call is blocking from the caller's perspective. `stream_chat` is the
/// only streaming operation; all other calls are plain request/response.
pub trait ChatBackend: Send + Sync + 'static {
    fn profile(&self) -> BackendProfile;

    fn create_conversation(&self, title: &str) -> Result<Conversation, BackendError>;

    fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError>;

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError>;

    fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError>;

    fn list_bookmarked_conversations(&self) -> Result<Vec<Conversation>, BackendError>;

    fn set_conversation_bookmarked(
        &self,
        conversation_id: &str,
        bookmarked: bool,
    ) -> Result<(), BackendError>;

    fn create_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError>;

    fn list_bookmarks(&self, conversation_id: &str) -> Result<Vec<Bookmark>, BackendError>;

    /// Translates one stored message and returns the conversation's full,
    /// updated message list.
    fn translate_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, BackendError>;

    fn translate_text(&self, text: &str) -> Result<String, BackendError>;

    /// Opens a chat stream and forwards raw body chunks to `on_chunk` until the
    /// body ends, `on_chunk` breaks, or `cancel` is raised.
    ///
    /// Returns `Err(BackendError::Cancelled)` when the cancel flag stopped the
    /// read, and `Ok(())` for both a finished body and a caller break.
    fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancelSignal,
        on_chunk: ChunkSink<'_>,
    ) -> Result<(), BackendError>;
}
