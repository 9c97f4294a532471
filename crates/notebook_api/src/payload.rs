use chat_backend::{Bookmark, BookmarkKind, ChatRequest, Conversation, Message, NewBookmark};
use serde::{Deserialize, Serialize};

/// Request body for `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub thread_id: String,
    pub message: String,
    pub translate_to_english: bool,
    pub auto_translate_responses: bool,
    pub model: String,
}

impl From<ChatRequest> for ChatPayload {
    fn from(request: ChatRequest) -> Self {
        Self {
            thread_id: request.conversation_id,
            message: request.message,
            translate_to_english: request.translate_to_english,
            auto_translate_responses: request.auto_translate_responses,
            model: request.model,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateThreadPayload<'a> {
    pub title: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRefPayload<'a> {
    pub thread_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkPayload {
    pub thread_id: String,
    pub text: String,
    pub translation: String,
    #[serde(rename = "type")]
    pub kind: BookmarkKind,
}

impl From<NewBookmark> for BookmarkPayload {
    fn from(bookmark: NewBookmark) -> Self {
        Self {
            thread_id: bookmark.conversation_id,
            text: bookmark.text,
            translation: bookmark.translation,
            kind: bookmark.kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateMessagePayload<'a> {
    pub thread_id: &'a str,
    pub message_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateTextPayload<'a> {
    pub text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadListResponse {
    #[serde(default)]
    pub threads: Vec<Conversation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    pub thread: Conversation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageListResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkListResponse {
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkResponse {
    pub bookmark: Bookmark,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationResponse {
    #[serde(default)]
    pub translation: Option<String>,
}
