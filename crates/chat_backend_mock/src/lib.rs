//! Deterministic in-memory implementation of the `chat_backend` contract.
//!
//! This crate contains no transport logic and is intended for local runs and
//! engine tests. Chat streams are either scripted ahead of time with
//! [`MockStream`] or synthesized from the request in the same wire format the
//! real server emits.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_backend::{
    BackendError, BackendProfile, Bookmark, CancelSignal, ChatBackend, ChatRequest, ChunkSink,
    Conversation, ConversationId, Language, Message, NewBookmark,
};

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How a scripted stream ends once its chunks are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Complete,
    Fail(BackendError),
    /// Keeps the body open until the caller raises the cancel flag.
    HoldUntilCancelled,
    /// Keeps the body open until cancelled, then reports the abort as this
    /// error instead of [`BackendError::Cancelled`].
    AbortOnCancel(BackendError),
}

/// One scripted chat response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockStream {
    chunks: Vec<Vec<u8>>,
    chunk_delay: Duration,
    end: StreamEnd,
}

impl MockStream {
    #[must_use]
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::ZERO,
            end: StreamEnd::Complete,
        }
    }

    /// One chunk per event, each rendered as `data: <line>\n\n`.
    #[must_use]
    pub fn from_events<S: AsRef<str>>(events: &[S]) -> Self {
        Self::new(
            events
                .iter()
                .map(|event| format!("data: {}\n\n", event.as_ref()).into_bytes())
                .collect(),
        )
    }

    /// A response that fails before any body bytes arrive.
    #[must_use]
    pub fn refused(error: BackendError) -> Self {
        Self::new(Vec::new()).then_fail(error)
    }

    /// Re-cuts the body into pieces of at most `size` bytes, ignoring line and
    /// UTF-8 boundaries.
    #[must_use]
    pub fn fragmented(mut self, size: usize) -> Self {
        let size = size.max(1);
        let body = self.chunks.concat();
        self.chunks = body.chunks(size).map(<[u8]>::to_vec).collect();
        self
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    #[must_use]
    pub fn then_fail(mut self, error: BackendError) -> Self {
        self.end = StreamEnd::Fail(error);
        self
    }

    #[must_use]
    pub fn then_hold(mut self) -> Self {
        self.end = StreamEnd::HoldUntilCancelled;
        self
    }

    /// Holds like [`MockStream::then_hold`] but surfaces the cancel as `error`.
    #[must_use]
    pub fn then_abort_on_cancel(mut self, error: BackendError) -> Self {
        self.end = StreamEnd::AbortOnCancel(error);
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    bookmarked: BTreeSet<ConversationId>,
    bookmarks: Vec<Bookmark>,
    requests: Vec<ChatRequest>,
    scripts: VecDeque<MockStream>,
    create_failure: Option<BackendError>,
}

impl MockState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn messages_mut(&mut self, conversation_id: &str) -> Result<&mut Vec<Message>, BackendError> {
        self.messages
            .get_mut(conversation_id)
            .ok_or_else(|| BackendError::not_found("conversation", conversation_id))
    }
}

/// Deterministic backend used by engine tests and local runs.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
    token_delay: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    const TOKEN_DELAY_MS: u64 = 30;

    #[must_use]
    pub fn new() -> Self {
        Self::with_token_delay(Duration::from_millis(Self::TOKEN_DELAY_MS))
    }

    /// Delay between synthesized reply tokens; zero for tests.
    #[must_use]
    pub fn with_token_delay(token_delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            token_delay,
        }
    }

    /// Queues a scripted body for the next `stream_chat` call.
    pub fn push_stream(&self, stream: MockStream) {
        lock_unpoisoned(&self.state).scripts.push_back(stream);
    }

    /// Makes the next `create_conversation` call fail with `error`.
    pub fn fail_next_create(&self, error: BackendError) {
        lock_unpoisoned(&self.state).create_failure = Some(error);
    }

    /// Seeds a conversation with stored messages.
    pub fn insert_conversation(&self, conversation: Conversation, messages: Vec<Message>) {
        let mut state = lock_unpoisoned(&self.state);
        state.messages.insert(conversation.id.clone(), messages);
        state.conversations.push(conversation);
    }

    /// Chat requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock_unpoisoned(&self.state).requests.clone()
    }

    fn synthesize(&self, request: &ChatRequest) -> MockStream {
        let mut state = lock_unpoisoned(&self.state);
        let user_id = state.allocate_id("mock-user");
        let assistant_id = state.allocate_id("mock-assistant");

        let language = if request.translate_to_english {
            Language::Source
        } else {
            Language::Target
        };
        let user = Message::user(user_id, request.message.clone()).with_original_language(language);
        let translation = format!("(en) {}", request.message);
        let reply = format!("You said: {}", request.message);
        let reply_translation = format!("(ko) {reply}");

        let mut events = vec![user_message_event(&user)];
        let mut stored_user = user.clone();
        if request.translate_to_english {
            events.push("[PHASE:TRANSLATING]".to_string());
            events.extend(content_events(&translation));
            stored_user = stored_user.with_translation(translation);
            events.push(user_message_event(&stored_user));
        }

        events.push(format!("[ASSISTANT_MESSAGE_ID:{assistant_id}]"));
        events.push("[PHASE:RESPONDING]".to_string());
        events.extend(content_events(&reply));

        let mut assistant = Message::assistant(assistant_id, reply.clone())
            .with_original_language(Language::Target);
        if request.auto_translate_responses {
            events.push("[PHASE:TRANSLATING_RESPONSE]".to_string());
            events.extend(content_events(&reply_translation));
            assistant = assistant.with_translation(reply_translation);
        }
        events.push("[DONE]".to_string());

        state
            .messages
            .entry(request.conversation_id.clone())
            .or_default()
            .extend([stored_user, assistant]);

        MockStream::from_events(&events).with_chunk_delay(self.token_delay)
    }
}

impl ChatBackend for MockBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: MOCK_BACKEND_ID.to_string(),
            endpoint: None,
        }
    }

    fn create_conversation(&self, title: &str) -> Result<Conversation, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.create_failure.take() {
            return Err(error);
        }

        let conversation = Conversation {
            id: state.allocate_id("mock-thread"),
            title: title.to_string(),
            created_at: None,
            updated_at: None,
        };
        state.messages.insert(conversation.id.clone(), Vec::new());
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        Ok(lock_unpoisoned(&self.state).conversations.clone())
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        let before = state.conversations.len();
        state
            .conversations
            .retain(|conversation| conversation.id != conversation_id);
        if state.conversations.len() == before {
            return Err(BackendError::not_found("conversation", conversation_id));
        }

        state.messages.remove(conversation_id);
        state.bookmarked.remove(conversation_id);
        state
            .bookmarks
            .retain(|bookmark| bookmark.thread_id != conversation_id);
        Ok(())
    }

    fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        Ok(state.messages_mut(conversation_id)?.clone())
    }

    fn list_bookmarked_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        let state = lock_unpoisoned(&self.state);
        Ok(state
            .conversations
            .iter()
            .filter(|conversation| state.bookmarked.contains(&conversation.id))
            .cloned()
            .collect())
    }

    fn set_conversation_bookmarked(
        &self,
        conversation_id: &str,
        bookmarked: bool,
    ) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if !state
            .conversations
            .iter()
            .any(|conversation| conversation.id == conversation_id)
        {
            return Err(BackendError::not_found("conversation", conversation_id));
        }

        if bookmarked {
            state.bookmarked.insert(conversation_id.to_string());
        } else {
            state.bookmarked.remove(conversation_id);
        }
        Ok(())
    }

    fn create_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        let bookmark = Bookmark {
            id: state.allocate_id("mock-bookmark"),
            thread_id: bookmark.conversation_id,
            text: bookmark.text,
            translation: bookmark.translation,
            kind: bookmark.kind,
            created_at: None,
        };
        state.bookmarks.push(bookmark.clone());
        Ok(bookmark)
    }

    fn list_bookmarks(&self, conversation_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        let state = lock_unpoisoned(&self.state);
        Ok(state
            .bookmarks
            .iter()
            .filter(|bookmark| bookmark.thread_id == conversation_id)
            .cloned()
            .collect())
    }

    fn translate_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        let messages = state.messages_mut(conversation_id)?;
        let message = messages
            .iter_mut()
            .find(|message| message.id == message_id)
            .ok_or_else(|| BackendError::not_found("message", message_id))?;

        let target = match message.original_language {
            Some(Language::Target) => Language::Source,
            _ => Language::Target,
        };
        message.translated_content = Some(format!("({}) {}", target.as_str(), message.content));
        Ok(messages.clone())
    }

    fn translate_text(&self, text: &str) -> Result<String, BackendError> {
        Ok(format!("(ko) {text}"))
    }

    fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancelSignal,
        on_chunk: ChunkSink<'_>,
    ) -> Result<(), BackendError> {
        let scripted = {
            let mut state = lock_unpoisoned(&self.state);
            state.requests.push(request.clone());
            state.scripts.pop_front()
        };
        let stream = match scripted {
            Some(stream) => stream,
            None => self.synthesize(&request),
        };

        for chunk in &stream.chunks {
            if !stream.chunk_delay.is_zero() {
                sleep_or_cancel(stream.chunk_delay, &cancel)?;
            }
            if is_cancelled(&cancel) {
                return Err(BackendError::Cancelled);
            }
            if let ControlFlow::Break(()) = on_chunk(chunk) {
                return Ok(());
            }
        }

        match stream.end {
            StreamEnd::Complete => Ok(()),
            StreamEnd::Fail(error) => Err(error),
            StreamEnd::HoldUntilCancelled => loop {
                sleep_or_cancel(CANCEL_POLL_INTERVAL, &cancel)?;
            },
            StreamEnd::AbortOnCancel(error) => loop {
                if sleep_or_cancel(CANCEL_POLL_INTERVAL, &cancel).is_err() {
                    return Err(error);
                }
            },
        }
    }
}

fn user_message_event(message: &Message) -> String {
    let json = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    format!("[USER_MESSAGE:{json}]")
}

fn content_events(text: &str) -> Vec<String> {
    text.split_inclusive(' ')
        .map(|token| serde_json::json!({ "content": token }).to_string())
        .collect()
}

fn is_cancelled(cancel: &CancelSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

fn sleep_or_cancel(duration: Duration, cancel: &CancelSignal) -> Result<(), BackendError> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if is_cancelled(cancel) {
            return Err(BackendError::Cancelled);
        }
        let step = remaining.min(CANCEL_POLL_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }

    if is_cancelled(cancel) {
        return Err(BackendError::Cancelled);
    }
    Ok(())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
