//! Session lifecycle: at most one live chat stream per conversation.
//!
//! Each `send` runs on its own named worker thread that blocks on the backend
//! read. Superseding a session raises the old session's cancel flag while the
//! conversation's transcript lock is held, and every frame batch is applied
//! under that lock after re-checking the flag. A superseded session therefore
//! never mutates the transcript once its successor exists.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chat_backend::{
    BackendError, CancelSignal, ChatBackend, ChatRequest, ConversationId, Message,
    DEFAULT_CHAT_MODEL,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::frame::{Frame, FrameDecoder};
use crate::router::{reduce, Reduction, RouterState};
use crate::store::{lock_unpoisoned, SharedTranscript, TranscriptStore};

pub type SessionId = u64;

const TITLE_MAX_CHARS: usize = 30;

/// Per-send flags and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub translate_to_english: bool,
    pub auto_translate_responses: bool,
    pub default_model: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            translate_to_english: true,
            auto_translate_responses: true,
            default_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl ChatOptions {
    #[must_use]
    pub fn with_translate_to_english(mut self, enabled: bool) -> Self {
        self.translate_to_english = enabled;
        self
    }

    #[must_use]
    pub fn with_auto_translate_responses(mut self, enabled: bool) -> Self {
        self.auto_translate_responses = enabled;
        self
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        conversation_id: ConversationId,
    },
    TranscriptChanged {
        session_id: SessionId,
        conversation_id: ConversationId,
    },
    /// The body ended normally. `refresh_conversations` asks the caller to
    /// reload the conversation list, since titles may change server-side.
    Finished {
        session_id: SessionId,
        conversation_id: ConversationId,
        refresh_conversations: bool,
    },
    Failed {
        session_id: SessionId,
        conversation_id: ConversationId,
        error: String,
    },
    Cancelled {
        session_id: SessionId,
        conversation_id: ConversationId,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Started { session_id, .. }
            | Self::TranscriptChanged { session_id, .. }
            | Self::Finished { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::Cancelled { session_id, .. } => *session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Receives session events from worker threads. Read the transcript through
/// [`SessionController::snapshot`] after `TranscriptChanged`.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: SessionEvent) {
        self(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("failed to create conversation: {0}")]
    CreateConversation(#[source] BackendError),

    #[error("failed to spawn session worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Running session returned by [`SessionController::send`].
#[derive(Debug)]
pub struct SessionHandle {
    session_id: SessionId,
    conversation_id: ConversationId,
    cancel: CancelSignal,
    join_handle: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Blocks until the worker exits.
    pub fn wait(self) -> SessionOutcome {
        match self.join_handle.join() {
            Ok(outcome) => outcome,
            Err(_) => SessionOutcome::Failed("session worker panicked".to_string()),
        }
    }
}

struct ActiveSession {
    session_id: SessionId,
    cancel: CancelSignal,
}

struct SessionContext {
    session_id: SessionId,
    conversation_id: ConversationId,
    transcript: SharedTranscript,
    cancel: CancelSignal,
}

pub struct SessionController {
    backend: Arc<dyn ChatBackend>,
    store: Arc<TranscriptStore>,
    options: ChatOptions,
    observer: Option<Arc<dyn SessionObserver>>,
    next_session_id: AtomicU64,
    active: Mutex<HashMap<ConversationId, ActiveSession>>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn ChatBackend>, options: ChatOptions) -> Arc<Self> {
        Self::build(backend, options, None)
    }

    pub fn new_with_observer(
        backend: Arc<dyn ChatBackend>,
        options: ChatOptions,
        observer: Arc<dyn SessionObserver>,
    ) -> Arc<Self> {
        Self::build(backend, options, Some(observer))
    }

    fn build(
        backend: Arc<dyn ChatBackend>,
        options: ChatOptions,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            store: Arc::new(TranscriptStore::new()),
            options,
            observer,
            next_session_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<TranscriptStore> {
        &self.store
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Starts streaming a reply to `text`.
    ///
    /// Without a conversation id a conversation is created first, titled after
    /// the message. Any live session of the target conversation is cancelled
    /// before the new one starts. `model` falls back to the configured default.
    pub fn send(
        self: &Arc<Self>,
        conversation_id: Option<&str>,
        text: &str,
        model: Option<&str>,
    ) -> Result<SessionHandle, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let conversation_id = match conversation_id {
            Some(id) => id.to_string(),
            None => {
                let conversation = self
                    .backend
                    .create_conversation(&conversation_title(text))
                    .map_err(|error| {
                        error!(%error, "failed to create conversation");
                        SendError::CreateConversation(error)
                    })?;
                info!(conversation_id = %conversation.id, "created conversation");
                conversation.id
            }
        };

        let request = ChatRequest {
            conversation_id: conversation_id.clone(),
            message: text.to_string(),
            translate_to_english: self.options.translate_to_english,
            auto_translate_responses: self.options.auto_translate_responses,
            model: model
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .unwrap_or(self.options.default_model.as_str())
                .to_string(),
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let transcript = self.store.transcript(&conversation_id);

        {
            let _transcript_guard = lock_unpoisoned(&transcript);
            let mut active = self.lock_active();
            if let Some(previous) = active.insert(
                conversation_id.clone(),
                ActiveSession {
                    session_id,
                    cancel: Arc::clone(&cancel),
                },
            ) {
                previous.cancel.store(true, Ordering::SeqCst);
                info!(
                    conversation_id = %conversation_id,
                    superseded = previous.session_id,
                    session_id,
                    "superseding live session"
                );
            }
        }

        let context = SessionContext {
            session_id,
            conversation_id: conversation_id.clone(),
            transcript,
            cancel: Arc::clone(&cancel),
        };
        let join_handle = match self.spawn_worker(context, request) {
            Ok(join_handle) => join_handle,
            Err(error) => {
                self.clear_active_if_matching(&conversation_id, session_id);
                return Err(SendError::Spawn(error));
            }
        };

        Ok(SessionHandle {
            session_id,
            conversation_id,
            cancel,
            join_handle,
        })
    }

    /// Stops `handle`'s session. Partial messages stay in the transcript.
    pub fn cancel(&self, handle: &SessionHandle) {
        handle.cancel.store(true, Ordering::SeqCst);
        if self.clear_active_if_matching(&handle.conversation_id, handle.session_id) {
            info!(
                conversation_id = %handle.conversation_id,
                session_id = handle.session_id,
                "session cancelled"
            );
        }
    }

    /// Stops whichever session is live for `conversation_id`.
    pub fn cancel_conversation(&self, conversation_id: &str) -> bool {
        match self.lock_active().remove(conversation_id) {
            Some(active) => {
                active.cancel.store(true, Ordering::SeqCst);
                info!(
                    conversation_id,
                    session_id = active.session_id,
                    "session cancelled"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_generating(&self, conversation_id: &str) -> bool {
        self.lock_active().contains_key(conversation_id)
    }

    pub fn active_session(&self, conversation_id: &str) -> Option<SessionId> {
        self.lock_active()
            .get(conversation_id)
            .map(|active| active.session_id)
    }

    pub fn snapshot(&self, conversation_id: &str) -> Vec<Message> {
        self.store.snapshot(conversation_id)
    }

    /// Replaces the local transcript with the stored message list.
    pub fn load_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        let messages = self.backend.list_messages(conversation_id)?;
        self.store.replace(conversation_id, messages);
        debug!(conversation_id, "conversation loaded");
        Ok(self.store.snapshot(conversation_id))
    }

    /// Translates one stored message and adopts the returned message list.
    pub fn translate_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, BackendError> {
        let messages = self.backend.translate_message(conversation_id, message_id)?;
        self.store.replace(conversation_id, messages);
        Ok(self.store.snapshot(conversation_id))
    }

    /// Cancels any live session, deletes the conversation remotely, and drops
    /// its transcript.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        self.cancel_conversation(conversation_id);
        self.backend.delete_conversation(conversation_id)?;
        self.store.remove(conversation_id);
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    fn spawn_worker(
        self: &Arc<Self>,
        context: SessionContext,
        request: ChatRequest,
    ) -> std::io::Result<JoinHandle<SessionOutcome>> {
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("notebook-session-{}", context.session_id))
            .spawn(move || controller.run_session(context, request))
    }

    fn run_session(self: Arc<Self>, context: SessionContext, request: ChatRequest) -> SessionOutcome {
        let session_id = context.session_id;
        let conversation_id = context.conversation_id.clone();
        info!(session_id, conversation_id = %conversation_id, model = %request.model, "session started");
        self.emit(SessionEvent::Started {
            session_id,
            conversation_id: conversation_id.clone(),
        });

        let mut decoder = FrameDecoder::new();
        let mut router = RouterState::new();
        let mut server_error: Option<String> = None;

        let stream_result = {
            let mut on_chunk = |bytes: &[u8]| {
                if context.cancel.load(Ordering::SeqCst) {
                    return ControlFlow::Break(());
                }
                let frames = decoder.feed(bytes);
                self.apply_frames(&context, &mut router, frames, &mut server_error)
            };

            catch_unwind(AssertUnwindSafe(|| {
                self.backend
                    .stream_chat(request, Arc::clone(&context.cancel), &mut on_chunk)
            }))
        };

        let outcome = match stream_result {
            Err(_) => SessionOutcome::Failed("chat backend panicked".to_string()),
            Ok(result) => {
                if result.is_ok() && server_error.is_none() {
                    let trailing = decoder.finish();
                    let _ = self.apply_frames(&context, &mut router, trailing, &mut server_error);
                }
                if decoder.dropped() > 0 {
                    debug!(session_id, dropped = decoder.dropped(), "malformed lines skipped");
                }

                // A raised cancel flag outranks any transport error.
                match (server_error, result) {
                    (Some(message), _) => SessionOutcome::Failed(message),
                    (None, _) if context.cancel.load(Ordering::SeqCst) => SessionOutcome::Cancelled,
                    (None, Err(BackendError::Cancelled)) => SessionOutcome::Cancelled,
                    (None, Err(error)) => SessionOutcome::Failed(error.to_string()),
                    (None, Ok(())) => SessionOutcome::Completed,
                }
            }
        };

        self.clear_active_if_matching(&conversation_id, session_id);
        self.emit_terminal(session_id, &conversation_id, &outcome);
        outcome
    }

    /// Applies one decoded batch under the conversation lock.
    fn apply_frames(
        &self,
        context: &SessionContext,
        router: &mut RouterState,
        frames: Vec<Frame>,
        server_error: &mut Option<String>,
    ) -> ControlFlow<()> {
        if frames.is_empty() {
            return ControlFlow::Continue(());
        }

        let mut changed = false;
        let flow = {
            let mut transcript = lock_unpoisoned(&context.transcript);
            if context.cancel.load(Ordering::SeqCst) {
                return ControlFlow::Break(());
            }

            let mut flow = ControlFlow::Continue(());
            for frame in frames {
                match reduce(router, &mut transcript, frame) {
                    Reduction::Unchanged => {}
                    Reduction::Changed(change) => {
                        changed = true;
                        debug!(session_id = context.session_id, ?change, "transcript updated");
                    }
                    Reduction::Dropped(reason) => {
                        warn!(
                            session_id = context.session_id,
                            phase = ?router.phase(),
                            ?reason,
                            "dropping frame without a target message"
                        );
                    }
                    Reduction::ServerError(message) => {
                        error!(session_id = context.session_id, %message, "server reported an error");
                        *server_error = Some(message);
                        flow = ControlFlow::Break(());
                        break;
                    }
                }
            }
            flow
        };

        if changed {
            self.emit(SessionEvent::TranscriptChanged {
                session_id: context.session_id,
                conversation_id: context.conversation_id.clone(),
            });
        }
        flow
    }

    fn emit_terminal(&self, session_id: SessionId, conversation_id: &str, outcome: &SessionOutcome) {
        let conversation_id = conversation_id.to_string();
        let event = match outcome {
            SessionOutcome::Completed => {
                info!(session_id, conversation_id = %conversation_id, "session finished");
                SessionEvent::Finished {
                    session_id,
                    conversation_id,
                    refresh_conversations: true,
                }
            }
            SessionOutcome::Cancelled => {
                info!(session_id, conversation_id = %conversation_id, "session stopped after cancel");
                SessionEvent::Cancelled {
                    session_id,
                    conversation_id,
                }
            }
            SessionOutcome::Failed(error) => {
                error!(session_id, conversation_id = %conversation_id, %error, "session failed");
                SessionEvent::Failed {
                    session_id,
                    conversation_id,
                    error: error.clone(),
                }
            }
        };
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    fn clear_active_if_matching(&self, conversation_id: &str, session_id: SessionId) -> bool {
        let mut active = self.lock_active();
        let matches = active
            .get(conversation_id)
            .is_some_and(|active| active.session_id == session_id);
        if matches {
            active.remove(conversation_id);
        }
        matches
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<ConversationId, ActiveSession>> {
        lock_unpoisoned(&self.active)
    }
}

/// First line of the message, cut to 30 characters with a trailing `...`.
pub fn conversation_title(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_string();
    }

    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}
