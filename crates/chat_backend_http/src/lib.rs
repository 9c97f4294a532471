//! `ChatBackend` implementation over the notebook HTTP API.
//!
//! Every call runs the async `notebook_api` client to completion on a
//! current-thread tokio runtime, so the engine sees a plain blocking contract.

mod config;

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chat_backend::{
    BackendError, BackendProfile, Bookmark, CancelSignal, ChatBackend, ChatRequest, ChunkSink,
    Conversation, Message, NewBookmark,
};
use notebook_api::{ChatPayload, NotebookApiClient, NotebookApiConfig, NotebookApiError};
use tracing::{debug, error};

pub use config::{ConfigError, HttpBackendConfig, HTTP_CONFIG_PATH_ENV_VAR};

/// Stable backend identifier used by startup selection.
pub const HTTP_BACKEND_ID: &str = "http";

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        payload: &ChatPayload,
        cancel: &CancelSignal,
        on_chunk: ChunkSink<'_>,
    ) -> Result<(), NotebookApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: Arc<NotebookApiClient>,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        payload: &ChatPayload,
        cancel: &CancelSignal,
        on_chunk: ChunkSink<'_>,
    ) -> Result<(), NotebookApiError> {
        block_on(
            self.client
                .stream_chat_with_handler(payload, Some(cancel), |bytes| on_chunk(bytes)),
        )?
    }
}

/// Blocking `ChatBackend` backed by `notebook_api` transport primitives.
pub struct HttpBackend {
    client: Arc<NotebookApiClient>,
    stream_client: Arc<dyn StreamClient>,
}

impl HttpBackend {
    pub fn new(config: NotebookApiConfig) -> Result<Self, BackendError> {
        let client = Arc::new(NotebookApiClient::new(config).map_err(map_init_error)?);
        let stream_client = Arc::new(DefaultStreamClient {
            client: Arc::clone(&client),
        });

        Ok(Self {
            client,
            stream_client,
        })
    }

    fn call<T, F>(&self, operation: &'static str, future: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, NotebookApiError>>,
    {
        block_on(future)
            .and_then(|result| result)
            .map_err(|api_error| {
                error!(operation, error = %api_error, "notebook request failed");
                BackendError::from(api_error)
            })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        config: NotebookApiConfig,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        let client = match NotebookApiClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(error) => panic!("test client config should be valid: {error}"),
        };
        Self {
            client,
            stream_client,
        }
    }
}

impl ChatBackend for HttpBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: HTTP_BACKEND_ID.to_string(),
            endpoint: Some(self.client.api_base().to_string()),
        }
    }

    fn create_conversation(&self, title: &str) -> Result<Conversation, BackendError> {
        self.call("create_conversation", self.client.create_thread(title))
    }

    fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        self.call("list_conversations", self.client.list_threads())
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        self.call(
            "delete_conversation",
            self.client.delete_thread(conversation_id),
        )
    }

    fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        self.call("list_messages", self.client.list_messages(conversation_id))
    }

    fn list_bookmarked_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        self.call(
            "list_bookmarked_conversations",
            self.client.list_bookmarked_threads(),
        )
    }

    fn set_conversation_bookmarked(
        &self,
        conversation_id: &str,
        bookmarked: bool,
    ) -> Result<(), BackendError> {
        self.call(
            "set_conversation_bookmarked",
            self.client.set_thread_bookmarked(conversation_id, bookmarked),
        )
    }

    fn create_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError> {
        self.call("create_bookmark", self.client.create_bookmark(bookmark))
    }

    fn list_bookmarks(&self, conversation_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        self.call("list_bookmarks", self.client.list_bookmarks(conversation_id))
    }

    fn translate_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, BackendError> {
        self.call(
            "translate_message",
            self.client.translate_message(conversation_id, message_id),
        )
    }

    fn translate_text(&self, text: &str) -> Result<String, BackendError> {
        self.call("translate_text", self.client.translate_text(text))
    }

    fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancelSignal,
        on_chunk: ChunkSink<'_>,
    ) -> Result<(), BackendError> {
        if cancel.load(Ordering::Acquire) {
            return Err(BackendError::Cancelled);
        }

        let payload = ChatPayload::from(request);
        let mut forwarded = 0_usize;
        let mut counting = |bytes: &[u8]| {
            forwarded += bytes.len();
            on_chunk(bytes)
        };

        let result = self.stream_client.stream(&payload, &cancel, &mut counting);
        debug!(thread_id = %payload.thread_id, bytes = forwarded, "chat stream closed");
        match result {
            Ok(()) => Ok(()),
            Err(NotebookApiError::Cancelled) => Err(BackendError::Cancelled),
            Err(api_error) => {
                error!(thread_id = %payload.thread_id, error = %api_error, "chat stream failed");
                Err(BackendError::from(api_error))
            }
        }
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output, NotebookApiError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            NotebookApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
        })?;

    Ok(runtime.block_on(future))
}

fn map_init_error(error: NotebookApiError) -> BackendError {
    BackendError::Transport(format!("failed to initialize http backend: {error}"))
}
