use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chat_backend::{Bookmark, Conversation, Message, NewBookmark};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::NotebookApiConfig;
use crate::error::{parse_error_message, NotebookApiError};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::payload::{
    BookmarkListResponse, BookmarkPayload, BookmarkResponse, ChatPayload, CreateThreadPayload,
    MessageListResponse, ThreadListResponse, ThreadRefPayload, ThreadResponse,
    TranslateMessagePayload, TranslateTextPayload, TranslationResponse,
};
use crate::url::normalize_api_base;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = chat_backend::CancelSignal;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct NotebookApiClient {
    http: Client,
    config: NotebookApiConfig,
    api_base: Url,
}

impl NotebookApiClient {
    pub fn new(config: NotebookApiConfig) -> Result<Self, NotebookApiError> {
        let normalized = normalize_api_base(&config.base_url, &config.api_prefix);
        let api_base = Url::parse(&normalized)
            .map_err(|error| NotebookApiError::InvalidBaseUrl(format!("{normalized}: {error}")))?;
        if api_base.cannot_be_a_base() {
            return Err(NotebookApiError::InvalidBaseUrl(normalized));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(NotebookApiError::from)?;
        Ok(Self {
            http,
            config,
            api_base,
        })
    }

    pub fn config(&self) -> &NotebookApiConfig {
        &self.config
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
    }

    /// Resolves an endpoint below the API base; each segment is percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, NotebookApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| NotebookApiError::InvalidBaseUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, NotebookApiError> {
        let headers = build_headers(&self.config, accept)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| NotebookApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    NotebookApiError::InvalidHeader(format!("invalid value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        accept: &str,
    ) -> Result<RequestBuilder, NotebookApiError> {
        let url = self.endpoint(segments)?;
        let headers = self.build_headers(accept)?;
        Ok(self.http.request(method, url).headers(headers))
    }

    pub fn build_chat_request(
        &self,
        payload: &ChatPayload,
    ) -> Result<RequestBuilder, NotebookApiError> {
        Ok(self
            .request(Method::POST, &["chat"], ACCEPT_EVENT_STREAM)?
            .json(payload))
    }

    pub async fn create_thread(&self, title: &str) -> Result<Conversation, NotebookApiError> {
        let request = self
            .request(Method::POST, &["threads"], ACCEPT_JSON)?
            .json(&CreateThreadPayload { title });
        let response: ThreadResponse = self.send_json(request).await?;
        Ok(response.thread)
    }

    pub async fn list_threads(&self) -> Result<Vec<Conversation>, NotebookApiError> {
        let request = self.request(Method::GET, &["threads"], ACCEPT_JSON)?;
        let response: ThreadListResponse = self.send_json(request).await?;
        Ok(response.threads)
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), NotebookApiError> {
        let request = self.request(Method::DELETE, &["threads", thread_id], ACCEPT_JSON)?;
        send_checked(request, None).await?;
        Ok(())
    }

    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, NotebookApiError> {
        let request = self.request(
            Method::GET,
            &["threads", thread_id, "messages"],
            ACCEPT_JSON,
        )?;
        let response: MessageListResponse = self.send_json(request).await?;
        Ok(response.messages)
    }

    pub async fn list_bookmarked_threads(&self) -> Result<Vec<Conversation>, NotebookApiError> {
        let request = self.request(Method::GET, &["bookmarked-threads"], ACCEPT_JSON)?;
        let response: ThreadListResponse = self.send_json(request).await?;
        Ok(response.threads)
    }

    pub async fn set_thread_bookmarked(
        &self,
        thread_id: &str,
        bookmarked: bool,
    ) -> Result<(), NotebookApiError> {
        let action = if bookmarked { "add" } else { "remove" };
        let request = self
            .request(Method::POST, &["bookmarked-threads", action], ACCEPT_JSON)?
            .json(&ThreadRefPayload { thread_id });
        send_checked(request, None).await?;
        Ok(())
    }

    pub async fn create_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, NotebookApiError> {
        let request = self
            .request(Method::POST, &["bookmarks"], ACCEPT_JSON)?
            .json(&BookmarkPayload::from(bookmark));
        let response: BookmarkResponse = self.send_json(request).await?;
        Ok(response.bookmark)
    }

    pub async fn list_bookmarks(&self, thread_id: &str) -> Result<Vec<Bookmark>, NotebookApiError> {
        let request = self.request(Method::GET, &["bookmarks", thread_id], ACCEPT_JSON)?;
        let response: BookmarkListResponse = self.send_json(request).await?;
        Ok(response.bookmarks)
    }

    pub async fn translate_message(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<Vec<Message>, NotebookApiError> {
        let request = self
            .request(Method::POST, &["translate"], ACCEPT_JSON)?
            .json(&TranslateMessagePayload {
                thread_id,
                message_id,
            });
        let response: MessageListResponse = self.send_json(request).await?;
        Ok(response.messages)
    }

    pub async fn translate_text(&self, text: &str) -> Result<String, NotebookApiError> {
        let request = self
            .request(Method::POST, &["translate-text"], ACCEPT_JSON)?
            .json(&TranslateTextPayload { text });
        let response: TranslationResponse = self.send_json(request).await?;
        Ok(response.translation.unwrap_or_default())
    }

    /// Sends the chat request once; non-success statuses fail without retry.
    pub async fn open_chat_stream(
        &self,
        payload: &ChatPayload,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, NotebookApiError> {
        if is_cancelled(cancellation) {
            return Err(NotebookApiError::Cancelled);
        }
        send_checked(self.build_chat_request(payload)?, cancellation).await
    }

    pub async fn stream_chat_with_handler<F>(
        &self,
        payload: &ChatPayload,
        cancellation: Option<&CancellationSignal>,
        mut on_chunk: F,
    ) -> Result<(), NotebookApiError>
    where
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        let response = self.open_chat_stream(payload, cancellation).await?;
        let mut bytes = response.bytes_stream();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(NotebookApiError::Cancelled);
            }
            let chunk = chunk.map_err(NotebookApiError::from)?;
            if on_chunk(&chunk).is_break() {
                debug!(thread_id = %payload.thread_id, "chat stream stopped by handler");
                return Ok(());
            }
        }

        if is_cancelled(cancellation) {
            return Err(NotebookApiError::Cancelled);
        }

        Ok(())
    }

    async fn send_json<T>(&self, request: RequestBuilder) -> Result<T, NotebookApiError>
    where
        T: DeserializeOwned,
    {
        let response = send_checked(request, None).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn send_checked(
    request: RequestBuilder,
    cancellation: Option<&CancellationSignal>,
) -> Result<Response, NotebookApiError> {
    let response = await_or_cancel(request.send(), cancellation)
        .await?
        .map_err(NotebookApiError::from)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = await_or_cancel(response.text(), cancellation)
        .await?
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(NotebookApiError::Status(
        status,
        parse_error_message(status, &body),
    ))
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, NotebookApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(NotebookApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(NotebookApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
