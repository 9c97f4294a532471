use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chat_backend::{ConversationId, Message};

use crate::transcript::Transcript;

/// One conversation's transcript behind its own lock.
pub type SharedTranscript = Arc<Mutex<Transcript>>;

/// Transcripts for every open conversation, locked per conversation.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    conversations: Mutex<HashMap<ConversationId, SharedTranscript>>,
}

impl TranscriptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transcript for `conversation_id`, creating an empty one.
    pub fn transcript(&self, conversation_id: &str) -> SharedTranscript {
        let mut conversations = lock_unpoisoned(&self.conversations);
        Arc::clone(
            conversations
                .entry(conversation_id.to_string())
                .or_default(),
        )
    }

    pub fn snapshot(&self, conversation_id: &str) -> Vec<Message> {
        let transcript = lock_unpoisoned(&self.conversations)
            .get(conversation_id)
            .cloned();
        match transcript {
            Some(transcript) => lock_unpoisoned(&transcript).messages().to_vec(),
            None => Vec::new(),
        }
    }

    pub fn replace(&self, conversation_id: &str, messages: Vec<Message>) {
        let transcript = self.transcript(conversation_id);
        lock_unpoisoned(&transcript).replace(messages);
    }

    pub fn remove(&self, conversation_id: &str) -> bool {
        lock_unpoisoned(&self.conversations)
            .remove(conversation_id)
            .is_some()
    }

    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = lock_unpoisoned(&self.conversations)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
