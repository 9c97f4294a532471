use std::collections::HashMap;

use chat_backend::{Message, MessageId};

/// Ordered, id-unique message list for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
    index_by_id: HashMap<MessageId, usize>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a transcript from a stored list. Later duplicates of an id are
    /// ignored.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut transcript = Self::new();
        for message in messages {
            transcript.append(message);
        }
        transcript
    }

    /// Appends `message` unless its id is already present. Returns whether the
    /// transcript changed.
    pub fn append(&mut self, message: Message) -> bool {
        if self.index_by_id.contains_key(&message.id) {
            return false;
        }

        self.index_by_id
            .insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        true
    }

    /// Replaces the content of `id`. Returns `false` when `id` is unknown.
    pub fn patch_content(&mut self, id: &str, content: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                if message.content != content {
                    message.content.clear();
                    message.content.push_str(content);
                }
                true
            }
            None => false,
        }
    }

    /// Replaces the translation of `id`; an empty translation reads as absent.
    pub fn patch_translation(&mut self, id: &str, translation: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.translated_content =
                    (!translation.is_empty()).then(|| translation.to_string());
                true
            }
            None => false,
        }
    }

    /// Swaps in a freshly loaded message list.
    pub fn replace(&mut self, messages: Vec<Message>) {
        *self = Self::from_messages(messages);
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index_by_id.get(id).map(|&index| &self.messages[index])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        let index = *self.index_by_id.get(id)?;
        self.messages.get_mut(index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
