//! In-process message store.
//!
//! Channels and messages live in memory. Used for local dry runs and as the
//! fake store in tests, where failures can be injected per channel or per
//! message.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ChannelId, ChannelInfo, ChannelKind, Message, MessageId, MessageStore, Notifier, StoreError,
};
use crate::config::MemoryStoreConfig;

/// Ordering key: creation time first, insertion sequence to break ties.
type MessageKey = (i64, u64);

struct MemoryChannel {
    info: ChannelInfo,
    messages: BTreeMap<MessageKey, Message>,
}

#[derive(Default)]
struct MemoryState {
    channels: HashMap<ChannelId, MemoryChannel>,
    /// Keys of every message ever inserted, so deleted ids still work as cursors.
    keys: HashMap<MessageId, MessageKey>,
    next_seq: u64,
    deletions: Vec<(ChannelId, Message)>,
    notices: Vec<(ChannelId, String)>,
    queries: usize,
    failing_queries: HashSet<ChannelId>,
    denied_deletes: HashSet<MessageId>,
    failing_deletes: HashSet<MessageId>,
}

/// Message store backed by process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the configured (empty) channels.
    pub fn from_config(config: &MemoryStoreConfig) -> Self {
        let store = Self::new();
        for channel in &config.channels {
            store.add_channel(channel.id.as_str(), &channel.name, channel.kind);
        }
        store
    }

    /// Register a channel. Replaces any existing channel with the same id.
    pub fn add_channel(&self, id: &str, name: &str, kind: ChannelKind) -> ChannelId {
        let id = ChannelId::new(id);
        let mut state = self.state.lock();
        state.channels.insert(
            id.clone(),
            MemoryChannel {
                info: ChannelInfo {
                    id: id.clone(),
                    name: name.to_string(),
                    kind,
                },
                messages: BTreeMap::new(),
            },
        );
        id
    }

    /// Insert a message created at `created_timestamp` (epoch ms).
    ///
    /// Unknown channels are created as text channels named after their id.
    pub fn insert_message(&self, channel: &ChannelId, created_timestamp: i64) -> MessageId {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let key = (created_timestamp, state.next_seq);
        let id = MessageId::new(format!("m{}", state.next_seq));
        let message = Message {
            id: id.clone(),
            created_timestamp,
        };

        state.keys.insert(id.clone(), key);
        state
            .channels
            .entry(channel.clone())
            .or_insert_with(|| MemoryChannel {
                info: ChannelInfo {
                    id: channel.clone(),
                    name: channel.to_string(),
                    kind: ChannelKind::Text,
                },
                messages: BTreeMap::new(),
            })
            .messages
            .insert(key, message);
        id
    }

    /// Messages currently in a channel, oldest first.
    pub fn messages(&self, channel: &ChannelId) -> Vec<Message> {
        let state = self.state.lock();
        state
            .channels
            .get(channel)
            .map(|c| c.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every successful delete, in the order it happened.
    pub fn deletions(&self) -> Vec<(ChannelId, Message)> {
        self.state.lock().deletions.clone()
    }

    /// Every notice sent through this store, in the order it arrived.
    pub fn notices(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().notices.clone()
    }

    /// Number of history reads (latest and page fetches) served so far.
    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    /// Make every history read in `channel` fail.
    pub fn fail_queries(&self, channel: &ChannelId) {
        self.state.lock().failing_queries.insert(channel.clone());
    }

    /// Make deleting `message` fail with a permission error.
    pub fn deny_delete(&self, message: &MessageId) {
        self.state.lock().denied_deletes.insert(message.clone());
    }

    /// Make deleting `message` fail with a non-permission error.
    pub fn fail_delete(&self, message: &MessageId) {
        self.state.lock().failing_deletes.insert(message.clone());
    }

    fn begin_query(state: &mut MemoryState, channel: &ChannelId) -> Result<(), StoreError> {
        state.queries += 1;
        if state.failing_queries.contains(channel) {
            return Err(StoreError::Other(format!(
                "history unavailable for channel {channel}"
            )));
        }
        if !state.channels.contains_key(channel) {
            return Err(StoreError::NotFound(format!("channel {channel}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn fetch_latest(&self, channel: &ChannelId) -> Result<Option<Message>, StoreError> {
        let mut state = self.state.lock();
        Self::begin_query(&mut state, channel)?;
        Ok(state
            .channels
            .get(channel)
            .and_then(|c| c.messages.values().next_back().cloned()))
    }

    async fn fetch_page(
        &self,
        channel: &ChannelId,
        before: &MessageId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let mut state = self.state.lock();
        Self::begin_query(&mut state, channel)?;
        let Some(cursor) = state.keys.get(before).copied() else {
            return Err(StoreError::NotFound(format!("message {before}")));
        };
        Ok(state
            .channels
            .get(channel)
            .map(|c| {
                c.messages
                    .range(..cursor)
                    .rev()
                    .take(limit)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.denied_deletes.contains(message) {
            return Err(StoreError::Authorization("Missing Permissions".into()));
        }
        if state.failing_deletes.contains(message) {
            return Err(StoreError::Other(format!("could not delete message {message}")));
        }
        let key = state
            .keys
            .get(message)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("message {message}")))?;
        let removed = state
            .channels
            .get_mut(channel)
            .and_then(|c| c.messages.remove(&key))
            .ok_or_else(|| StoreError::NotFound(format!("message {message}")))?;
        state.deletions.push((channel.clone(), removed));
        Ok(())
    }

    async fn resolve_channel(&self, target: &str) -> Result<ChannelInfo, StoreError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(StoreError::InvalidTarget(target.to_string()));
        }
        let state = self.state.lock();
        state
            .channels
            .get(&ChannelId::new(target))
            .map(|c| c.info.clone())
            .ok_or_else(|| StoreError::NotFound(format!("channel {target}")))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl Notifier for InMemoryStore {
    async fn notify(&self, channel: &ChannelId, text: &str) -> Result<(), StoreError> {
        tracing::debug!(channel_id = %channel, text = %text, "Notice");
        self.state
            .lock()
            .notices
            .push((channel.clone(), text.to_string()));
        Ok(())
    }
}
