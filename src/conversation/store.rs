//! Bounded per-scope message store

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{ConversationKey, Message, SystemPrompts};

/// Default cap on track length, system prompt included
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Smallest usable cap: the system prompt plus one message
const MIN_HISTORY: usize = 2;

/// In-memory conversation tracks
///
/// Slot 0 of every track is the scope's system prompt and the track never
/// grows past `max_history` entries. All operations are infallible; the lock
/// is never held across an await point.
pub struct ConversationStore {
    max_history: usize,
    prompts: SystemPrompts,
    tracks: Mutex<HashMap<ConversationKey, Vec<Message>>>,
}

impl ConversationStore {
    /// Create a store
    ///
    /// `max_history` below 2 is raised to 2.
    #[must_use]
    pub fn new(max_history: usize, prompts: SystemPrompts) -> Self {
        Self {
            max_history: max_history.max(MIN_HISTORY),
            prompts,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    /// Maximum track length, system prompt included
    #[must_use]
    pub const fn max_history(&self) -> usize {
        self.max_history
    }

    /// System prompt for a scope
    #[must_use]
    pub fn system_prompt_for(&self, key: &ConversationKey) -> Message {
        self.prompts.message_for(key)
    }

    /// Append a message, evicting the oldest non-system messages over capacity
    pub fn append(&self, key: &ConversationKey, message: Message) {
        let mut tracks = self.tracks.lock();
        let track = tracks.entry(*key).or_default();

        if track.is_empty() {
            track.push(self.prompts.message_for(key));
        }

        track.push(message);

        if track.len() > self.max_history {
            let excess = track.len() - self.max_history;
            track.drain(1..=excess);
            tracing::trace!(id = key.id, track = ?key.track, evicted = excess, "history trimmed");
        }
    }

    /// Prompt window: system prompt, the most recent history, then `new_message`
    ///
    /// Does not touch stored history.
    #[must_use]
    pub fn window_for(&self, key: &ConversationKey, new_message: &Message) -> Vec<Message> {
        let tracks = self.tracks.lock();
        let keep = self.max_history - 1;

        let mut window = Vec::with_capacity(self.max_history + 1);
        match tracks.get(key).filter(|t| !t.is_empty()) {
            Some(track) => {
                window.push(track[0].clone());
                let history = &track[1..];
                let start = history.len().saturating_sub(keep);
                window.extend_from_slice(&history[start..]);
            }
            None => window.push(self.prompts.message_for(key)),
        }
        window.push(new_message.clone());
        window
    }

    /// Replace a track with a fresh system-prompt-only history
    pub fn reset(&self, key: &ConversationKey) {
        let system = self.prompts.message_for(key);
        self.tracks.lock().insert(*key, vec![system]);
        tracing::debug!(id = key.id, track = ?key.track, "history reset");
    }

    /// Snapshot of a track (empty if never touched)
    #[must_use]
    pub fn history(&self, key: &ConversationKey) -> Vec<Message> {
        self.tracks.lock().get(key).cloned().unwrap_or_default()
    }

    /// Number of messages in a track, system prompt included
    #[must_use]
    pub fn len(&self, key: &ConversationKey) -> usize {
        self.tracks.lock().get(key).map_or(0, Vec::len)
    }

    /// Whether a track has never been written
    #[must_use]
    pub fn is_empty(&self, key: &ConversationKey) -> bool {
        self.len(key) == 0
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY, SystemPrompts::default())
    }
}
