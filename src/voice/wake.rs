//! Wake phrase detection on finalized transcripts

/// Default wake token
pub const DEFAULT_WAKE_WORD: &str = "bot";

/// Case-insensitive wake phrase matcher
#[derive(Debug, Clone)]
pub struct WakePhrase {
    words: Vec<String>,
}

impl WakePhrase {
    /// Create a matcher; blank words are ignored
    #[must_use]
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?words, "wake phrase configured");
        Self { words }
    }

    /// Find the wake word contained in `transcript`, if any
    #[must_use]
    pub fn matches(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.words
            .iter()
            .find(|w| normalized.contains(w.as_str()))
            .map(String::as_str)
    }

    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl Default for WakePhrase {
    fn default() -> Self {
        Self::new([DEFAULT_WAKE_WORD])
    }
}

/// A wake phrase was heard in a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub guild_id: u64,
    /// Session that produced the event; stale if the guild has moved on
    pub session_id: u64,
    /// Lower-cased transcript
    pub text: String,
    /// Best-guess speaker
    pub speaker: Option<u64>,
}
