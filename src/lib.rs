//! Banter - Discord conversational bot with voice
//!
//! This library provides the pieces the `banter` binary wires together:
//! - Bounded per-channel conversation history with separate text and voice tracks
//! - Completion requests against an OpenAI-compatible chat API
//! - Wake-word voice capture and synthesized voice replies
//! - The Discord adapter and the orchestrator that routes its events
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Discord (serenity)                   │
//! │     messages  │  commands  │  voice (songbird)        │
//! └───────────────────────┬──────────────────────────────┘
//!                         │ PlatformEvent / WakeEvent
//! ┌───────────────────────▼──────────────────────────────┐
//! │                 SessionOrchestrator                   │
//! │   ConversationStore  │  VoiceCapture  │  Playback     │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────────┐
//! │        CompletionGateway (OpenAI-compatible)          │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod voice;

pub use completion::{CompletionBackend, CompletionGateway};
pub use config::Config;
pub use conversation::{ConversationKey, ConversationStore, Message};
pub use error::{Error, Result};
pub use orchestrator::SessionOrchestrator;
