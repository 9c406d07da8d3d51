//! In-memory implementations of every port, for tests and local runs
//! without external dependencies.

mod ports;
mod stores;

pub use ports::{EditedMessage, PlacedCall, RecordingChatPort, RecordingVoicePort, SentMessage};
pub use stores::InMemoryStore;
