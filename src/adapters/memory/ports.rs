//! Recording provider ports for tests.
//!
//! Both ports record every invocation and can be told to fail the next
//! calls with a transient or permanent error.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{CallRequest, ChatPort, InlineButton, ProviderError, VoicePort};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub buttons: Vec<InlineButton>,
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub chat_id: String,
    pub message_id: String,
    pub text: String,
    pub buttons: Vec<InlineButton>,
}

#[derive(Default)]
pub struct RecordingChatPort {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    callbacks: Mutex<Vec<(String, String)>>,
    counter: AtomicU64,
    fail_transient: AtomicUsize,
}

impl RecordingChatPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` operations with a transient error.
    pub fn fail_next_transient(&self, n: usize) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn callbacks(&self) -> Vec<(String, String)> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn maybe_fail(&self) -> Result<(), ProviderError> {
        let remaining = self.fail_transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_transient.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::transient("injected chat failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPort for RecordingChatPort {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<String, ProviderError> {
        self.maybe_fail()?;
        let message_id = format!("m-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
                buttons: buttons.to_vec(),
                message_id: message_id.clone(),
            });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), ProviderError> {
        self.maybe_fail()?;
        self.edits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EditedMessage {
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
                text: text.to_string(),
                buttons: buttons.to_vec(),
            });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ProviderError> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub call_id: String,
    pub request: CallRequest,
}

#[derive(Default)]
pub struct RecordingVoicePort {
    calls: Mutex<Vec<PlacedCall>>,
    hangups: Mutex<Vec<String>>,
    counter: AtomicU64,
    fail_transient: AtomicUsize,
}

impl RecordingVoicePort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` placements with a transient error.
    pub fn fail_next_transient(&self, n: usize) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlacedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn hangups(&self) -> Vec<String> {
        self.hangups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl VoicePort for RecordingVoicePort {
    async fn place_call(&self, request: &CallRequest) -> Result<String, ProviderError> {
        let remaining = self.fail_transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_transient.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::transient("injected voice failure"));
        }

        let call_id = format!("call-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PlacedCall {
                call_id: call_id.clone(),
                request: request.clone(),
            });
        Ok(call_id)
    }

    async fn hangup(&self, provider_call_id: &str) -> Result<(), ProviderError> {
        self.hangups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(provider_call_id.to_string());
        Ok(())
    }
}
