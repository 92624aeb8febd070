// src/chat/reducer.rs — Session state machine
//
// Folds user prompts and vendor events into the message list. All guards are
// explicit state here: stale correlation ids, empty and repeated deltas, and
// the once-per-response idle latch.

use super::message::{ChatUpdate, Message};
use crate::sdk::SessionEvent;

/// A vendor event stamped with the correlation id that was active when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub correlation_id: String,
    pub event: SessionEvent,
}

#[derive(Debug)]
pub struct SessionState {
    correlation_id: String,
    messages: Vec<Message>,
    loading: bool,
    /// Index of the assistant message currently being streamed into.
    in_progress: Option<usize>,
    last_delta: Option<String>,
    idle_handled: bool,
}

impl SessionState {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            messages: Vec::new(),
            loading: false,
            in_progress: None,
            last_delta: None,
            idle_handled: false,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn snapshot(&self) -> ChatUpdate {
        ChatUpdate {
            messages: self.messages.clone(),
            loading: self.loading,
        }
    }

    /// Optimistically append the user's message and start a new response.
    pub fn begin_prompt(&mut self, prompt: &str) -> ChatUpdate {
        self.close_in_progress();
        self.messages.push(Message::user(prompt));
        self.loading = true;
        self.last_delta = None;
        self.idle_handled = false;
        self.snapshot()
    }

    /// Apply one vendor event. Returns the new state when something changed.
    pub fn apply(&mut self, tagged: &TaggedEvent) -> Option<ChatUpdate> {
        if tagged.correlation_id != self.correlation_id {
            tracing::debug!(
                "Dropping event for stale session {} (ours: {})",
                tagged.correlation_id,
                self.correlation_id
            );
            return None;
        }

        match tagged.event {
            SessionEvent::AssistantMessageDelta { ref delta_content } => {
                self.append_delta(delta_content)
            }
            SessionEvent::SessionIdle => self.finish(),
            _ => None,
        }
    }

    /// The vendor call failed: stop loading without waiting for an idle event.
    pub fn abort(&mut self) -> ChatUpdate {
        self.finish();
        self.snapshot()
    }

    fn append_delta(&mut self, delta: &str) -> Option<ChatUpdate> {
        if delta.is_empty() {
            return None;
        }
        // Duplicate delivery from the SDK repeats the previous fragment verbatim.
        if self.last_delta.as_deref() == Some(delta) {
            return None;
        }
        self.last_delta = Some(delta.to_string());

        let idx = match self.in_progress {
            Some(idx) => idx,
            None => {
                self.messages.push(Message::assistant_streaming());
                let idx = self.messages.len() - 1;
                self.in_progress = Some(idx);
                idx
            }
        };
        self.messages[idx].content.push_str(delta);
        self.loading = true;
        Some(self.snapshot())
    }

    fn finish(&mut self) -> Option<ChatUpdate> {
        if self.idle_handled {
            return None;
        }
        self.idle_handled = true;
        self.close_in_progress();
        self.loading = false;
        Some(self.snapshot())
    }

    fn close_in_progress(&mut self) {
        if let Some(idx) = self.in_progress.take() {
            self.messages[idx].streaming = false;
        }
    }
}
