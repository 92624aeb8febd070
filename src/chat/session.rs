// src/chat/session.rs — A live chat session
//
// Each session runs one reducer task. It is the only owner of the
// `SessionState`; vendor events and user commands reach it over channels, so
// updates are applied strictly in arrival order.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::app::{ActiveSession, App};
use super::message::{ChatUpdate, Message};
use super::reducer::{SessionState, TaggedEvent};
use crate::infra::errors::ShimError;
use crate::sdk::{SessionEvent, VendorSession};

/// Receives every state change. Called from the reducer task.
pub type UpdateCallback = Arc<dyn Fn(ChatUpdate) + Send + Sync>;

enum Command {
    Prompt {
        text: String,
        ack: oneshot::Sender<()>,
    },
    Abort {
        ack: oneshot::Sender<()>,
    },
    /// Apply everything already received, then reply with the state.
    Flush {
        reply: oneshot::Sender<ChatUpdate>,
    },
}

pub struct ChatSession {
    app: Arc<App>,
    vendor: Arc<dyn VendorSession>,
    correlation_id: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.vendor.session_id())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl ChatSession {
    pub(crate) fn spawn(
        app: Arc<App>,
        vendor: Arc<dyn VendorSession>,
        correlation_id: String,
        on_update: UpdateCallback,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let reducer = Reducer {
            state: SessionState::new(correlation_id.clone()),
            active: app.active().clone(),
            on_update,
        };
        tokio::spawn(reducer.run(vendor.subscribe(), rx));

        Self {
            app,
            vendor,
            correlation_id,
            commands,
        }
    }

    /// The vendor's persisted session id.
    pub fn session_id(&self) -> &str {
        self.vendor.session_id()
    }

    /// The shim's own id for this session. Never equal to the vendor id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Append the user's message, submit it and wait for the response to
    /// finish. By the time this returns the final update has been delivered.
    pub async fn send_message(&self, prompt: &str) -> Result<(), ShimError> {
        let (ack, acked) = oneshot::channel();
        self.command(Command::Prompt {
            text: prompt.to_string(),
            ack,
        })?;
        acked.await.map_err(|_| reducer_gone())?;

        match self.vendor.send_and_wait(prompt).await {
            Ok(()) => {
                self.messages().await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Send failed on session {}: {}", self.session_id(), e);
                let (ack, acked) = oneshot::channel();
                if self.command(Command::Abort { ack }).is_ok() {
                    let _ = acked.await;
                }
                Err(e)
            }
        }
    }

    /// Current messages after applying every event received so far.
    pub async fn messages(&self) -> Result<Vec<Message>, ShimError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Flush { reply })?;
        let update = rx.await.map_err(|_| reducer_gone())?;
        Ok(update.messages)
    }

    /// Stop the shared client. Other sessions on the same app stop too.
    pub async fn stop(&self) -> Result<(), ShimError> {
        self.app.shutdown().await
    }

    fn command(&self, cmd: Command) -> Result<(), ShimError> {
        self.commands.send(cmd).map_err(|_| reducer_gone())
    }
}

fn reducer_gone() -> ShimError {
    ShimError::vendor("session", "session task has stopped")
}

struct Reducer {
    state: SessionState,
    active: ActiveSession,
    on_update: UpdateCallback,
}

impl Reducer {
    /// Runs until the owning `ChatSession` is dropped.
    async fn run(
        mut self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut events_open = true;
        loop {
            tokio::select! {
                biased;
                ev = events.recv(), if events_open => match ev {
                    Ok(event) => self.handle(event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Session {} dropped {} events", self.state.correlation_id(), n);
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if events_open {
                            events_open = self.drain(&mut events);
                        }
                        self.execute(cmd);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Session {} reducer finished", self.state.correlation_id());
    }

    fn handle(&mut self, event: SessionEvent) {
        // Tag with whatever is active now; the state drops it if that isn't us.
        let tagged = TaggedEvent {
            correlation_id: self.active.current().unwrap_or_default(),
            event,
        };
        if let Some(update) = self.state.apply(&tagged) {
            (self.on_update)(update);
        }
    }

    /// Apply already-buffered events. Returns false once the stream has closed.
    fn drain(&mut self, events: &mut broadcast::Receiver<SessionEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) => self.handle(event),
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("Session {} dropped {} events", self.state.correlation_id(), n);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return false,
            }
        }
    }

    fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Prompt { text, ack } => {
                let update = self.state.begin_prompt(&text);
                (self.on_update)(update);
                let _ = ack.send(());
            }
            Command::Abort { ack } => {
                let update = self.state.abort();
                (self.on_update)(update);
                let _ = ack.send(());
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn reducer() -> (Reducer, Arc<Mutex<Vec<ChatUpdate>>>) {
        let active = ActiveSession::default();
        active.set("c");
        let mut state = SessionState::new("c");
        state.begin_prompt("q");
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        let reducer = Reducer {
            state,
            active,
            on_update: Arc::new(move |u| sink.lock().unwrap().push(u)),
        };
        (reducer, updates)
    }

    #[test]
    fn test_drain_continues_past_lag() {
        let (mut reducer, updates) = reducer();
        let (tx, mut rx) = broadcast::channel(2);
        for delta in ["a", "b", "c"] {
            tx.send(SessionEvent::delta(delta)).unwrap();
        }
        tx.send(SessionEvent::SessionIdle).unwrap();

        assert!(reducer.drain(&mut rx));

        let updates = updates.lock().unwrap();
        let last = updates.last().unwrap();
        assert!(!last.loading);
        assert_eq!(last.messages.len(), 2);
        assert_eq!(last.messages[1].content, "c");
    }

    #[test]
    fn test_drain_reports_closed_stream() {
        let (mut reducer, updates) = reducer();
        let (tx, mut rx) = broadcast::channel(4);
        tx.send(SessionEvent::delta("x")).unwrap();
        drop(tx);

        assert!(!reducer.drain(&mut rx));
        assert_eq!(updates.lock().unwrap().len(), 1);
    }
}
