// tests/session_test.rs — Integration tests for the chat session shim

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use copilot_chat::chat::{App, ChatUpdate, Role, UpdateCallback};
use copilot_chat::cli::models::create_session_remembering;
use copilot_chat::infra::errors::ShimError;
use copilot_chat::infra::storage::{LocalStorage, SELECTED_MODEL_KEY};
use copilot_chat::sdk::{
    ClientState, CopilotBackend, ModelInfo, SessionEvent, SessionOptions, SessionSummary,
    VendorClient, VendorSession,
};

// ---------- In-memory vendor ----------

struct FakeSession {
    id: String,
    events: broadcast::Sender<SessionEvent>,
    /// Emitted in order on every send.
    script: Vec<SessionEvent>,
    fail_send: bool,
    prompts: Mutex<Vec<String>>,
    before_send: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl FakeSession {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl VendorSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send_and_wait(&self, prompt: &str) -> Result<(), ShimError> {
        if let Some(hook) = self.before_send.lock().unwrap().as_ref() {
            hook();
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_send {
            return Err(ShimError::vendor("session.send", "rate limited"));
        }
        for event in &self.script {
            self.emit(event.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeClient {
    starts: AtomicUsize,
    stops: AtomicUsize,
    connected: Mutex<bool>,
    script: Vec<SessionEvent>,
    fail_send: bool,
    fail_create: bool,
    /// Model ids the vendor refuses at create time.
    rejected_model: Option<String>,
    /// Session id the vendor no longer knows about.
    missing_session: Option<String>,
    created: Mutex<Vec<(Option<String>, bool)>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeClient {
    fn new(script: Vec<SessionEvent>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    fn open(&self, id: String) -> Arc<dyn VendorSession> {
        let (events, _) = broadcast::channel(64);
        let session = Arc::new(FakeSession {
            id,
            events,
            script: self.script.clone(),
            fail_send: self.fail_send,
            prompts: Mutex::new(Vec::new()),
            before_send: Mutex::new(None),
        });
        self.sessions.lock().unwrap().push(session.clone());
        session
    }

    fn session(&self, idx: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl VendorClient for FakeClient {
    fn state(&self) -> ClientState {
        if *self.connected.lock().unwrap() {
            ClientState::Connected
        } else {
            ClientState::Disconnected
        }
    }

    async fn start(&self) -> Result<(), ShimError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        // Give racing callers a chance to interleave.
        tokio::task::yield_now().await;
        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ShimError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.connected.lock().unwrap() = false;
        Ok(())
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn VendorSession>, ShimError> {
        if self.fail_create || (options.model.is_some() && options.model == self.rejected_model) {
            return Err(ShimError::vendor("session.create", "model not available"));
        }
        self.created
            .lock()
            .unwrap()
            .push((options.model.clone(), options.streaming));
        let n = self.sessions.lock().unwrap().len();
        Ok(self.open(format!("vendor-{n}")))
    }

    async fn resume_session(
        &self,
        session_id: &str,
        _options: SessionOptions,
    ) -> Result<Arc<dyn VendorSession>, ShimError> {
        if self.missing_session.as_deref() == Some(session_id) {
            return Err(ShimError::vendor("session.resume", "session not found"));
        }
        Ok(self.open(session_id.to_string()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ShimError> {
        Ok(vec![ModelInfo {
            id: "gpt-4.1".into(),
            ..Default::default()
        }])
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ShimError> {
        Ok(Vec::new())
    }

    async fn delete_session(&self, _session_id: &str) -> Result<(), ShimError> {
        Ok(())
    }

    async fn last_session_id(&self) -> Result<Option<String>, ShimError> {
        Ok(Some("vendor-last".into()))
    }
}

struct FakeBackend {
    builds: AtomicUsize,
    client: Arc<FakeClient>,
}

impl FakeBackend {
    fn new(client: FakeClient) -> Arc<Self> {
        Arc::new(Self {
            builds: AtomicUsize::new(0),
            client: Arc::new(client),
        })
    }
}

impl CopilotBackend for FakeBackend {
    fn build_client(&self, working_dir: &Path) -> Result<Arc<dyn VendorClient>, ShimError> {
        assert!(working_dir.is_dir(), "sandbox should exist before build");
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

// ---------- Helpers ----------

type Updates = Arc<Mutex<Vec<ChatUpdate>>>;

fn recorder() -> (Updates, UpdateCallback) {
    let updates: Updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let callback: UpdateCallback = Arc::new(move |u: ChatUpdate| sink.lock().unwrap().push(u));
    (updates, callback)
}

fn app_with(backend: Arc<FakeBackend>) -> (Arc<App>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = App::new(backend, dir.path().join("sandbox"));
    (app, dir)
}

fn streamed(deltas: &[&str]) -> Vec<SessionEvent> {
    let mut events: Vec<SessionEvent> = deltas.iter().map(|d| SessionEvent::delta(*d)).collect();
    events.push(SessionEvent::SessionIdle);
    events
}

// ---------- Tests ----------

#[tokio::test]
async fn test_streamed_reply_is_assembled() {
    let backend = FakeBackend::new(FakeClient::new(streamed(&["Hi", "Hi", " there"])));
    let (app, _dir) = app_with(backend.clone());
    let (updates, callback) = recorder();

    let session = app.create_session(Some("gpt-4.1"), callback).await.unwrap();
    session.send_message("greet me").await.unwrap();

    let updates = updates.lock().unwrap();
    let last = updates.last().unwrap();
    assert!(!last.loading);
    assert_eq!(last.messages.len(), 2);
    assert_eq!(last.messages[0].role, Role::User);
    assert_eq!(last.messages[0].content, "greet me");
    assert_eq!(last.messages[1].role, Role::Assistant);
    assert_eq!(last.messages[1].content, "Hi there");
    assert!(!last.messages[1].streaming);

    // prompt, two distinct deltas, idle
    assert_eq!(updates.len(), 4);
    assert!(updates[0].loading);
}

#[tokio::test]
async fn test_sessions_are_streaming_with_requested_model() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend.clone());
    let (_, callback) = recorder();

    app.create_session(Some("o1"), callback.clone()).await.unwrap();
    app.create_session(None, callback).await.unwrap();

    let created = backend.client.created.lock().unwrap().clone();
    assert_eq!(created, vec![(Some("o1".to_string()), true), (None, true)]);
}

#[tokio::test]
async fn test_user_message_appended_before_vendor_call() {
    let backend = FakeBackend::new(FakeClient::new(streamed(&["ok"])));
    let (app, _dir) = app_with(backend.clone());
    let (updates, callback) = recorder();
    let session = app.create_session(None, callback).await.unwrap();

    let seen = Arc::new(Mutex::new(None));
    {
        let updates = updates.clone();
        let seen = seen.clone();
        *backend.client.session(0).before_send.lock().unwrap() = Some(Box::new(move || {
            let updates = updates.lock().unwrap();
            *seen.lock().unwrap() = updates.last().map(|u| (u.messages.len(), u.loading));
        }));
    }

    session.send_message("question").await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some((1, true)));
}

#[tokio::test]
async fn test_duplicate_idle_finalizes_once() {
    let mut script = streamed(&["done"]);
    script.push(SessionEvent::SessionIdle);
    let backend = FakeBackend::new(FakeClient::new(script));
    let (app, _dir) = app_with(backend);
    let (updates, callback) = recorder();

    let session = app.create_session(None, callback).await.unwrap();
    session.send_message("q").await.unwrap();

    let updates = updates.lock().unwrap();
    let finished = updates.iter().filter(|u| !u.loading).count();
    assert_eq!(finished, 1);
    assert_eq!(updates.len(), 3);
}

#[tokio::test]
async fn test_send_failure_keeps_user_message_and_stops_loading() {
    let mut client = FakeClient::new(vec![]);
    client.fail_send = true;
    let backend = FakeBackend::new(client);
    let (app, _dir) = app_with(backend);
    let (updates, callback) = recorder();

    let session = app.create_session(None, callback).await.unwrap();
    let err = session.send_message("hello?").await.unwrap_err();
    assert!(err.to_string().contains("rate limited"));

    let messages = session.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    let updates = updates.lock().unwrap();
    assert!(updates.first().unwrap().loading);
    assert!(!updates.last().unwrap().loading);
}

#[tokio::test]
async fn test_events_from_replaced_session_are_ignored() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend.clone());
    let (old_updates, old_callback) = recorder();
    let (new_updates, new_callback) = recorder();

    let old = app.create_session(None, old_callback).await.unwrap();
    let new = app.create_session(None, new_callback).await.unwrap();

    // The old vendor session keeps talking after it was replaced.
    let stale = backend.client.session(0);
    stale.emit(SessionEvent::delta("ghost"));
    stale.emit(SessionEvent::SessionIdle);

    assert!(old.messages().await.unwrap().is_empty());
    assert!(new.messages().await.unwrap().is_empty());
    assert!(old_updates.lock().unwrap().is_empty());
    assert!(new_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_client_built_and_started_once() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend.clone());

    let (a, b) = tokio::join!(app.client(), app.client());
    assert!(a.is_ok() && b.is_ok());
    let (_, callback) = recorder();
    app.create_session(None, callback.clone()).await.unwrap();
    app.create_session(None, callback).await.unwrap();

    assert_eq!(backend.builds.load(Ordering::SeqCst), 1);
    assert_eq!(backend.client.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sandbox_created_on_first_use() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend);
    assert!(!app.sandbox_dir().exists());
    app.client().await.unwrap();
    assert!(app.sandbox_dir().is_dir());
}

#[tokio::test]
async fn test_stop_discards_client() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend.clone());
    let (_, callback) = recorder();

    let session = app.create_session(None, callback.clone()).await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(backend.client.stops.load(Ordering::SeqCst), 1);
    assert!(app.active().current().is_none());

    // Next use builds and starts a new client.
    app.create_session(None, callback).await.unwrap();
    assert_eq!(backend.builds.load(Ordering::SeqCst), 2);
    assert_eq!(backend.client.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stop_without_client_is_noop() {
    let backend = FakeBackend::new(FakeClient::new(vec![]));
    let (app, _dir) = app_with(backend.clone());
    app.shutdown().await.unwrap();
    assert_eq!(backend.client.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resume_uses_fresh_correlation_id() {
    let backend = FakeBackend::new(FakeClient::new(streamed(&["welcome back"])));
    let (app, _dir) = app_with(backend);
    let (_, callback) = recorder();

    let last = app.last_session_id().await.unwrap().unwrap();
    let session = app.resume_session(&last, callback).await.unwrap();
    assert_eq!(session.session_id(), "vendor-last");
    assert_ne!(session.correlation_id(), session.session_id());

    session.send_message("hi").await.unwrap();
    let messages = session.messages().await.unwrap();
    assert_eq!(messages[1].content, "welcome back");
}

#[tokio::test]
async fn test_create_failure_propagates() {
    let mut client = FakeClient::new(vec![]);
    client.fail_create = true;
    let backend = FakeBackend::new(client);
    let (app, _dir) = app_with(backend);
    let (_, callback) = recorder();

    let err = app.create_session(Some("nope"), callback).await.unwrap_err();
    assert!(err.to_string().contains("model not available"));
}

#[tokio::test]
async fn test_failed_create_keeps_current_session_live() {
    let mut client = FakeClient::new(streamed(&["Hel", "lo"]));
    client.rejected_model = Some("bad".into());
    let backend = FakeBackend::new(client);
    let (app, _dir) = app_with(backend);
    let (updates, callback) = recorder();

    let session = app.create_session(None, callback.clone()).await.unwrap();
    let before = app.active().current();
    assert!(app.create_session(Some("bad"), callback).await.is_err());
    assert_eq!(app.active().current(), before);

    session.send_message("hi").await.unwrap();
    let messages = session.messages().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hello");
    assert!(!updates.lock().unwrap().last().unwrap().loading);
}

#[tokio::test]
async fn test_failed_resume_keeps_current_session_live() {
    let mut client = FakeClient::new(streamed(&["Hello"]));
    client.missing_session = Some("gone".into());
    let backend = FakeBackend::new(client);
    let (app, _dir) = app_with(backend);
    let (updates, callback) = recorder();

    let session = app.create_session(None, callback.clone()).await.unwrap();
    let err = app.resume_session("gone", callback).await.unwrap_err();
    assert!(err.to_string().contains("session not found"));
    assert!(app.active().is_active(session.correlation_id()));

    session.send_message("hi").await.unwrap();
    let messages = session.messages().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hello");
    assert!(!updates.lock().unwrap().last().unwrap().loading);
}

#[tokio::test]
async fn test_model_remembered_only_once_accepted() {
    let mut client = FakeClient::new(vec![]);
    client.rejected_model = Some("bad".into());
    let backend = FakeBackend::new(client);
    let (app, dir) = app_with(backend);
    let storage = LocalStorage::new(dir.path().join("state.json"));
    let (_, callback) = recorder();

    let rejected =
        create_session_remembering(&app, &storage, Some("bad"), true, callback.clone()).await;
    assert!(rejected.is_err());
    assert_eq!(storage.get_item(SELECTED_MODEL_KEY), None);

    create_session_remembering(&app, &storage, Some("o1"), false, callback.clone())
        .await
        .unwrap();
    assert_eq!(storage.get_item(SELECTED_MODEL_KEY), None);

    create_session_remembering(&app, &storage, Some("gpt-4.1"), true, callback)
        .await
        .unwrap();
    assert_eq!(
        storage.get_item(SELECTED_MODEL_KEY).as_deref(),
        Some("gpt-4.1")
    );
}

#[tokio::test]
async fn test_consecutive_turns() {
    let backend = FakeBackend::new(FakeClient::new(streamed(&["a"])));
    let (app, _dir) = app_with(backend.clone());
    let (_, callback) = recorder();

    let session = app.create_session(None, callback).await.unwrap();
    session.send_message("one").await.unwrap();
    session.send_message("two").await.unwrap();

    let messages = session.messages().await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert!(messages.iter().all(|m| !m.streaming));
    assert_eq!(
        *backend.client.session(0).prompts.lock().unwrap(),
        vec!["one".to_string(), "two".to_string()]
    );
}
