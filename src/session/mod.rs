//! Client side of the chat: one conversation, one request in flight at a time.
//!
//! A [`ChatSession`] owns the transcript, persists it through a
//! [`ConversationStore`] after every change and talks to the bridge through a
//! [`ChatBackend`] under a deadline. Whatever goes wrong on the way, the user
//! only ever sees one of two calm error texts.

pub mod backend;
pub mod store;

use crate::cli::ChatArgs;
use crate::models::chat::{ Conversation, Message, Role };
use backend::{ ChatBackend, ExchangeError };
use log::{ info, warn, error };
use std::sync::Arc;
use std::time::Duration;
use store::ConversationStore;
use tokio::sync::watch;

pub const WELCOME_ID: &str = "welcome";
pub const WELCOME_TEXT: &str = "Hi there! I'm AskGio. How can I help you today?";
pub const CLEARED_ID: &str = "welcome-new";
pub const CLEARED_TEXT: &str = "Chat history cleared. How can I help you today?";
pub const EMPTY_REPLY_TEXT: &str = "Sorry, I couldn't process your request.";
pub const TIMEOUT_TEXT: &str = "The server took too long to respond. Please try again later.";
pub const FAILURE_TEXT: &str = "An error occurred. Please try again later.";
pub const CLEAR_PROMPT: &str = "Are you sure you want to clear the chat history?";

/// What the UI should show while a request is outstanding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    /// Request in flight; input is disabled.
    Waiting,
    /// Still waiting after the typing delay; show the indicator.
    Typing,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub deadline: Duration,
    pub typing_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(60_000),
            typing_delay: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    pub fn from_args(args: &ChatArgs) -> Self {
        Self {
            deadline: Duration::from_millis(args.timeout_ms),
            typing_delay: Duration::from_millis(args.typing_delay_ms),
        }
    }
}

/// Strips literal `**` markers and surrounding whitespace.
pub fn sanitize_reply(text: &str) -> String {
    text.replace("**", "").trim().to_string()
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ConversationStore>,
    config: SessionConfig,
    conversation: Conversation,
    input: String,
    status: watch::Sender<Status>,
}

impl ChatSession {
    /// Restores the saved conversation, or starts a new one with the welcome message.
    pub async fn open(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn ConversationStore>,
        config: SessionConfig
    ) -> Self {
        let stored = match store.load().await {
            // An empty transcript gets the welcome message like a missing one.
            Ok(stored) => stored.filter(|c| !c.is_empty()),
            Err(e) => {
                warn!("Ignoring unreadable saved conversation: {}", e);
                None
            }
        };

        let (status, _) = watch::channel(Status::Idle);
        let mut session = Self {
            backend,
            store,
            config,
            conversation: Conversation::new(),
            input: String::new(),
            status,
        };

        match stored {
            Some(conversation) => {
                info!("Restored conversation with {} messages", conversation.len());
                session.conversation = conversation;
            }
            None => {
                session.conversation = Conversation::with_message(
                    Message::new(WELCOME_ID, Role::Assistant, WELCOME_TEXT)
                );
                session.persist().await;
            }
        }
        session
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.status() != Status::Idle
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Submits the pending input buffer.
    pub async fn submit_input(&mut self) -> Option<&Message> {
        if self.input.trim().is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.input);
        self.submit(&text).await
    }

    /// Sends `text` and records the reply. Returns the assistant message that
    /// was appended, or `None` if `text` is blank and nothing happened.
    pub async fn submit(&mut self, text: &str) -> Option<&Message> {
        if text.trim().is_empty() {
            return None;
        }

        self.conversation.push(Message::user(text));
        self.input.clear();
        self.persist().await;

        self.status.send_replace(Status::Waiting);
        let outcome = self.await_reply(text).await;
        self.status.send_replace(Status::Idle);

        let reply = match outcome {
            Ok(raw) => {
                let clean = sanitize_reply(&raw);
                if clean.is_empty() {
                    Message::assistant(EMPTY_REPLY_TEXT)
                } else {
                    Message::assistant(clean)
                }
            }
            Err(e) => {
                error!("Chat exchange failed: {}", e);
                Message::error(if e.is_timeout() { TIMEOUT_TEXT } else { FAILURE_TEXT })
            }
        };
        self.conversation.push(reply);
        self.persist().await;
        self.conversation.last()
    }

    async fn await_reply(&self, text: &str) -> Result<String, ExchangeError> {
        let reply = backend::exchange(self.backend.as_ref(), text, self.config.deadline);
        let typing = tokio::time::sleep(self.config.typing_delay);
        tokio::pin!(reply);
        tokio::pin!(typing);

        tokio::select! {
            result = &mut reply => {
                return result;
            }
            _ = &mut typing => {}
        }
        self.status.send_replace(Status::Typing);
        reply.await
    }

    /// Replaces the conversation with a single fresh assistant message if
    /// `confirm` agrees. Returns whether anything was cleared.
    pub async fn clear<F>(&mut self, confirm: F) -> bool where F: FnOnce() -> bool {
        if !confirm() {
            return false;
        }
        self.conversation = Conversation::with_message(
            Message::new(CLEARED_ID, Role::Assistant, CLEARED_TEXT)
        );
        self.persist().await;
        true
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.conversation).await {
            error!("Failed to save conversation: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{ MemoryStore, StoreError };
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::{ Mutex, OnceLock };

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct FakeBackend {
        reply: Reply,
        delay: Duration,
        calls: AtomicUsize,
        store: Option<Arc<MemoryStore>>,
        saved_at_send: Mutex<Option<Conversation>>,
        status: OnceLock<watch::Receiver<Status>>,
        status_at_reply: Mutex<Option<Status>>,
    }

    impl FakeBackend {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                store: None,
                saved_at_send: Mutex::new(None),
                status: OnceLock::new(),
                status_at_reply: Mutex::new(None),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn watching(mut self, store: Arc<MemoryStore>) -> Self {
            self.store = Some(store);
            self
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn send(&self, _message: &str) -> Result<String, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(store) = &self.store {
                *self.saved_at_send.lock().unwrap() = store.snapshot();
            }
            tokio::time::sleep(self.delay).await;
            if let Some(rx) = self.status.get() {
                *self.status_at_reply.lock().unwrap() = Some(*rx.borrow());
            }
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(ExchangeError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn load(&self) -> Result<Option<Conversation>, StoreError> {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")))
        }

        async fn save(&self, _conversation: &Conversation) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")))
        }
    }

    async fn session_with(backend: Arc<FakeBackend>, store: Arc<MemoryStore>) -> ChatSession {
        ChatSession::open(backend, store, SessionConfig::default()).await
    }

    #[tokio::test]
    async fn fresh_session_starts_with_saved_welcome() {
        let store = Arc::new(MemoryStore::new());
        let session = session_with(Arc::new(FakeBackend::new(Reply::Text("x"))), store.clone()).await;

        assert_eq!(session.messages().len(), 1);
        let welcome = &session.messages()[0];
        assert_eq!(welcome.id, WELCOME_ID);
        assert_eq!(welcome.role, Role::Assistant);
        assert_eq!(welcome.content, WELCOME_TEXT);
        assert_eq!(store.snapshot().as_ref(), Some(session.conversation()));
    }

    #[tokio::test]
    async fn saved_conversation_is_restored_as_is() {
        let mut saved = Conversation::new();
        saved.push(Message::user("earlier"));
        saved.push(Message::assistant("answer"));
        let store = Arc::new(MemoryStore::with_conversation(saved.clone()));

        let session = session_with(Arc::new(FakeBackend::new(Reply::Text("x"))), store).await;
        assert_eq!(session.conversation(), &saved);
    }

    #[tokio::test]
    async fn empty_saved_conversation_starts_over() {
        let store = Arc::new(MemoryStore::with_conversation(Conversation::new()));
        let session = session_with(Arc::new(FakeBackend::new(Reply::Text("x"))), store.clone()).await;

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, WELCOME_ID);
        assert_eq!(store.snapshot().as_ref(), Some(session.conversation()));
    }

    #[tokio::test]
    async fn unreadable_store_still_opens() {
        let backend = Arc::new(FakeBackend::new(Reply::Text("Hi!")));
        let mut session = ChatSession::open(backend, Arc::new(BrokenStore), SessionConfig::default()).await;
        assert_eq!(session.messages()[0].content, WELCOME_TEXT);

        let reply = session.submit("hello").await.unwrap();
        assert_eq!(reply.content, "Hi!");
    }

    #[tokio::test]
    async fn blank_submit_is_a_no_op() {
        let backend = Arc::new(FakeBackend::new(Reply::Text("x")));
        let mut session = session_with(backend.clone(), Arc::new(MemoryStore::new())).await;
        let before = session.conversation().clone();

        for text in ["", "   ", "\n\t "] {
            assert!(session.submit(text).await.is_none());
        }
        session.set_input("  ");
        assert!(session.submit_input().await.is_none());

        assert_eq!(session.conversation(), &before);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.input(), "  ");
    }

    #[tokio::test]
    async fn user_message_is_saved_before_the_request() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(FakeBackend::new(Reply::Text("Hi!\n")).watching(store.clone()));
        let mut session = session_with(backend.clone(), store).await;

        session.submit("hello").await;

        let at_send = backend.saved_at_send.lock().unwrap().clone().unwrap();
        assert_eq!(at_send.len(), 2);
        let user = at_send.last().unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "hello");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reply_is_appended_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(Arc::new(FakeBackend::new(Reply::Text("Hi!\n"))), store.clone()).await;
        session.set_input("hello");

        let reply = session.submit_input().await.unwrap().clone();

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hi!");
        assert_eq!(session.input(), "");
        assert_eq!(session.messages().len(), 3);
        assert_eq!(store.snapshot().as_ref(), Some(session.conversation()));
        let stamps: Vec<i64> = session.messages().iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn reply_is_sanitized() {
        let mut session = session_with(
            Arc::new(FakeBackend::new(Reply::Text("  **Rust** is **great**\n"))),
            Arc::new(MemoryStore::new())
        ).await;
        assert_eq!(session.submit("hi").await.unwrap().content, "Rust is great");
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let mut session = session_with(
            Arc::new(FakeBackend::new(Reply::Text(" **** \n"))),
            Arc::new(MemoryStore::new())
        ).await;
        assert_eq!(session.submit("hi").await.unwrap().content, EMPTY_REPLY_TEXT);
    }

    #[tokio::test]
    async fn failure_shows_generic_text() {
        let mut session = session_with(
            Arc::new(FakeBackend::new(Reply::Fail)),
            Arc::new(MemoryStore::new())
        ).await;
        let reply = session.submit("hi").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, FAILURE_TEXT);
        assert!(reply.id.starts_with("error-"));
        assert_eq!(session.status(), Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_shows_timeout_text() {
        let mut session = session_with(
            Arc::new(FakeBackend::new(Reply::Hang)),
            Arc::new(MemoryStore::new())
        ).await;

        let started = tokio::time::Instant::now();
        let reply = session.submit("hi").await.unwrap().clone();

        assert_eq!(reply.content, TIMEOUT_TEXT);
        assert_ne!(TIMEOUT_TEXT, FAILURE_TEXT);
        assert!(started.elapsed() >= Duration::from_millis(60_000));
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn typing_indicator_appears_after_delay() {
        let backend = Arc::new(FakeBackend::new(Reply::Text("slow")).delayed(Duration::from_secs(2)));
        let mut session = session_with(backend.clone(), Arc::new(MemoryStore::new())).await;
        backend.status.set(session.subscribe()).unwrap();

        session.submit("hi").await;

        assert_eq!(*backend.status_at_reply.lock().unwrap(), Some(Status::Typing));
        assert_eq!(session.status(), Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_reply_never_shows_typing() {
        let backend = Arc::new(FakeBackend::new(Reply::Text("fast")).delayed(Duration::from_millis(100)));
        let mut session = session_with(backend.clone(), Arc::new(MemoryStore::new())).await;
        backend.status.set(session.subscribe()).unwrap();

        session.submit("hi").await;

        assert_eq!(*backend.status_at_reply.lock().unwrap(), Some(Status::Waiting));
        assert_eq!(session.status(), Status::Idle);
    }

    #[tokio::test]
    async fn clear_respects_confirmation() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(Arc::new(FakeBackend::new(Reply::Text("Hi!"))), store.clone()).await;
        session.submit("hello").await;
        let before = session.conversation().clone();

        assert!(!session.clear(|| false).await);
        assert_eq!(session.conversation(), &before);

        assert!(session.clear(|| true).await);
        assert_eq!(session.messages().len(), 1);
        let only = &session.messages()[0];
        assert_eq!(only.role, Role::Assistant);
        assert_eq!(only.id, CLEARED_ID);
        assert_eq!(only.content, CLEARED_TEXT);
        assert_eq!(store.snapshot().as_ref(), Some(session.conversation()));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "plain",
            "**bold**",
            "***",
            "****",
            "a***b",
            " * ** * ",
            "\n**  spaced  **\n",
            "*****x*****",
            "",
        ];
        for s in samples {
            let once = sanitize_reply(s);
            assert_eq!(sanitize_reply(&once), once, "input {:?}", s);
            assert!(!once.contains("**"), "input {:?}", s);
        }
        assert_eq!(sanitize_reply("  **Hi!**\n"), "Hi!");
    }
}
