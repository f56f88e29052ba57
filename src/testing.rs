//! Scripted in-memory remote used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use crate::client::{NewMessage, RemoteBot, RemoteClient, RemoteUser};
use crate::error::ApiError;
use crate::models::{Conversation, Direction, Message, MessagePayload};
use crate::pager::Page;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn conversation(id: &str, integration: &str, updated_secs: i64) -> Conversation {
    Conversation::new(id, integration, ts(0), ts(updated_secs))
}

pub fn message(id: &str, conversation_id: &str, secs: i64, direction: Direction, user: &str) -> Message {
    Message {
        id: id.to_string(),
        direction,
        created_at: ts(secs),
        participant_id: user.to_string(),
        payload: MessagePayload::text(format!("text of {}", id)),
        conversation_id: conversation_id.to_string(),
    }
}

pub fn user(id: &str, name: &str) -> RemoteUser {
    RemoteUser {
        id: id.to_string(),
        tags: [("whatsapp:name".to_string(), name.to_string())].into_iter().collect(),
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MockState {
    conversation_pages: HashMap<Option<String>, Page<Conversation>>,
    message_pages: HashMap<(String, Option<String>), Page<Message>>,
    users: HashMap<String, RemoteUser>,
    bot: Option<RemoteBot>,
    conversation_failures: VecDeque<ApiError>,
    message_failures: HashMap<String, VecDeque<ApiError>>,
    create_failure: Option<ApiError>,
    delete_failure: Option<ApiError>,
    created: Vec<NewMessage>,
    deleted: Vec<String>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Default)]
pub struct MockClient {
    state: Mutex<MockState>,
    on_list_conversations: Mutex<Option<Hook>>,
    conversation_gate: Mutex<Option<Arc<Notify>>>,
    user_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_conversations(&self, token: Option<&str>, items: Vec<Conversation>, next: Option<&str>) {
        self.state().conversation_pages.insert(
            token.map(str::to_string),
            Page::new(items, next.map(str::to_string)),
        );
    }

    pub fn set_messages(&self, conversation_id: &str, token: Option<&str>, items: Vec<Message>, next: Option<&str>) {
        self.state().message_pages.insert(
            (conversation_id.to_string(), token.map(str::to_string)),
            Page::new(items, next.map(str::to_string)),
        );
    }

    pub fn set_user(&self, user: RemoteUser) {
        self.state().users.insert(user.id.clone(), user);
    }

    pub fn set_bot(&self, name: &str) {
        self.state().bot = Some(RemoteBot { name: name.to_string() });
    }

    /// Queue a failure for the next `list_conversations` call.
    pub fn fail_conversations(&self, err: ApiError) {
        self.state().conversation_failures.push_back(err);
    }

    /// Queue a failure for the next `list_messages` call on `conversation_id`.
    pub fn fail_messages(&self, conversation_id: &str, err: ApiError) {
        self.state()
            .message_failures
            .entry(conversation_id.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn fail_create(&self, err: ApiError) {
        self.state().create_failure = Some(err);
    }

    pub fn fail_delete(&self, err: ApiError) {
        self.state().delete_failure = Some(err);
    }

    /// Run `hook` inside every `list_conversations` call, before it answers.
    pub fn on_list_conversations(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_list_conversations.lock().unwrap() = Some(Box::new(hook));
    }

    /// Make `list_conversations` wait until `gate` is notified.
    pub fn hold_conversations(&self, gate: Arc<Notify>) {
        *self.conversation_gate.lock().unwrap() = Some(gate);
    }

    /// Make `get_user` wait until `gate` is notified.
    pub fn hold_users(&self, gate: Arc<Notify>) {
        *self.user_gate.lock().unwrap() = Some(gate);
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state().calls.get(name).copied().unwrap_or(0)
    }

    pub fn created(&self) -> Vec<NewMessage> {
        self.state().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    fn count(&self, name: &'static str) {
        *self.state().calls.entry(name).or_insert(0) += 1;
    }
}

#[async_trait]
impl RemoteClient for MockClient {
    async fn list_conversations(&self, next_token: Option<&str>) -> Result<Page<Conversation>, ApiError> {
        self.count("list_conversations");
        let gate = self.conversation_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(hook) = self.on_list_conversations.lock().unwrap().as_ref() {
            hook();
        }

        let mut state = self.state();
        if let Some(err) = state.conversation_failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .conversation_pages
            .get(&next_token.map(str::to_string))
            .cloned()
            .unwrap_or_else(|| Page::last(Vec::new())))
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        next_token: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        self.count("list_messages");
        let mut state = self.state();
        if let Some(err) = state
            .message_failures
            .get_mut(conversation_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(state
            .message_pages
            .get(&(conversation_id.to_string(), next_token.map(str::to_string)))
            .cloned()
            .unwrap_or_else(|| Page::last(Vec::new())))
    }

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ApiError> {
        self.count("get_user");
        let gate = self.user_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))
    }

    async fn get_bot(&self, bot_id: &str) -> Result<RemoteBot, ApiError> {
        self.count("get_bot");
        self.state()
            .bot
            .clone()
            .ok_or_else(|| ApiError::NotFound(format!("bot {}", bot_id)))
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError> {
        self.count("create_message");
        let mut state = self.state();
        if let Some(err) = state.create_failure.take() {
            return Err(err);
        }
        state.created.push(message.clone());
        Ok(Message {
            id: format!("sent-{}", state.created.len()),
            direction: Direction::Outgoing,
            created_at: ts(10_000 + state.created.len() as i64),
            participant_id: message.user_id,
            payload: message.payload,
            conversation_id: message.conversation_id,
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.count("delete_conversation");
        let mut state = self.state();
        if let Some(err) = state.delete_failure.take() {
            return Err(err);
        }
        state.deleted.push(conversation_id.to_string());
        Ok(())
    }
}
