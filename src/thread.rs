//! Message loading and sending for a single conversation.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::{NewMessage, RemoteClient};
use crate::error::ApiError;
use crate::merge::{merge_messages, MergeDirection};
use crate::models::{Message, MessagePayload};
use crate::pager::{self, Cursor};
use crate::retry::{retry_unless_rate_limited, RetryConfig};
use crate::session::Liveness;
use crate::sync::ConversationStore;

pub struct MessageLoader {
    client: Arc<dyn RemoteClient>,
    store: Arc<Mutex<ConversationStore>>,
    retry: RetryConfig,
    liveness: Liveness,
}

impl MessageLoader {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        store: Arc<Mutex<ConversationStore>>,
        retry: RetryConfig,
        liveness: Liveness,
    ) -> Self {
        Self {
            client,
            store,
            retry,
            liveness,
        }
    }

    /// Initial load of an opened conversation, retried with backoff.
    /// Returns the number of messages that were new.
    pub async fn open(&self, conversation_id: &str) -> Result<usize, ApiError> {
        self.load_latest(conversation_id, "open").await
    }

    /// Explicit re-fetch of the newest page, retried like `open`.
    pub async fn reload(&self, conversation_id: &str) -> Result<usize, ApiError> {
        self.load_latest(conversation_id, "reload").await
    }

    async fn load_latest(&self, conversation_id: &str, label: &str) -> Result<usize, ApiError> {
        let client = &self.client;
        let page = retry_unless_rate_limited(&self.retry, label, move || {
            client.list_messages(conversation_id, None)
        })
        .await?;

        let cursor = Cursor::after(page.next_token);
        self.merge_into(conversation_id, page.items, MergeDirection::Append, |current| {
            current.is_none().then_some(cursor)
        })
        .await
    }

    /// Prepend the next older page. A failure leaves messages and cursor as they were.
    pub async fn load_older(&self, conversation_id: &str) -> Result<usize, ApiError> {
        let cursor = {
            let store = self.store.lock().await;
            let conversation = store
                .get(conversation_id)
                .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?;
            conversation.message_cursor.clone().unwrap_or_default()
        };
        if !cursor.has_more() {
            crate::debug_log!("load_older: {} is at the start", conversation_id);
            return Ok(0);
        }

        let client = &self.client;
        let (older, next) = pager::fetch_next(&cursor, |token| async move {
            client.list_messages(conversation_id, token.as_deref()).await
        })
        .await?;

        self.merge_into(conversation_id, older, MergeDirection::Prepend, |_| Some(next))
            .await
    }

    /// Poll the newest page of the selected conversation. Nothing is mutated
    /// when the page holds no unseen message.
    pub async fn refresh(&self, conversation_id: &str) -> Result<usize, ApiError> {
        let page = self.client.list_messages(conversation_id, None).await?;
        let cursor = Cursor::after(page.next_token);
        self.merge_into(conversation_id, page.items, MergeDirection::Append, |current| {
            current.is_none().then_some(cursor)
        })
        .await
    }

    /// Reply in `conversation_id` as the bot user seen in its outgoing messages.
    pub async fn send_text(&self, conversation_id: &str, text: &str) -> Result<Message, ApiError> {
        let bot_user = {
            let store = self.store.lock().await;
            store
                .get(conversation_id)
                .ok_or_else(|| ApiError::NotFound(format!("conversation {}", conversation_id)))?
                .bot_user_id()
                .map(str::to_string)
        };
        let Some(user_id) = bot_user else {
            return Err(ApiError::Invalid(
                "no outgoing message yet, bot user unknown".to_string(),
            ));
        };
        self.send_custom(conversation_id, &user_id, text).await
    }

    /// Send `text` into any conversation as any user id.
    pub async fn send_custom(
        &self,
        conversation_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Message, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Invalid("empty message".to_string()));
        }

        let sent = self
            .client
            .create_message(NewMessage {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
                payload: MessagePayload::text(text),
            })
            .await?;
        crate::info_log!("send: {} -> {}", sent.id, conversation_id);

        if let Err(e) = self
            .merge_into(conversation_id, vec![sent.clone()], MergeDirection::Append, |_| None)
            .await
        {
            crate::debug_log!("send: {} is not held locally ({})", conversation_id, e);
        }
        Ok(sent)
    }

    /// Merge a batch into the held conversation. `next_cursor` sees the
    /// current cursor and returns a replacement, if any.
    async fn merge_into<F>(
        &self,
        conversation_id: &str,
        batch: Vec<Message>,
        direction: MergeDirection,
        next_cursor: F,
    ) -> Result<usize, ApiError>
    where
        F: FnOnce(Option<&Cursor>) -> Option<Cursor>,
    {
        if !self.liveness.is_alive() {
            crate::debug_log!("merge: session ended, dropping batch for {}", conversation_id);
            return Ok(0);
        }

        let mut store = self.store.lock().await;
        let Some(conversation) = store.get_mut(conversation_id) else {
            // Deleted while the call was in flight
            return Err(ApiError::NotFound(format!("conversation {}", conversation_id)));
        };

        let before = conversation.messages.len();
        let merged = merge_messages(&conversation.messages, batch, direction);
        let added = merged.len() - before;
        let cursor = next_cursor(conversation.message_cursor.as_ref());
        let cursor_moved = cursor.is_some() && cursor != conversation.message_cursor;

        if added == 0 && !cursor_moved {
            return Ok(0);
        }
        conversation.messages = merged;
        if let Some(cursor) = cursor {
            conversation.message_cursor = Some(cursor);
        }
        store.bump();
        crate::debug_log!("merge: {} new messages in {}", added, conversation_id);
        Ok(added)
    }
}
