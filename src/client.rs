use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{Conversation, Direction, Message, MessagePayload};
use crate::pager::Page;

pub const DEFAULT_API_URL: &str = "https://api.botpress.cloud";

/// A user as returned by the remote, identified by tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: String,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBot {
    pub name: String,
}

/// Body of a message the operator sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub user_id: String,
    pub payload: MessagePayload,
}

/// Call surface of the remote messaging backend.
///
/// The sync core only depends on this trait; the handle it receives is
/// already authenticated.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn list_conversations(&self, next_token: Option<&str>) -> Result<Page<Conversation>, ApiError>;

    async fn list_messages(
        &self,
        conversation_id: &str,
        next_token: Option<&str>,
    ) -> Result<Page<Message>, ApiError>;

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ApiError>;

    async fn get_bot(&self, bot_id: &str) -> Result<RemoteBot, ApiError>;

    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMeta {
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListConversationsResponse {
    #[serde(default)]
    conversations: Vec<ConversationItem>,
    #[serde(default)]
    meta: ListMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationItem {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    integration: String,
    #[serde(default)]
    channel: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageItem>,
    #[serde(default)]
    meta: ListMeta,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: MessageItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageItem {
    id: String,
    created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    direction: Direction,
    user_id: String,
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserItem,
}

#[derive(Debug, Deserialize)]
struct UserItem {
    id: String,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BotEnvelope {
    bot: BotItem,
}

#[derive(Debug, Deserialize)]
struct BotItem {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageBody<'a> {
    conversation_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    payload: Value,
    tags: HashMap<String, String>,
}

impl From<ConversationItem> for Conversation {
    fn from(item: ConversationItem) -> Self {
        // Older API revisions only fill `channel`
        let integration = if item.integration.is_empty() {
            item.channel
        } else {
            item.integration
        };
        Conversation::new(item.id, integration, item.created_at, item.updated_at)
    }
}

impl From<MessageItem> for Message {
    fn from(item: MessageItem) -> Self {
        Message {
            payload: decode_payload(&item.kind, &item.payload),
            id: item.id,
            direction: item.direction,
            created_at: item.created_at,
            participant_id: item.user_id,
            conversation_id: item.conversation_id,
        }
    }
}

fn decode_payload(kind: &str, payload: &Value) -> MessagePayload {
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match kind {
        "text" => MessagePayload::Text { text: field("text") },
        "image" => MessagePayload::Image {
            image_url: field("imageUrl"),
        },
        other => MessagePayload::Unsupported {
            kind: other.to_string(),
        },
    }
}

fn encode_payload(payload: &MessagePayload) -> Value {
    match payload {
        MessagePayload::Text { text } => json!({ "text": text }),
        MessagePayload::Image { image_url } => json!({ "imageUrl": image_url }),
        MessagePayload::Unsupported { .. } => json!({}),
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Botpress cloud API client.
#[derive(Clone)]
pub struct BotpressClient {
    http: HttpClient,
    base_url: String,
    token: String,
    workspace_id: String,
    bot_id: String,
}

impl BotpressClient {
    pub fn new(base_url: &str, token: &str, workspace_id: &str, bot_id: &str) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            workspace_id: workspace_id.to_string(),
            bot_id: bot_id.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("x-bot-id", &self.bot_id)
            .header("x-workspace-id", &self.workspace_id)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            crate::warn_log!("remote call failed: HTTP {} {}", status.as_u16(), body);
            return Err(ApiError::from_status(status.as_u16(), retry_after, &body));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            // DELETE answers with an empty body
            return Ok(serde_json::from_value(json!({}))?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RemoteClient for BotpressClient {
    async fn list_conversations(&self, next_token: Option<&str>) -> Result<Page<Conversation>, ApiError> {
        crate::debug_log!("list_conversations: next_token={:?}", next_token);
        let mut req = self.request(Method::GET, "/v1/chat/conversations");
        if let Some(token) = next_token {
            req = req.query(&[("nextToken", token)]);
        }

        let resp: ListConversationsResponse = self.send(req).await?;
        crate::debug_log!("list_conversations: got {} conversations", resp.conversations.len());
        Ok(Page::new(
            resp.conversations.into_iter().map(Conversation::from).collect(),
            resp.meta.next_token,
        ))
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        next_token: Option<&str>,
    ) -> Result<Page<Message>, ApiError> {
        crate::debug_log!("list_messages: conversation={} next_token={:?}", conversation_id, next_token);
        let mut req = self
            .request(Method::GET, "/v1/chat/messages")
            .query(&[("conversationId", conversation_id)]);
        if let Some(token) = next_token {
            req = req.query(&[("nextToken", token)]);
        }

        let resp: ListMessagesResponse = self.send(req).await?;
        Ok(Page::new(
            resp.messages.into_iter().map(Message::from).collect(),
            resp.meta.next_token,
        ))
    }

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ApiError> {
        let resp: UserEnvelope = self
            .send(self.request(Method::GET, &format!("/v1/chat/users/{}", user_id)))
            .await?;
        Ok(RemoteUser {
            id: resp.user.id,
            tags: resp.user.tags,
        })
    }

    async fn get_bot(&self, bot_id: &str) -> Result<RemoteBot, ApiError> {
        let resp: BotEnvelope = self
            .send(self.request(Method::GET, &format!("/v1/admin/bots/{}", bot_id)))
            .await?;
        Ok(RemoteBot { name: resp.bot.name })
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, ApiError> {
        let body = CreateMessageBody {
            conversation_id: &message.conversation_id,
            user_id: &message.user_id,
            kind: message.payload.kind(),
            payload: encode_payload(&message.payload),
            tags: HashMap::new(),
        };

        let resp: MessageEnvelope = self
            .send(self.request(Method::POST, "/v1/chat/messages").json(&body))
            .await?;
        Ok(resp.message.into())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .send(self.request(
                Method::DELETE,
                &format!("/v1/chat/conversations/{}", conversation_id),
            ))
            .await?;
        crate::info_log!("delete_conversation: deleted {}", conversation_id);
        Ok(())
    }
}
