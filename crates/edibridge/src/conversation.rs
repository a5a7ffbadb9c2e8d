//! In-memory conversation sessions for the assistant
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new<S: Into<String>>(id: S, system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: vec![Message::system().with_text(system_prompt)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Every message except the system prompt
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(ChatMessage::from)
            .collect()
    }
}

/// Wire view of a conversation message, in the chat completion message shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let mut chat = ChatMessage {
            role: message.role,
            content: message.text(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        };

        let mut calls = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::ToolRequest(request) => {
                    if let Ok(call) = &request.tool_call {
                        calls.push(json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        }));
                    }
                }
                MessageContent::ToolResponse(response) => {
                    chat.content = response.output.to_string();
                    chat.tool_call_id = Some(response.id.clone());
                    chat.name = Some(response.name.clone());
                }
                MessageContent::Text { .. } => {}
            }
        }
        if !calls.is_empty() {
            chat.tool_calls = Some(calls);
        }
        chat
    }
}

pub type ConversationHandle = Arc<Mutex<Conversation>>;

/// Storage for conversations. A turn locks its conversation handle for its whole
/// duration, so turns on the same id run one after another.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The conversation with this id, created with the given system prompt if absent
    async fn get_or_create(&self, id: &str, system_prompt: &str) -> ConversationHandle;

    async fn get(&self, id: &str) -> Option<ConversationHandle>;

    /// Non-system messages of the conversation; empty for unknown ids
    async fn history(&self, id: &str) -> Vec<ChatMessage> {
        match self.get(id).await {
            Some(handle) => handle.lock().await.history(),
            None => Vec::new(),
        }
    }

    async fn remove(&self, id: &str) -> bool;
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, ConversationHandle>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create(&self, id: &str, system_prompt: &str) -> ConversationHandle {
        if let Some(handle) = self.conversations.read().await.get(id) {
            return handle.clone();
        }

        let mut conversations = self.conversations.write().await;
        conversations
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(id, system_prompt))))
            .clone()
    }

    async fn get(&self, id: &str) -> Option<ConversationHandle> {
        self.conversations.read().await.get(id).cloned()
    }

    async fn remove(&self, id: &str) -> bool {
        self.conversations.write().await.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;

    #[tokio::test]
    async fn test_get_or_create_seeds_system_prompt() {
        let store = InMemoryConversationStore::new();
        let handle = store.get_or_create("conv-1", "You are an EDI expert.").await;

        let conversation = handle.lock().await;
        assert_eq!(conversation.id, "conv-1");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::System);
        assert_eq!(conversation.messages[0].text(), "You are an EDI expert.");
    }

    #[tokio::test]
    async fn test_same_id_returns_same_conversation() {
        let store = InMemoryConversationStore::new();
        let first = store.get_or_create("conv-1", "prompt").await;
        first.lock().await.push(Message::user().with_text("hi"));

        let second = store.get_or_create("conv-1", "other prompt").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.messages.len(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_history_excludes_system() {
        let store = InMemoryConversationStore::new();
        assert!(store.history("unknown").await.is_empty());

        let handle = store.get_or_create("conv-1", "prompt").await;
        {
            let mut conversation = handle.lock().await;
            conversation.push(Message::user().with_text("Find invoice 406412"));
            conversation.push(Message::assistant().with_tool_request(
                "call_1",
                Ok(ToolCall::new(
                    "getInvoiceByNumber",
                    json!({"invoiceNumber": "406412"}),
                )),
            ));
            conversation.push(Message::tool().with_tool_response(
                "call_1",
                "getInvoiceByNumber",
                json!({"success": true}),
            ));
            conversation.push(Message::assistant().with_text("It was sent."));
        }

        let history = store.history("conv-1").await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );

        let calls = history[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0]["function"]["name"], "getInvoiceByNumber");
        assert_eq!(history[1].content, "");

        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[2].name.as_deref(), Some("getInvoiceByNumber"));
        assert_eq!(history[2].content, r#"{"success":true}"#);
        assert_eq!(history[3].content, "It was sent.");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryConversationStore::new();
        store.get_or_create("conv-1", "prompt").await;

        assert!(store.remove("conv-1").await);
        assert!(!store.remove("conv-1").await);
        assert!(store.history("conv-1").await.is_empty());
    }

    #[test]
    fn test_touch_moves_updated_at() {
        let mut conversation = Conversation::new("conv-1", "prompt");
        let before = conversation.updated_at;
        conversation.touch();
        assert!(conversation.updated_at >= before);
        assert_eq!(conversation.created_at, before);
    }
}
