use std::sync::Arc;

use async_graphql::{Context, Enum, Object, Result, SimpleObject, ID};
use tracing::debug;

use crate::api::{remote_error, validation_error, Clock, DateTimeUtc, ShopContext};
use crate::database::chat::{ChatRole as StoredRole, ChatSessionRecord, StoredChatMessage};
use crate::database::Database;
use crate::daterange::DateRangeToken;
use crate::outbound::chat::{ChatApi, ChatRequest};

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ChatRole {
    User,
    Assistant,
}

impl From<StoredRole> for ChatRole {
    fn from(role: StoredRole) -> Self {
        match role {
            StoredRole::User => ChatRole::User,
            StoredRole::Assistant => ChatRole::Assistant,
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct ChatMessage {
    pub(crate) id: ID,
    pub(crate) role: ChatRole,
    pub(crate) content: String,
    /// Structured query the webhook derived from this message, if any.
    pub(crate) query: Option<String>,
    pub(crate) timestamp: DateTimeUtc,
}

impl From<&StoredChatMessage> for ChatMessage {
    fn from(message: &StoredChatMessage) -> Self {
        ChatMessage {
            id: ID(message.id.to_string()),
            role: message.role.into(),
            content: message.content.clone(),
            query: message.query.clone(),
            timestamp: DateTimeUtc(message.timestamp),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct ChatExchange {
    pub(crate) session_id: String,
    pub(crate) reply: ChatMessage,
    pub(crate) needs_clarification: bool,
    /// Range token recognized inside the derived query, ready for charting.
    pub(crate) range: Option<DateRangeToken>,
}

/// Pick the `range:` clause out of a derived query string.
fn extract_range_token(query: &str) -> Option<DateRangeToken> {
    query
        .split_whitespace()
        .find_map(|part| part.strip_prefix("range:"))
        .map(DateRangeToken::parse)
}

#[derive(Default)]
pub(super) struct ChatQuery;

#[Object]
impl ChatQuery {
    /// Messages of one conversation, oldest first. Unknown sessions are
    /// simply empty; they are only materialized by a first user message.
    #[allow(clippy::unused_async)]
    async fn chat_history(&self, ctx: &Context<'_>, session_id: String) -> Result<Vec<ChatMessage>> {
        let db = ctx.data::<Database>()?;
        let shop = ctx.data::<ShopContext>()?;
        let Some(record) = db.chat_session(&shop.shop, &session_id)? else {
            return Ok(Vec::new());
        };
        Ok(record.messages.iter().map(ChatMessage::from).collect())
    }
}

#[derive(Default)]
pub(super) struct ChatMutation;

#[Object]
impl ChatMutation {
    /// Relay a user message to the AI webhook and record both sides of the
    /// exchange. The user message is persisted before the webhook call so a
    /// failing webhook never loses what the user typed.
    async fn send_chat_message(
        &self,
        ctx: &Context<'_>,
        session_id: String,
        message: String,
    ) -> Result<ChatExchange> {
        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(validation_error("a chat message cannot be empty"));
        }
        if session_id.trim().is_empty() {
            return Err(validation_error("a chat message needs a session id"));
        }

        let db = ctx.data::<Database>()?;
        let shop = ctx.data::<ShopContext>()?;
        let chat = ctx.data::<Arc<dyn ChatApi>>()?;
        let clock = ctx.data::<Clock>()?;
        let now = clock.now().timestamp();

        let mut record = db
            .chat_session(&shop.shop, &session_id)?
            .unwrap_or_else(|| ChatSessionRecord {
                session_id: session_id.clone(),
                created_at: now,
                messages: Vec::new(),
            });
        record.messages.push(StoredChatMessage {
            id: db.generate_id()?,
            role: StoredRole::User,
            content: message.clone(),
            query: None,
            timestamp: now,
        });
        db.upsert_chat_session(&shop.shop, &record)?;

        let request = ChatRequest {
            message,
            session_id: session_id.clone(),
            shop_id: shop.shop.clone(),
        };
        let reply = chat.send(&request).await.map_err(remote_error)?;
        debug!(schema = ?reply.schema, "webhook reply decoded");

        let assistant = StoredChatMessage {
            id: db.generate_id()?,
            role: StoredRole::Assistant,
            content: reply.reply,
            query: reply.query,
            timestamp: now,
        };
        record.messages.push(assistant.clone());
        db.upsert_chat_session(&shop.shop, &record)?;

        let range = assistant.query.as_deref().and_then(extract_range_token);
        Ok(ChatExchange {
            session_id,
            reply: ChatMessage::from(&assistant),
            needs_clarification: reply.needs_clarification,
            range,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::extract_range_token;
    use crate::api::testing::{StaticChat, TestSchema};
    use crate::daterange::DateRangeToken;

    #[test]
    fn range_tokens_are_picked_out_of_derived_queries() {
        assert_eq!(
            extract_range_token("location:France range:last7Days"),
            Some(DateRangeToken::Last7Days)
        );
        assert_eq!(
            extract_range_token("range:bogus total_spent:>100"),
            Some(DateRangeToken::Last30Days)
        );
        assert_eq!(extract_range_token("location:France"), None);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_the_webhook_is_called() {
        let schema = TestSchema::new();
        let response = schema
            .execute(r#"mutation { sendChatMessage(sessionId: "s-1", message: "   ") { sessionId } }"#)
            .await;
        assert_eq!(response.errors.len(), 1);
        let rendered = format!("{:?}", response.errors[0].extensions);
        assert!(rendered.contains("VALIDATION_ERROR"), "{rendered}");
        assert_eq!(schema.chat.calls.load(Ordering::SeqCst), 0);

        let history = schema
            .execute(r#"{ chatHistory(sessionId: "s-1") { content } }"#)
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(history["chatHistory"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn first_message_creates_the_session_lazily() {
        let schema = TestSchema::new();

        let before = schema
            .execute(r#"{ chatHistory(sessionId: "s-1") { content } }"#)
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(before["chatHistory"].as_array().unwrap().len(), 0);

        let exchange = schema
            .execute(
                r#"mutation { sendChatMessage(sessionId: "s-1", message: "who buys in the morning?") { reply { role content query } } }"#,
            )
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(exchange["sendChatMessage"]["reply"]["role"], "ASSISTANT");
        assert_eq!(
            exchange["sendChatMessage"]["reply"]["content"],
            "I could not find anything."
        );
        assert!(exchange["sendChatMessage"]["reply"]["query"].is_null());

        let history = schema
            .execute(r#"{ chatHistory(sessionId: "s-1") { role content } }"#)
            .await
            .data
            .into_json()
            .unwrap();
        let messages = history["chatHistory"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "USER");
        assert_eq!(messages[0]["content"], "who buys in the morning?");
        assert_eq!(messages[1]["role"], "ASSISTANT");

        let stored = schema
            .db
            .chat_session(crate::api::testing::TEST_SHOP, "s-1")
            .unwrap()
            .unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn structured_reply_carries_query_and_range() {
        let body = r#"{
            "version": 1,
            "reply": "14 customers in France over the last week.",
            "query": "location:France range:last7Days"
        }"#;
        let schema = TestSchema::with_chat(StaticChat::with_body(body));

        let exchange = schema
            .execute(
                r#"mutation { sendChatMessage(sessionId: "s-2", message: "french customers?") { reply { query } needsClarification range } }"#,
            )
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(
            exchange["sendChatMessage"]["reply"]["query"],
            "location:France range:last7Days"
        );
        assert_eq!(exchange["sendChatMessage"]["needsClarification"], false);
        assert_eq!(exchange["sendChatMessage"]["range"], "LAST_7_DAYS");
    }

    #[tokio::test]
    async fn clarification_requests_are_surfaced() {
        let body = r#"{"reply": "Which time window do you mean?", "needs_clarification": true}"#;
        let schema = TestSchema::with_chat(StaticChat::with_body(body));

        let exchange = schema
            .execute(
                r#"mutation { sendChatMessage(sessionId: "s-3", message: "top customers") { needsClarification range } }"#,
            )
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(exchange["sendChatMessage"]["needsClarification"], true);
        assert!(exchange["sendChatMessage"]["range"].is_null());
    }

    #[tokio::test]
    async fn follow_up_messages_accumulate_in_the_same_session() {
        let schema = TestSchema::new();
        for message in ["first question", "second question"] {
            schema
                .execute(&format!(
                    r#"mutation {{ sendChatMessage(sessionId: "s-4", message: "{message}") {{ sessionId }} }}"#
                ))
                .await;
        }

        let history = schema
            .execute(r#"{ chatHistory(sessionId: "s-4") { content } }"#)
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(history["chatHistory"].as_array().unwrap().len(), 4);
        assert_eq!(schema.chat.calls.load(Ordering::SeqCst), 2);

        let other = schema
            .execute(r#"{ chatHistory(sessionId: "other") { content } }"#)
            .await
            .data
            .into_json()
            .unwrap();
        assert_eq!(other["chatHistory"].as_array().unwrap().len(), 0);
    }
}
