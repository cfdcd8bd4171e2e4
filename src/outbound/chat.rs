//! AI chat collaborator: a workflow-automation webhook that answers
//! natural-language questions about store data. The webhook has shipped three
//! response shapes over time; decoding is one ordered pass over the known
//! schemas, newest first, with plain text as the terminal fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{FetchError, APP_USER_AGENT};
use crate::settings;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest {
    pub(crate) message: String,
    pub(crate) session_id: String,
    pub(crate) shop_id: String,
}

/// Which wire shape the webhook answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplySchema {
    Versioned(u32),
    LegacyJson,
    PlainText,
}

#[derive(Debug, PartialEq)]
pub(crate) struct WebhookReply {
    pub(crate) reply: String,
    /// Structured filter/query string derived by the webhook, executable
    /// against the dashboard's own API.
    pub(crate) query: Option<String>,
    pub(crate) needs_clarification: bool,
    pub(crate) schema: ReplySchema,
}

#[derive(Deserialize)]
struct VersionedEnvelope {
    version: u32,
    reply: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    needs_clarification: bool,
}

#[derive(Deserialize)]
struct LegacyEnvelope {
    reply: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    needs_clarification: bool,
}

pub(crate) fn decode_reply(body: &str) -> WebhookReply {
    if let Ok(envelope) = serde_json::from_str::<VersionedEnvelope>(body) {
        return WebhookReply {
            reply: envelope.reply,
            query: envelope.query,
            needs_clarification: envelope.needs_clarification,
            schema: ReplySchema::Versioned(envelope.version),
        };
    }
    if let Ok(envelope) = serde_json::from_str::<LegacyEnvelope>(body) {
        return WebhookReply {
            reply: envelope.reply,
            query: envelope.query,
            needs_clarification: envelope.needs_clarification,
            schema: ReplySchema::LegacyJson,
        };
    }
    WebhookReply {
        reply: body.trim().to_string(),
        query: None,
        needs_clarification: false,
        schema: ReplySchema::PlainText,
    }
}

#[async_trait]
pub(crate) trait ChatApi: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<WebhookReply, FetchError>;
}

pub(crate) struct ChatClient {
    client: Client,
    webhook_url: String,
}

impl ChatClient {
    pub(crate) fn new(settings: &settings::Chat) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(ChatClient {
            client,
            webhook_url: settings.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn send(&self, request: &ChatRequest) -> Result<WebhookReply, FetchError> {
        let raw = self
            .client
            .post(&self.webhook_url)
            .json(request)
            .send()
            .await?
            .text()
            .await?;
        Ok(decode_reply(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_reply, ReplySchema};

    #[test]
    fn versioned_envelope_decodes_with_its_version() {
        let body = r#"{
            "version": 2,
            "reply": "Found 14 customers from France.",
            "query": "location:France",
            "needs_clarification": false
        }"#;
        let reply = decode_reply(body);
        assert_eq!(reply.schema, ReplySchema::Versioned(2));
        assert_eq!(reply.reply, "Found 14 customers from France.");
        assert_eq!(reply.query.as_deref(), Some("location:France"));
        assert!(!reply.needs_clarification);
    }

    #[test]
    fn legacy_json_envelope_decodes_without_version() {
        let body = r#"{"reply": "Which time window do you mean?", "needs_clarification": true}"#;
        let reply = decode_reply(body);
        assert_eq!(reply.schema, ReplySchema::LegacyJson);
        assert!(reply.needs_clarification);
        assert_eq!(reply.query, None);
    }

    #[test]
    fn plain_text_body_is_passed_through() {
        let reply = decode_reply("  Your top customers are Ada and Grace.\n");
        assert_eq!(reply.schema, ReplySchema::PlainText);
        assert_eq!(reply.reply, "Your top customers are Ada and Grace.");
    }

    #[test]
    fn json_without_a_reply_field_falls_back_to_plain_text() {
        let body = r#"{"version": 3}"#;
        let reply = decode_reply(body);
        assert_eq!(reply.schema, ReplySchema::PlainText);
        assert_eq!(reply.reply, body);
    }
}
