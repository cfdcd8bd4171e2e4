use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Database;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredChatMessage {
    pub(crate) id: u64,
    pub(crate) role: ChatRole,
    pub(crate) content: String,
    /// Structured query the webhook derived from the conversation, if any.
    pub(crate) query: Option<String>,
    pub(crate) timestamp: Timestamp,
}

/// One conversation. Created lazily when the first user message arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct ChatSessionRecord {
    pub(crate) session_id: String,
    pub(crate) created_at: Timestamp,
    pub(crate) messages: Vec<StoredChatMessage>,
}

fn chat_key(shop: &str, session_id: &str) -> String {
    format!("{shop}#{session_id}")
}

impl Database {
    pub(crate) fn chat_session(
        &self,
        shop: &str,
        session_id: &str,
    ) -> Result<Option<ChatSessionRecord>> {
        let key = chat_key(shop, session_id);
        let Some(value) = self.chat_partition.get(key)? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(&value)?))
    }

    pub(crate) fn upsert_chat_session(
        &self,
        shop: &str,
        record: &ChatSessionRecord,
    ) -> Result<()> {
        let key = chat_key(shop, &record.session_id);
        Database::insert(&key, record, &self.chat_partition)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::{ChatRole, ChatSessionRecord, StoredChatMessage};
    use crate::database::Database;

    #[test]
    fn sessions_are_absent_until_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();

        assert!(db.chat_session("shop", "s-1").unwrap().is_none());

        let record = ChatSessionRecord {
            session_id: String::from("s-1"),
            created_at: Timestamp::UNIX_EPOCH,
            messages: vec![StoredChatMessage {
                id: 1,
                role: ChatRole::User,
                content: String::from("how many discount users this month?"),
                query: None,
                timestamp: Timestamp::UNIX_EPOCH,
            }],
        };
        db.upsert_chat_session("shop", &record).unwrap();

        let loaded = db.chat_session("shop", "s-1").unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn sessions_are_scoped_by_shop() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();

        let record = ChatSessionRecord {
            session_id: String::from("shared-id"),
            created_at: Timestamp::UNIX_EPOCH,
            messages: Vec::new(),
        };
        db.upsert_chat_session("shop-a", &record).unwrap();

        assert!(db.chat_session("shop-b", "shared-id").unwrap().is_none());
    }
}
