use anyhow::Result;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{saved_list_key, Database, Iter, TryFromKeyValue};

/// Where a saved list originated. `Manual` is representable but the current
/// app has no creation path for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) enum ListSource {
    AiSearch,
    FilterAudience,
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) enum ListStatus {
    Active,
    Archived,
}

/// Persisted saved-list entity. Membership is not frozen here; it is derived
/// at view time by re-running the stored criteria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct SavedListRecord {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) customer_count: i64,
    pub(crate) source: ListSource,
    pub(crate) criteria: String,
    pub(crate) tags: Vec<String>,
    pub(crate) status: ListStatus,
    pub(crate) created_at: Timestamp,
    pub(crate) last_updated: Timestamp,
}

impl Database {
    pub(crate) fn insert_saved_list(&self, shop: &str, record: &SavedListRecord) -> Result<()> {
        let key = saved_list_key(shop, record.id);
        Database::insert(&key, record, &self.saved_list_partition)
    }

    pub(crate) fn saved_list(&self, shop: &str, id: u64) -> Result<Option<SavedListRecord>> {
        let key = saved_list_key(shop, id);
        let Some(value) = self.saved_list_partition.get(key)? else {
            return Ok(None);
        };
        Ok(Some(bincode::deserialize(&value)?))
    }

    pub(crate) fn delete_saved_list(&self, shop: &str, id: u64) -> Result<bool> {
        let key = saved_list_key(shop, id);
        Database::remove(&key, &self.saved_list_partition)
    }

    pub(crate) fn saved_lists<T: TryFromKeyValue>(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Iter<T> {
        let start = start.unwrap_or(b"\x00");
        if let Some(end) = end {
            Iter::new(self.saved_list_partition.range(start..end))
        } else {
            Iter::new(self.saved_list_partition.range(start..))
        }
    }
}
