pub(crate) mod chat;
pub(crate) mod saved_list;

use std::marker::PhantomData;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sled::{Db, Tree};

#[derive(Clone)]
pub(crate) struct Database {
    db: Db,
    saved_list_partition: Tree,
    chat_partition: Tree,
}

impl Database {
    pub(crate) fn connect(path: &Path) -> Result<Database> {
        let db = sled::open(path)
            .with_context(|| format!("cannot open database at {}", path.display()))?;
        let saved_list_partition = db.open_tree("saved_lists")?;
        let chat_partition = db.open_tree("chat_sessions")?;
        Ok(Database {
            db,
            saved_list_partition,
            chat_partition,
        })
    }

    /// Monotonic identifier for newly created records.
    pub(crate) fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    fn insert<T: Serialize>(key: &str, value: &T, tree: &Tree) -> Result<()> {
        tree.insert(key, bincode::serialize(value)?)?;
        Ok(())
    }

    fn remove(key: &str, tree: &Tree) -> Result<bool> {
        Ok(tree.remove(key)?.is_some())
    }
}

/// Conversion from a raw key/value pair into an API-facing object.
pub(crate) trait TryFromKeyValue: Sized {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self>;
}

pub(crate) struct Iter<T> {
    inner: sled::Iter,
    phantom: PhantomData<T>,
}

impl<T> Iter<T> {
    fn new(inner: sled::Iter) -> Self {
        Iter {
            inner,
            phantom: PhantomData,
        }
    }
}

impl<T: TryFromKeyValue> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| {
            let (key, value) = item.context("failed to read database entry")?;
            T::try_from_key_value(&key, &value)
        })
    }
}

impl<T: TryFromKeyValue> DoubleEndedIterator for Iter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|item| {
            let (key, value) = item.context("failed to read database entry")?;
            T::try_from_key_value(&key, &value)
        })
    }
}

/// Split a `shop#id` key into its parts.
pub(crate) fn parse_key(key: &[u8]) -> Result<(String, u64)> {
    let text = std::str::from_utf8(key).context("database key is not valid UTF-8")?;
    let (shop, id) = text
        .rsplit_once('#')
        .ok_or_else(|| anyhow!("database key {text:?} lacks a '#' separator"))?;
    Ok((shop.to_string(), id.parse()?))
}

/// Keys zero-pad the numeric id so lexicographic and numeric order agree.
pub(crate) fn saved_list_key(shop: &str, id: u64) -> String {
    format!("{shop}#{id:020}")
}
