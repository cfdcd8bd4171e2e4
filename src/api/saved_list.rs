use std::fmt;

use async_graphql::{
    connection::{query, Connection, EmptyFields},
    Context, Enum, InputObject, Object, Result, SimpleObject, ID,
};

use crate::api::{self, validation_error, Clock, DateTimeUtc, ShopContext};
use crate::database::saved_list::{ListSource, ListStatus, SavedListRecord};
use crate::database::{self, parse_key, Database, TryFromKeyValue};
use crate::outbound::segment::FilterSelection;

use super::segment::FilterSelectionInput;

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum SavedListSource {
    AiSearch,
    FilterAudience,
    Manual,
}

impl From<ListSource> for SavedListSource {
    fn from(source: ListSource) -> Self {
        match source {
            ListSource::AiSearch => SavedListSource::AiSearch,
            ListSource::FilterAudience => SavedListSource::FilterAudience,
            ListSource::Manual => SavedListSource::Manual,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum SavedListStatus {
    Active,
    Archived,
}

impl From<ListStatus> for SavedListStatus {
    fn from(status: ListStatus) -> Self {
        match status {
            ListStatus::Active => SavedListStatus::Active,
            ListStatus::Archived => SavedListStatus::Archived,
        }
    }
}

/// A saved audience. The member set is recomputed from `criteria` whenever
/// the list is viewed, so membership drifts as store data changes.
#[derive(SimpleObject)]
pub(crate) struct SavedList {
    pub(crate) id: ID,
    pub(crate) shop: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) customer_count: i64,
    pub(crate) source: SavedListSource,
    pub(crate) criteria: String,
    pub(crate) tags: Vec<String>,
    pub(crate) status: SavedListStatus,
    pub(crate) created_at: DateTimeUtc,
    pub(crate) last_updated: DateTimeUtc,
    /// Storage key, kept for cursor encoding.
    #[graphql(skip)]
    key: String,
}

impl SavedList {
    fn from_record(shop: &str, record: SavedListRecord) -> Self {
        SavedList {
            id: ID(record.id.to_string()),
            key: database::saved_list_key(shop, record.id),
            shop: shop.to_string(),
            name: record.name,
            description: record.description,
            customer_count: record.customer_count,
            source: record.source.into(),
            criteria: record.criteria,
            tags: record.tags,
            status: record.status.into(),
            created_at: DateTimeUtc(record.created_at),
            last_updated: DateTimeUtc(record.last_updated),
        }
    }
}

impl TryFromKeyValue for SavedList {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> anyhow::Result<Self> {
        let (shop, _) = parse_key(key)?;
        let record: SavedListRecord = bincode::deserialize(value)?;
        Ok(SavedList::from_record(&shop, record))
    }
}

impl fmt::Display for SavedList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[derive(InputObject, Debug)]
pub(crate) struct SaveSegmentListInput {
    name: String,
    #[graphql(default)]
    description: String,
    #[graphql(default)]
    tags: Vec<String>,
    /// Match count of the realized segment the save action came from.
    customer_count: i64,
    filters: FilterSelectionInput,
}

#[derive(InputObject, Debug)]
pub(crate) struct SaveSearchListInput {
    name: String,
    #[graphql(default)]
    description: String,
    #[graphql(default)]
    tags: Vec<String>,
    customer_count: i64,
    /// Structured query string the AI search derived.
    query: String,
}

#[derive(InputObject, Debug, Default)]
pub(crate) struct SavedListStatFilter {
    source: Option<SavedListSource>,
    /// Keep only lists carrying this tag.
    tag: Option<String>,
}

impl SavedListStatFilter {
    fn keep(&self, list: &SavedList) -> bool {
        self.source.is_none_or(|source| list.source == source)
            && self
                .tag
                .as_ref()
                .is_none_or(|tag| list.tags.iter().any(|t| t == tag))
    }
}

#[derive(SimpleObject)]
struct SavedListStat {
    active_count: i64,
    archived_count: i64,
    /// Sum of the customer counts recorded at save time.
    total_customer_count: i64,
}

#[derive(Default)]
pub(super) struct SavedListQuery;

#[Object]
impl SavedListQuery {
    async fn saved_lists(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, SavedList, EmptyFields, EmptyFields>> {
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                api::load_connection(ctx, Database::saved_lists::<SavedList>, after, before, first, last)
            },
        )
        .await
    }

    #[allow(clippy::unused_async)]
    async fn saved_list(&self, ctx: &Context<'_>, id: ID) -> Result<Option<SavedList>> {
        let db = ctx.data::<Database>()?;
        let shop = ctx.data::<ShopContext>()?;
        let id = parse_id(&id)?;
        Ok(db
            .saved_list(&shop.shop, id)?
            .map(|record| SavedList::from_record(&shop.shop, record)))
    }

    #[allow(clippy::unused_async)]
    async fn saved_list_stat(
        &self,
        ctx: &Context<'_>,
        filter: SavedListStatFilter,
    ) -> Result<SavedListStat> {
        let db = ctx.data::<Database>()?;
        let lists: Vec<SavedList> = db
            .saved_lists(None, None)
            .filter_map(std::result::Result::ok)
            .filter(|list| filter.keep(list))
            .collect();

        let active_count = lists
            .iter()
            .filter(|list| list.status == SavedListStatus::Active)
            .count()
            .try_into()?;
        let archived_count = lists
            .iter()
            .filter(|list| list.status == SavedListStatus::Archived)
            .count()
            .try_into()?;
        let total_customer_count = lists.iter().map(|list| list.customer_count).sum();

        Ok(SavedListStat {
            active_count,
            archived_count,
            total_customer_count,
        })
    }
}

#[derive(Default)]
pub(super) struct SavedListMutation;

#[Object]
impl SavedListMutation {
    /// Persist a realized segment from the filter-audience flow.
    #[allow(clippy::unused_async)]
    async fn save_segment_list(
        &self,
        ctx: &Context<'_>,
        input: SaveSegmentListInput,
    ) -> Result<SavedList> {
        let selection: FilterSelection = input.filters.into();
        create_list(
            ctx,
            input.name,
            input.description,
            input.tags,
            input.customer_count,
            ListSource::FilterAudience,
            selection.describe(),
        )
    }

    /// Persist an AI-search result; the derived query becomes the criteria.
    #[allow(clippy::unused_async)]
    async fn save_search_list(
        &self,
        ctx: &Context<'_>,
        input: SaveSearchListInput,
    ) -> Result<SavedList> {
        if input.query.trim().is_empty() {
            return Err(validation_error("a search list needs a non-empty query"));
        }
        create_list(
            ctx,
            input.name,
            input.description,
            input.tags,
            input.customer_count,
            ListSource::AiSearch,
            input.query,
        )
    }

    #[allow(clippy::unused_async)]
    async fn archive_list(&self, ctx: &Context<'_>, id: ID) -> Result<SavedList> {
        transition(ctx, &id, ListStatus::Archived)
    }

    #[allow(clippy::unused_async)]
    async fn unarchive_list(&self, ctx: &Context<'_>, id: ID) -> Result<SavedList> {
        transition(ctx, &id, ListStatus::Active)
    }

    /// Remove a list permanently. Unlike archiving this is not reversible.
    #[allow(clippy::unused_async)]
    async fn delete_list(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let db = ctx.data::<Database>()?;
        let shop = ctx.data::<ShopContext>()?;
        let id = parse_id(&id)?;
        Ok(db.delete_saved_list(&shop.shop, id)?)
    }
}

fn parse_id(id: &ID) -> Result<u64> {
    id.parse::<u64>()
        .map_err(|_| validation_error(format!("malformed saved-list id {:?}", id.as_str())))
}

fn create_list(
    ctx: &Context<'_>,
    name: String,
    description: String,
    tags: Vec<String>,
    customer_count: i64,
    source: ListSource,
    criteria: String,
) -> Result<SavedList> {
    if name.trim().is_empty() {
        return Err(validation_error("a saved list needs a non-empty name"));
    }
    if customer_count < 0 {
        return Err(validation_error("customer count cannot be negative"));
    }

    let db = ctx.data::<Database>()?;
    let shop = ctx.data::<ShopContext>()?;
    let clock = ctx.data::<Clock>()?;
    let now = clock.now().timestamp();

    let record = SavedListRecord {
        id: db.generate_id()?,
        name,
        description,
        customer_count,
        source,
        criteria,
        tags,
        status: ListStatus::Active,
        created_at: now,
        last_updated: now,
    };
    db.insert_saved_list(&shop.shop, &record)?;
    Ok(SavedList::from_record(&shop.shop, record))
}

fn transition(ctx: &Context<'_>, id: &ID, status: ListStatus) -> Result<SavedList> {
    let db = ctx.data::<Database>()?;
    let shop = ctx.data::<ShopContext>()?;
    let clock = ctx.data::<Clock>()?;
    let id = parse_id(id)?;

    let Some(mut record) = db.saved_list(&shop.shop, id)? else {
        return Err(format!("no saved list with id {id}").into());
    };
    record.status = status;
    record.last_updated = clock.now().timestamp();
    db.insert_saved_list(&shop.shop, &record)?;
    Ok(SavedList::from_record(&shop.shop, record))
}
