pub(crate) mod chat;
pub(crate) mod metric;
pub(crate) mod saved_list;
pub(crate) mod segment;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::{
    types::connection::{Connection, Edge, EmptyFields},
    Context, EmptySubscription, Error, ErrorExtensions, InputValueError, InputValueResult,
    MergedObject, OutputType, Result, Scalar, ScalarType, Value,
};
use base64::{engine::general_purpose, Engine as _};
use jiff::{Timestamp, Zoned};

use crate::database::Database;
use crate::debounce::Debouncer;
use crate::outbound::chat::ChatApi;
use crate::outbound::{AdminApi, FetchError, ProtectedScope};

/// The default page size for connections when neither `first` nor `last` is provided.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Live segment previews wait this long for the user to stop editing before
/// a re-query is allowed to fire.
pub(crate) const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(500);

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(
    metric::MetricQuery,
    segment::SegmentQuery,
    saved_list::SavedListQuery,
    chat::ChatQuery,
);

#[derive(Default, MergedObject)]
pub(crate) struct Mutation(saved_list::SavedListMutation, chat::ChatMutation);

pub(crate) type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

/// The shop this server instance is bound to.
pub(crate) struct ShopContext {
    pub(crate) shop: String,
}

/// Injectable clock so date-range resolution is deterministic under test.
pub(crate) struct Clock {
    fixed: Option<Zoned>,
}

impl Clock {
    pub(crate) fn system() -> Self {
        Clock { fixed: None }
    }

    #[cfg(test)]
    pub(crate) fn fixed(now: Zoned) -> Self {
        Clock { fixed: Some(now) }
    }

    pub(crate) fn now(&self) -> Zoned {
        self.fixed.clone().unwrap_or_else(Zoned::now)
    }
}

/// Surface a typed remote failure so the UI can branch on the error code
/// (permission-request prompt vs. generic failure) instead of matching on
/// message text.
fn remote_error(err: FetchError) -> Error {
    let code = match &err {
        FetchError::ProtectedData(ProtectedScope::Orders) => "PROTECTED_ORDER_DATA_ACCESS_DENIED",
        FetchError::ProtectedData(ProtectedScope::Customers) => {
            "PROTECTED_CUSTOMER_DATA_ACCESS_DENIED"
        }
        FetchError::Query(_) | FetchError::Http(_) => "REMOTE_QUERY_ERROR",
    };
    Error::new(err.to_string()).extend_with(|_, e| e.set("code", code))
}

/// Reject a malformed action before any remote call is made.
fn validation_error(message: impl Into<String>) -> Error {
    Error::new(message).extend_with(|_, e| e.set("code", "VALIDATION_ERROR"))
}

#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub(crate) struct DateTimeUtc(pub(crate) Timestamp);

#[Scalar]
impl ScalarType for DateTimeUtc {
    fn parse(value: Value) -> InputValueResult<Self> {
        match &value {
            Value::String(s) => Ok(DateTimeUtc(s.parse()?)),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

fn connect_cursor<T>(
    select_vec: Vec<T>,
    prev: bool,
    next: bool,
) -> Connection<String, T, EmptyFields, EmptyFields>
where
    T: OutputType + Display,
{
    let mut connection: Connection<String, T, EmptyFields, EmptyFields> =
        Connection::new(prev, next);
    for output in select_vec {
        connection.edges.push(Edge::new(
            general_purpose::STANDARD.encode(format!("{output}")),
            output,
        ));
    }
    connection
}

fn load_connection<N, I>(
    ctx: &Context<'_>,
    iter_builder: impl Fn(&Database, Option<&[u8]>, Option<&[u8]>) -> I,
    after: Option<String>,
    before: Option<String>,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<Connection<String, N, EmptyFields, EmptyFields>>
where
    N: Display + OutputType,
    I: DoubleEndedIterator<Item = anyhow::Result<N>>,
{
    let db = ctx.data::<Database>()?;
    let (nodes, has_previous, has_next) = if let Some(before) = before {
        if after.is_some() {
            return Err("cannot use both `after` and `before`".into());
        }
        if first.is_some() {
            return Err("'before' and 'first' cannot be specified simultaneously".into());
        }
        let last = last.unwrap_or(DEFAULT_PAGE_SIZE);
        let cursor = general_purpose::STANDARD.decode(before)?;
        let iter = iter_builder(db, None, Some(cursor.as_slice())).rev();
        let (mut nodes, has_previous) = collect_nodes(iter, last)?;
        nodes.reverse();
        (nodes, has_previous, false)
    } else if let Some(after) = after {
        if last.is_some() {
            return Err("'after' and 'last' cannot be specified simultaneously".into());
        }
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut cursor = general_purpose::STANDARD.decode(after)?;
        cursor.push(0);
        let iter = iter_builder(db, Some(cursor.as_slice()), None);
        let (nodes, has_next) = collect_nodes(iter, first)?;
        (nodes, false, has_next)
    } else if let Some(last) = last {
        if first.is_some() {
            return Err("first and last cannot be used together".into());
        }
        let iter = iter_builder(db, None, None).rev();
        let (mut nodes, has_previous) = collect_nodes(iter, last)?;
        nodes.reverse();
        (nodes, has_previous, false)
    } else {
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let iter = iter_builder(db, None, None);
        let (nodes, has_next) = collect_nodes(iter, first)?;
        (nodes, false, has_next)
    };
    Ok(connect_cursor(nodes, has_previous, has_next))
}

fn collect_nodes<I, T>(mut iter: I, size: usize) -> Result<(Vec<T>, bool)>
where
    I: Iterator<Item = anyhow::Result<T>>,
{
    let mut nodes = Vec::with_capacity(size);
    let mut has_more = false;
    while let Some(node) = iter.next() {
        let node = node.map_err(|e| format!("failed to read database: {e}"))?;
        nodes.push(node);
        if nodes.len() == size {
            has_more = iter.next().is_some();
            break;
        }
    }
    Ok((nodes, has_more))
}

pub(crate) fn schema(
    database: Database,
    admin: Arc<dyn AdminApi>,
    chat: Arc<dyn ChatApi>,
    shop: String,
    clock: Clock,
) -> Schema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(database)
        .data(admin)
        .data(chat)
        .data(Arc::new(Debouncer::new(PREVIEW_DEBOUNCE)))
        .data(ShopContext { shop })
        .data(clock)
        .finish()
}
