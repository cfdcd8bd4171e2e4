pub(crate) mod chat;
pub(crate) mod segment;

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use graphql_client::{Error as GraphQlError, Response as GraphQlResponse};
use jiff::Timestamp;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::daterange::DateRange;
use crate::outbound::segment::{SegmentMatchRequest, SegmentMatchResponse};
use crate::settings;

const ADMIN_FETCH_SIZE: i64 = 250;
/// Hard ceiling on records absorbed per fetch. Reaching it marks the result as
/// truncated instead of failing or silently undercounting.
const RECORD_CAP: usize = 1000;
const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const ORDERS_QUERY: &str = r"query Orders($first: Int!, $after: String, $query: String) {
  orders(first: $first, after: $after, query: $query) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      id
      createdAt
      totalDiscounts
      paymentGatewayNames
      customer {
        id
        displayName
        email
        country
        tags
        numberOfOrders
        totalSpent
        createdAt
        lastPurchaseAt
      }
    }
  }
}";

/// Field set the remote API gates behind a merchant-granted permission scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtectedScope {
    Orders,
    Customers,
}

impl fmt::Display for ProtectedScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtectedScope::Orders => write!(f, "order"),
            ProtectedScope::Customers => write!(f, "customer"),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    /// The app has not been approved for the protected field set. Callers
    /// render a permission-request prompt instead of a generic failure.
    #[error("access to protected {0} data has not been approved for this app")]
    ProtectedData(ProtectedScope),
    #[error("remote query failed: {0}")]
    Query(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

fn protected_signature() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)not approved|protected (customer|order) data")
            .expect("protected-data signature pattern is valid")
    })
}

/// Map a remote `errors` payload to the typed taxonomy. The first message
/// decides; a protected-data signature wins over a generic query failure.
fn classify_remote_errors(errors: &[GraphQlError], scope: ProtectedScope) -> FetchError {
    if errors
        .iter()
        .any(|e| protected_signature().is_match(&e.message))
    {
        return FetchError::ProtectedData(scope);
    }
    let first = errors.first().map_or_else(
        || String::from("unknown remote error"),
        |e| e.message.clone(),
    );
    FetchError::Query(first)
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderRecord {
    pub(crate) id: String,
    pub(crate) created_at: Timestamp,
    #[serde(default, deserialize_with = "de_money")]
    pub(crate) total_discounts: f64,
    #[serde(default)]
    pub(crate) payment_gateway_names: Vec<String>,
    pub(crate) customer: Option<CustomerRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomerRecord {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) display_name: String,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) country: Option<String>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) number_of_orders: i64,
    #[serde(default, deserialize_with = "de_money")]
    pub(crate) total_spent: f64,
    #[serde(default)]
    pub(crate) created_at: Timestamp,
    #[serde(default)]
    pub(crate) last_purchase_at: Option<Timestamp>,
}

/// Money scalars arrive as decimal strings; tolerate plain numbers too.
fn de_money<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Money {
        Num(f64),
        Text(String),
    }
    match Money::deserialize(deserializer)? {
        Money::Num(v) => Ok(v),
        Money::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderConnection {
    #[serde(default)]
    nodes: Vec<OrderRecord>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct OrdersData {
    orders: OrderConnection,
}

/// Result of walking every page of a range-scoped query.
#[derive(Debug, Default)]
pub(crate) struct OrderFetch {
    pub(crate) records: Vec<OrderRecord>,
    pub(crate) truncated: bool,
}

/// The remote collaborators a metric or segment resolver needs. Production
/// uses [`AdminClient`]; tests inject a canned implementation.
#[async_trait]
pub(crate) trait AdminApi: Send + Sync {
    /// Fetch every order in the range, across all pages.
    async fn orders_in_range(&self, range: &DateRange) -> Result<OrderFetch, FetchError>;

    /// Ask the segment-generation service for the customers matching a
    /// filter selection.
    async fn match_segment(
        &self,
        request: &SegmentMatchRequest,
    ) -> Result<SegmentMatchResponse, FetchError>;
}

pub(crate) struct AdminClient {
    client: Client,
    endpoint: String,
    segment_endpoint: String,
    token: String,
}

impl AdminClient {
    pub(crate) fn new(settings: &settings::Shopify) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(AdminClient {
            client,
            endpoint: settings.endpoint.clone(),
            segment_endpoint: settings.segment_endpoint.clone(),
            token: settings.token.clone(),
        })
    }

    pub(crate) fn segment_endpoint(&self) -> &str {
        &self.segment_endpoint
    }

    pub(crate) fn post_admin(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .json(body)
    }

    pub(crate) fn post_json(&self, url: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client.post(url).json(body)
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn orders_in_range(&self, range: &DateRange) -> Result<OrderFetch, FetchError> {
        let filter = range_filter(range);
        let mut records: Vec<OrderRecord> = Vec::new();
        let mut end_cur: Option<String> = None;
        loop {
            let body = json!({
                "query": ORDERS_QUERY,
                "variables": {
                    "first": ADMIN_FETCH_SIZE,
                    "after": end_cur,
                    "query": filter,
                },
            });
            let resp: GraphQlResponse<OrdersData> =
                self.post_admin(&body).send().await?.json().await?;
            if let Some(errors) = resp.errors.filter(|errors| !errors.is_empty()) {
                return Err(classify_remote_errors(&errors, ProtectedScope::Orders));
            }
            let Some(data) = resp.data else {
                return Err(FetchError::Query(String::from(
                    "response carried neither data nor errors",
                )));
            };
            let page = data.orders;
            if absorb_page(&mut records, page.nodes) {
                info!(total = records.len(), "order fetch hit the record cap");
                return Ok(OrderFetch {
                    records,
                    truncated: true,
                });
            }
            if !page.page_info.has_next_page {
                break;
            }
            end_cur = page.page_info.end_cursor;
        }
        info!(total = records.len(), "order fetch complete");
        Ok(OrderFetch {
            records,
            truncated: false,
        })
    }

    async fn match_segment(
        &self,
        request: &SegmentMatchRequest,
    ) -> Result<SegmentMatchResponse, FetchError> {
        segment::send_match_request(self, request).await
    }
}

fn range_filter(range: &DateRange) -> String {
    format!(
        "created_at:>='{}' AND created_at:<='{}'",
        range.start.timestamp(),
        range.end.timestamp()
    )
}

/// Append one page of nodes, enforcing the record cap. Returns `true` when
/// the cap was reached and the fetch must stop as truncated.
fn absorb_page(records: &mut Vec<OrderRecord>, nodes: Vec<OrderRecord>) -> bool {
    for node in nodes {
        records.push(node);
        if records.len() >= RECORD_CAP {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use graphql_client::Error as GraphQlError;

    use super::{
        absorb_page, classify_remote_errors, range_filter, FetchError, OrderRecord,
        ProtectedScope, RECORD_CAP,
    };
    use crate::daterange::{resolve, DateRangeToken};

    fn remote_error(message: &str) -> GraphQlError {
        GraphQlError {
            message: message.to_string(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    #[test]
    fn not_approved_message_classifies_as_protected_data() {
        let errors = vec![remote_error(
            "This app is not approved to access the Order object.",
        )];
        let err = classify_remote_errors(&errors, ProtectedScope::Orders);
        assert!(matches!(
            err,
            FetchError::ProtectedData(ProtectedScope::Orders)
        ));
    }

    #[test]
    fn protected_customer_data_message_classifies_as_protected_data() {
        let errors = vec![
            remote_error("something unrelated"),
            remote_error("Protected customer data access is required."),
        ];
        let err = classify_remote_errors(&errors, ProtectedScope::Customers);
        assert!(matches!(
            err,
            FetchError::ProtectedData(ProtectedScope::Customers)
        ));
    }

    #[test]
    fn other_messages_classify_as_query_error_with_first_message() {
        let errors = vec![
            remote_error("Throttled"),
            remote_error("Internal error"),
        ];
        let err = classify_remote_errors(&errors, ProtectedScope::Orders);
        match err {
            FetchError::Query(message) => assert_eq!(message, "Throttled"),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn absorb_page_stops_at_the_cap() {
        let mut records = Vec::new();
        let below: Vec<OrderRecord> = (0..RECORD_CAP - 1)
            .map(|i| OrderRecord {
                id: format!("gid://shopify/Order/{i}"),
                ..Default::default()
            })
            .collect();
        assert!(!absorb_page(&mut records, below));
        assert_eq!(records.len(), RECORD_CAP - 1);

        let over: Vec<OrderRecord> = (0..5)
            .map(|i| OrderRecord {
                id: format!("gid://shopify/Order/late-{i}"),
                ..Default::default()
            })
            .collect();
        assert!(absorb_page(&mut records, over));
        assert_eq!(records.len(), RECORD_CAP);
    }

    #[test]
    fn range_filter_uses_instants_of_both_boundaries() {
        let now = jiff::civil::date(2025, 3, 15)
            .at(12, 0, 0, 0)
            .to_zoned(jiff::tz::TimeZone::UTC)
            .unwrap();
        let range = resolve(DateRangeToken::Yesterday, &now).unwrap();
        let filter = range_filter(&range);
        assert!(filter.starts_with("created_at:>='2025-03-14T00:00:00Z'"));
        assert!(filter.contains("created_at:<='2025-03-14T23:59:59"));
    }

    #[test]
    fn order_record_accepts_money_as_string_or_number() {
        let json = r#"{
            "id": "gid://shopify/Order/1",
            "createdAt": "2025-03-14T10:00:00Z",
            "totalDiscounts": "12.50",
            "paymentGatewayNames": ["shopify_payments"],
            "customer": {
                "id": "gid://shopify/Customer/7",
                "displayName": "Ada",
                "createdAt": "2024-01-01T00:00:00Z",
                "totalSpent": 99.5
            }
        }"#;
        let order: OrderRecord = serde_json::from_str(json).unwrap();
        assert!((order.total_discounts - 12.5).abs() < f64::EPSILON);
        let customer = order.customer.unwrap();
        assert!((customer.total_spent - 99.5).abs() < f64::EPSILON);
    }
}
