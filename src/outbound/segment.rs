//! Segment-generation collaborator: turns a filter selection into the set of
//! matching customers, or a typed denial when customer data is protected.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AdminClient, CustomerRecord, FetchError, ProtectedScope};

const PROTECTED_DENIAL: &str = "PROTECTED_CUSTOMER_DATA_ACCESS_DENIED";

/// Selected options per filter category. Order within a category carries no
/// meaning; an all-empty selection must never reach the remote endpoint.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub(crate) struct FilterSelection {
    pub(crate) location: Vec<String>,
    pub(crate) products: Vec<String>,
    pub(crate) timing: Vec<String>,
    pub(crate) device: Vec<String>,
    pub(crate) payment: Vec<String>,
    pub(crate) delivery: Vec<String>,
}

impl FilterSelection {
    pub(crate) fn is_empty(&self) -> bool {
        self.location.is_empty()
            && self.products.is_empty()
            && self.timing.is_empty()
            && self.device.is_empty()
            && self.payment.is_empty()
            && self.delivery.is_empty()
    }

    /// Human-readable criteria text shown in the UI and stored on saved lists.
    pub(crate) fn describe(&self) -> String {
        let mut clauses = Vec::new();
        if !self.location.is_empty() {
            clauses.push(format!("located in {}", join_options(&self.location)));
        }
        if !self.products.is_empty() {
            clauses.push(format!("who bought {}", join_options(&self.products)));
        }
        if !self.timing.is_empty() {
            clauses.push(format!("shopping in the {}", join_options(&self.timing)));
        }
        if !self.device.is_empty() {
            clauses.push(format!("using {}", join_options(&self.device)));
        }
        if !self.payment.is_empty() {
            clauses.push(format!("paying via {}", join_options(&self.payment)));
        }
        if !self.delivery.is_empty() {
            clauses.push(format!("with {} delivery", join_options(&self.delivery)));
        }
        if clauses.is_empty() {
            return String::from("All customers");
        }
        format!("Customers {}", clauses.join(", "))
    }
}

fn join_options(options: &[String]) -> String {
    match options {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {last}", init.join(", ")),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SegmentMatchRequest {
    pub(crate) shop: String,
    pub(crate) filters: FilterSelection,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SegmentMatchResponse {
    #[serde(default)]
    pub(crate) success: bool,
    #[serde(default)]
    pub(crate) match_count: i64,
    #[serde(default)]
    pub(crate) customers: Vec<CustomerRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentWire {
    Denied { error: String },
    Matched(SegmentMatchResponse),
}

pub(super) async fn send_match_request(
    client: &AdminClient,
    request: &SegmentMatchRequest,
) -> Result<SegmentMatchResponse, FetchError> {
    let body = serde_json::to_value(request)
        .map_err(|e| FetchError::Query(format!("failed to serialize match request: {e}")))?;
    let raw = client
        .post_json(client.segment_endpoint(), &body)
        .send()
        .await?
        .text()
        .await?;
    let response = decode_match_response(&raw)?;
    info!(matches = response.match_count, "segment match complete");
    Ok(response)
}

fn decode_match_response(body: &str) -> Result<SegmentMatchResponse, FetchError> {
    match serde_json::from_str::<SegmentWire>(body) {
        Ok(SegmentWire::Denied { error }) if error == PROTECTED_DENIAL => {
            Err(FetchError::ProtectedData(ProtectedScope::Customers))
        }
        Ok(SegmentWire::Denied { error }) => Err(FetchError::Query(error)),
        Ok(SegmentWire::Matched(response)) => Ok(response),
        Err(e) => Err(FetchError::Query(format!(
            "unrecognized segment response: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_match_response, FilterSelection};
    use crate::outbound::{FetchError, ProtectedScope};

    fn selection(location: &[&str], payment: &[&str]) -> FilterSelection {
        FilterSelection {
            location: location.iter().map(ToString::to_string).collect(),
            payment: payment.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_selection_is_empty() {
        assert!(FilterSelection::default().is_empty());
        assert!(!selection(&["France"], &[]).is_empty());
    }

    #[test]
    fn describe_joins_categories_in_a_fixed_order() {
        let described = selection(&["United States", "Canada"], &["cash on delivery"]).describe();
        assert_eq!(
            described,
            "Customers located in United States or Canada, paying via cash on delivery"
        );
    }

    #[test]
    fn describe_empty_selection_names_everyone() {
        assert_eq!(FilterSelection::default().describe(), "All customers");
    }

    #[test]
    fn decode_success_payload() {
        let body = r#"{
            "success": true,
            "matchCount": 2,
            "customers": [
                {"id": "gid://shopify/Customer/1", "createdAt": "2024-06-01T00:00:00Z"},
                {"id": "gid://shopify/Customer/2", "createdAt": "2024-07-01T00:00:00Z"}
            ]
        }"#;
        let response = decode_match_response(body).unwrap();
        assert!(response.success);
        assert_eq!(response.match_count, 2);
        assert_eq!(response.customers.len(), 2);
    }

    #[test]
    fn decode_protected_denial() {
        let body = r#"{"error": "PROTECTED_CUSTOMER_DATA_ACCESS_DENIED"}"#;
        let err = decode_match_response(body).unwrap_err();
        assert!(matches!(
            err,
            FetchError::ProtectedData(ProtectedScope::Customers)
        ));
    }

    #[test]
    fn decode_other_error_is_a_query_failure() {
        let body = r#"{"error": "SEGMENT_SERVICE_UNAVAILABLE"}"#;
        match decode_match_response(body).unwrap_err() {
            FetchError::Query(message) => assert_eq!(message, "SEGMENT_SERVICE_UNAVAILABLE"),
            other => panic!("expected query error, got {other:?}"),
        }
    }
}
