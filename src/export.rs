//! CSV rendering for customer exports. The two flows ship different column
//! sets and the order is part of the contract with existing spreadsheets:
//! the AI-search flow has no Country column.

use jiff::tz::TimeZone;

use crate::api::segment::SegmentCustomer;

const AI_SEARCH_HEADER: [&str; 5] = ["Name", "Email", "Last Purchase", "Total Spent", "Orders"];
const FILTER_AUDIENCE_HEADER: [&str; 6] =
    ["Name", "Email", "Country", "Created Date", "Orders", "Total Spent"];

pub(crate) fn ai_search_csv(customers: &[SegmentCustomer]) -> String {
    let mut out = csv_row(AI_SEARCH_HEADER.iter().map(ToString::to_string));
    for customer in customers {
        out.push('\n');
        out.push_str(&csv_row([
            customer.name.clone(),
            customer.email.clone().unwrap_or_default(),
            customer
                .last_purchase_at
                .map(|ts| day_of(ts.0))
                .unwrap_or_default(),
            format!("{:.2}", customer.total_spent),
            customer.orders.to_string(),
        ]));
    }
    out
}

pub(crate) fn filter_audience_csv(customers: &[SegmentCustomer]) -> String {
    let mut out = csv_row(FILTER_AUDIENCE_HEADER.iter().map(ToString::to_string));
    for customer in customers {
        out.push('\n');
        out.push_str(&csv_row([
            customer.name.clone(),
            customer.email.clone().unwrap_or_default(),
            customer.country.clone().unwrap_or_default(),
            day_of(customer.created_at.0),
            customer.orders.to_string(),
            format!("{:.2}", customer.total_spent),
        ]));
    }
    out
}

fn day_of(ts: jiff::Timestamp) -> String {
    ts.to_zoned(TimeZone::UTC).date().to_string()
}

fn csv_row(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|field| escape(&field))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
