use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use async_graphql::{Context, Enum, Object, Result, SimpleObject};

use crate::api::{remote_error, Clock};
use crate::daterange::{self, DateRange, DateRangeToken};
use crate::outbound::{AdminApi, OrderRecord};

/// Customers whose lifetime spend reaches this floor count as high spenders.
const HIGH_SPENDER_FLOOR: f64 = 500.0;

/// The dashboard metrics. Each one is the same fetch-filter-dedup pipeline
/// with a different predicate; the predicate is the only per-metric code.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum MetricKind {
    DiscountUsers,
    WishlistUsers,
    MorningPurchasers,
    AfternoonPurchasers,
    EveningPurchasers,
    RepeatPurchasers,
    HighSpenders,
    NewCustomers,
    CashOnDeliveryPurchasers,
}

impl MetricKind {
    /// Pure per-record test. Orders without a customer never match: every
    /// metric counts unique customers, so there is nothing to attribute the
    /// order to.
    fn matches(self, order: &OrderRecord, range: &DateRange) -> bool {
        let Some(customer) = order.customer.as_ref() else {
            return false;
        };
        match self {
            MetricKind::DiscountUsers => order.total_discounts > 0.0,
            MetricKind::WishlistUsers => customer
                .tags
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case("wishlist")),
            MetricKind::MorningPurchasers => hour_in(order, range, 6..12),
            MetricKind::AfternoonPurchasers => hour_in(order, range, 12..18),
            MetricKind::EveningPurchasers => hour_in(order, range, 18..24),
            MetricKind::RepeatPurchasers => customer.number_of_orders > 1,
            MetricKind::HighSpenders => customer.total_spent >= HIGH_SPENDER_FLOOR,
            MetricKind::NewCustomers => customer.created_at >= range.start.timestamp(),
            MetricKind::CashOnDeliveryPurchasers => order
                .payment_gateway_names
                .iter()
                .any(|gateway| gateway == "cash_on_delivery"),
        }
    }
}

fn hour_in(order: &OrderRecord, range: &DateRange, hours: Range<i8>) -> bool {
    let local = order.created_at.to_zoned(range.time_zone().clone());
    hours.contains(&local.hour())
}

/// Count distinct customers among the matching records. Always a set
/// cardinality, never a sum of per-page lengths, so cursor re-fetch overlap
/// across page boundaries cannot double-count.
fn unique_customers<'a, I>(records: I, kind: MetricKind, range: &DateRange) -> usize
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        if kind.matches(record, range) {
            if let Some(customer) = record.customer.as_ref() {
                seen.insert(customer.id.as_str());
            }
        }
    }
    seen.len()
}

#[derive(SimpleObject, Debug, PartialEq)]
pub(crate) struct MetricDataPoint {
    /// Calendar day the point is anchored to, in ISO form.
    pub(crate) date: String,
    pub(crate) count: i64,
}

/// One point for `TODAY`, two for every other token: the range-start day
/// alone, then the full range, rendering a two-point trend line.
fn build_points(
    records: &[OrderRecord],
    kind: MetricKind,
    token: DateRangeToken,
    range: &DateRange,
) -> anyhow::Result<Vec<MetricDataPoint>> {
    let full = i64::try_from(unique_customers(records, kind, range))?;
    if token == DateRangeToken::Today {
        return Ok(vec![MetricDataPoint {
            date: range.start_day().to_string(),
            count: full,
        }]);
    }

    let first_day_end = daterange::end_of_day(range.start_day(), range.time_zone())?.timestamp();
    let first_day = records
        .iter()
        .filter(|record| record.created_at <= first_day_end);
    let start_count = i64::try_from(unique_customers(first_day, kind, range))?;
    Ok(vec![
        MetricDataPoint {
            date: range.start_day().to_string(),
            count: start_count,
        },
        MetricDataPoint {
            date: range.end_day().to_string(),
            count: full,
        },
    ])
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum GrowthDirection {
    Growth,
    Decrease,
    NoChange,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum GrowthTone {
    Success,
    Warning,
    Critical,
}

/// A decrease sharper than this flips the tone from warning to critical.
const CRITICAL_DECREASE: f64 = 5.0;

#[derive(SimpleObject, Debug, PartialEq)]
pub(crate) struct Growth {
    /// Signed percentage change between the two trend points.
    pub(crate) percentage: f64,
    pub(crate) direction: GrowthDirection,
    pub(crate) tone: GrowthTone,
    /// Display form, e.g. "50% growth".
    pub(crate) label: String,
}

/// An empty starting point growing to anything counts as 100% growth; the
/// division-by-zero special case is a carried-over quirk, not rigorous math.
pub(crate) fn growth_between(start: i64, end: i64) -> Growth {
    #[allow(clippy::cast_precision_loss)]
    let percentage = if start == 0 && end == 0 {
        0.0
    } else if start == 0 {
        100.0
    } else {
        (end - start) as f64 / start as f64 * 100.0
    };

    let direction = if percentage > 0.0 {
        GrowthDirection::Growth
    } else if percentage < 0.0 {
        GrowthDirection::Decrease
    } else {
        GrowthDirection::NoChange
    };

    let tone = if percentage >= 0.0 {
        GrowthTone::Success
    } else if percentage > -CRITICAL_DECREASE {
        GrowthTone::Warning
    } else {
        GrowthTone::Critical
    };

    let magnitude = format_percentage(percentage.abs());
    let label = match direction {
        GrowthDirection::Growth => format!("{magnitude}% growth"),
        GrowthDirection::Decrease => format!("{magnitude}% decrease"),
        GrowthDirection::NoChange => format!("{magnitude}% change"),
    };

    Growth {
        percentage,
        direction,
        tone,
        label,
    }
}

fn format_percentage(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[derive(SimpleObject)]
pub(crate) struct MetricStat {
    pub(crate) kind: MetricKind,
    /// Distinct customers matching the predicate over the whole range.
    pub(crate) unique_count: i64,
    pub(crate) points: Vec<MetricDataPoint>,
    pub(crate) growth: Growth,
    /// Set when the fetch stopped at the record cap; the count is a floor,
    /// not an exact value.
    pub(crate) truncated: bool,
}

#[derive(Default)]
pub(super) struct MetricQuery;

#[Object]
impl MetricQuery {
    /// One dashboard metric over a symbolic date range. Each card issues its
    /// own independent query; a slow or failing metric never blocks another.
    async fn metric_stat(
        &self,
        ctx: &Context<'_>,
        kind: MetricKind,
        range: DateRangeToken,
    ) -> Result<MetricStat> {
        let admin = ctx.data::<Arc<dyn AdminApi>>()?;
        let clock = ctx.data::<Clock>()?;
        let resolved = daterange::resolve(range, &clock.now())?;

        let fetch = admin
            .orders_in_range(&resolved)
            .await
            .map_err(remote_error)?;

        let points = build_points(&fetch.records, kind, range, &resolved)?;
        let unique_count = points.last().map_or(0, |point| point.count);
        let growth = match points.as_slice() {
            [start, end] => growth_between(start.count, end.count),
            _ => growth_between(unique_count, unique_count),
        };

        Ok(MetricStat {
            kind,
            unique_count,
            points,
            growth,
            truncated: fetch.truncated,
        })
    }
}
