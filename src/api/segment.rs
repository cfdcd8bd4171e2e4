use std::sync::Arc;

use async_graphql::{Context, Enum, InputObject, Object, Result, SimpleObject};

use crate::api::{remote_error, DateTimeUtc, ShopContext};
use crate::debounce::Debouncer;
use crate::export;
use crate::outbound::segment::{FilterSelection, SegmentMatchRequest};
use crate::outbound::{AdminApi, CustomerRecord};

#[derive(InputObject, Debug, Default)]
pub(crate) struct FilterSelectionInput {
    #[graphql(default)]
    location: Vec<String>,
    #[graphql(default)]
    products: Vec<String>,
    #[graphql(default)]
    timing: Vec<String>,
    #[graphql(default)]
    device: Vec<String>,
    #[graphql(default)]
    payment: Vec<String>,
    #[graphql(default)]
    delivery: Vec<String>,
}

impl From<FilterSelectionInput> for FilterSelection {
    fn from(input: FilterSelectionInput) -> Self {
        FilterSelection {
            location: input.location,
            products: input.products,
            timing: input.timing,
            device: input.device,
            payment: input.payment,
            delivery: input.delivery,
        }
    }
}

#[derive(SimpleObject, Debug)]
pub(crate) struct SegmentCustomer {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) orders: i64,
    pub(crate) total_spent: f64,
    pub(crate) created_at: DateTimeUtc,
    pub(crate) last_purchase_at: Option<DateTimeUtc>,
}

impl From<CustomerRecord> for SegmentCustomer {
    fn from(record: CustomerRecord) -> Self {
        SegmentCustomer {
            id: record.id,
            name: record.display_name,
            email: record.email,
            country: record.country,
            orders: record.number_of_orders,
            total_spent: record.total_spent,
            created_at: DateTimeUtc(record.created_at),
            last_purchase_at: record.last_purchase_at.map(DateTimeUtc),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct SegmentPreview {
    pub(crate) match_count: i64,
    /// Human-readable restatement of the selection, also stored on saved lists.
    pub(crate) criteria: String,
    pub(crate) customers: Vec<SegmentCustomer>,
}

/// Which flow an export belongs to; the flows ship different column sets.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ExportFlow {
    AiSearch,
    FilterAudience,
}

#[derive(Default)]
pub(super) struct SegmentQuery;

#[Object]
impl SegmentQuery {
    /// Evaluate a filter selection against the store. An empty selection
    /// resolves locally to zero matches; it must never turn into an
    /// unbounded match-everything query upstream.
    async fn segment_preview(
        &self,
        ctx: &Context<'_>,
        filters: FilterSelectionInput,
    ) -> Result<SegmentPreview> {
        let selection: FilterSelection = filters.into();
        run_preview(ctx, selection).await
    }

    /// Debounced variant backing the live preview while the user edits the
    /// selection. Returns `null` when a newer edit superseded this one
    /// within the window; no remote call is made in that case.
    async fn live_segment_preview(
        &self,
        ctx: &Context<'_>,
        filters: FilterSelectionInput,
    ) -> Result<Option<SegmentPreview>> {
        let debouncer = ctx.data::<Arc<Debouncer>>()?;
        if !debouncer.settle().await {
            return Ok(None);
        }
        let selection: FilterSelection = filters.into();
        run_preview(ctx, selection).await.map(Some)
    }

    /// Matched customers rendered as CSV with the per-flow column order.
    async fn segment_export(
        &self,
        ctx: &Context<'_>,
        filters: FilterSelectionInput,
        flow: ExportFlow,
    ) -> Result<String> {
        let preview = run_preview(ctx, filters.into()).await?;
        let csv = match flow {
            ExportFlow::AiSearch => export::ai_search_csv(&preview.customers),
            ExportFlow::FilterAudience => export::filter_audience_csv(&preview.customers),
        };
        Ok(csv)
    }
}

async fn run_preview(ctx: &Context<'_>, selection: FilterSelection) -> Result<SegmentPreview> {
    let criteria = selection.describe();
    if selection.is_empty() {
        return Ok(SegmentPreview {
            match_count: 0,
            criteria,
            customers: Vec::new(),
        });
    }

    let admin = ctx.data::<Arc<dyn AdminApi>>()?;
    let shop = ctx.data::<ShopContext>()?;
    let request = SegmentMatchRequest {
        shop: shop.shop.clone(),
        filters: selection,
    };
    let response = admin.match_segment(&request).await.map_err(remote_error)?;

    Ok(SegmentPreview {
        match_count: response.match_count,
        criteria,
        customers: response
            .customers
            .into_iter()
            .map(SegmentCustomer::from)
            .collect(),
    })
}
