use async_trait::async_trait;
use shared::protocol::ListingQuery;
use tracing::debug;

use super::{FilterDefault, GridFilters, GridOrder, GridPagination};
use crate::{
    error::BehaviorResult,
    lifecycle::{EventContext, Record, RecordListener},
    session::{RequestParams, SessionStorage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridCapture {
    pub filters_changed: bool,
    /// The page index was forced back to the first page.
    pub page_reset: bool,
}

/// Filters, order and pagination of one grid. Holds the three stores
/// directly so a filter change can reset the page without looking anything
/// up at runtime.
#[derive(Debug, Clone)]
pub struct GridState {
    filters: GridFilters,
    order: GridOrder,
    pagination: GridPagination,
}

impl GridState {
    pub fn new(filters: GridFilters, order: GridOrder, pagination: GridPagination) -> Self {
        Self {
            filters,
            order,
            pagination,
        }
    }

    /// Session keys derived from `prefix`, filters defaulting to the record's
    /// current attributes.
    pub fn for_model(prefix: &str) -> BehaviorResult<Self> {
        Ok(Self::new(
            GridFilters::new(format!("{prefix}GridFilters"), FilterDefault::RecordAttributes)?,
            GridOrder::new(format!("{prefix}GridOrder"))?,
            GridPagination::new(format!("{prefix}GridPage"), format!("{prefix}GridPageSize"))?,
        ))
    }

    pub fn filters(&self) -> &GridFilters {
        &self.filters
    }

    pub fn order(&self) -> &GridOrder {
        &self.order
    }

    pub fn pagination(&self) -> &GridPagination {
        &self.pagination
    }

    pub fn capture(
        &self,
        record: &dyn Record,
        session: &mut dyn SessionStorage,
        request: &RequestParams,
    ) -> GridCapture {
        self.filters.ensure_initialized(session, record);
        self.order.ensure_initialized(session);
        self.pagination.ensure_initialized(session);

        self.pagination.capture_from_request(session, request);
        self.order.capture_from_request(session, request);
        let filters = self.filters.capture_from_request(session, request, record);

        let page_reset = filters.changed;
        if page_reset {
            self.pagination.reset_page(session);
        }
        GridCapture {
            filters_changed: filters.changed,
            page_reset,
        }
    }

    pub fn listing_query(&self, session: &dyn SessionStorage) -> ListingQuery {
        ListingQuery {
            page: self.pagination.page(session),
            page_size: self.pagination.page_size(session),
            sort: self.order.sort_pairs(session),
            filters: self.filters.current_value(session),
        }
    }
}

#[async_trait]
impl RecordListener for GridState {
    fn on_init(&self, record: &dyn Record, ctx: &mut EventContext<'_>) -> BehaviorResult<()> {
        let capture = self.capture(record, &mut *ctx.session, ctx.request);
        debug!(
            model_class = record.model_class(),
            filters_changed = capture.filters_changed,
            "grid state captured"
        );
        Ok(())
    }
}
