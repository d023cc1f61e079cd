use shared::domain::SessionValue;
use tracing::debug;

use super::require_key;
use crate::{
    error::BehaviorResult,
    session::{RequestParams, SessionStorage},
};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Keeps the grid's zero-based page index and its page size in two
/// independent session entries. Requests carry 1-based page numbers.
#[derive(Debug, Clone)]
pub struct GridPagination {
    page_key: String,
    page_size_key: String,
    page_param: String,
    page_size_param: String,
    default_page_size: i64,
}

impl GridPagination {
    pub fn new(
        page_key: impl Into<String>,
        page_size_key: impl Into<String>,
    ) -> BehaviorResult<Self> {
        Ok(Self {
            page_key: require_key(page_key.into(), "page session key")?,
            page_size_key: require_key(page_size_key.into(), "page size session key")?,
            page_param: "page".into(),
            page_size_param: "per-page".into(),
            default_page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_params(
        mut self,
        page_param: impl Into<String>,
        page_size_param: impl Into<String>,
    ) -> Self {
        self.page_param = page_param.into();
        self.page_size_param = page_size_param.into();
        self
    }

    pub fn with_default_page_size(mut self, page_size: i64) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn page_key(&self) -> &str {
        &self.page_key
    }

    pub fn page_size_key(&self) -> &str {
        &self.page_size_key
    }

    pub fn ensure_initialized(&self, session: &mut dyn SessionStorage) {
        if !session.contains(&self.page_key) {
            session.set(&self.page_key, SessionValue::Int(0));
        }
        if !session.contains(&self.page_size_key) {
            session.set(&self.page_size_key, SessionValue::Int(self.default_page_size));
        }
    }

    /// Stores `page=N` as index `N - 1`, clamped to 0. A `per-page` value that
    /// is not a positive integer stores the default page size instead of 0,
    /// so a listing never runs with `LIMIT 0`.
    pub fn capture_from_request(&self, session: &mut dyn SessionStorage, request: &RequestParams) {
        if let Some(page) = request.int(&self.page_param) {
            let index = (page - 1).max(0);
            debug!(session_key = %self.page_key, index, "captured grid page");
            session.set(&self.page_key, SessionValue::Int(index));
        }
        if let Some(page_size) = request.int(&self.page_size_param) {
            let page_size = if page_size > 0 {
                page_size
            } else {
                self.default_page_size
            };
            debug!(session_key = %self.page_size_key, page_size, "captured grid page size");
            session.set(&self.page_size_key, SessionValue::Int(page_size));
        }
    }

    /// Current zero-based page index.
    pub fn page(&self, session: &dyn SessionStorage) -> i64 {
        session
            .get(&self.page_key)
            .and_then(SessionValue::as_int)
            .unwrap_or(0)
    }

    pub fn page_size(&self, session: &dyn SessionStorage) -> i64 {
        session
            .get(&self.page_size_key)
            .and_then(SessionValue::as_int)
            .unwrap_or(self.default_page_size)
    }

    pub fn reset_page(&self, session: &mut dyn SessionStorage) {
        session.set(&self.page_key, SessionValue::Int(0));
    }
}
