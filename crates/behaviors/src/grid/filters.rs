use shared::domain::{FilterSet, SessionValue};
use tracing::debug;

use super::require_key;
use crate::{
    error::BehaviorResult,
    lifecycle::{stringify_value, Record},
    session::{RequestParams, SessionStorage},
};

/// Value stored the first time a grid's filters are touched.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDefault {
    Static(FilterSet),
    /// The host record's current attributes, stringified.
    RecordAttributes,
}

impl FilterDefault {
    fn resolve(&self, record: &dyn Record) -> FilterSet {
        match self {
            FilterDefault::Static(filters) => filters.clone(),
            FilterDefault::RecordAttributes => record
                .attributes()
                .iter()
                .map(|(name, value)| (name.clone(), stringify_value(value)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterCapture {
    /// The request carried filter parameters for this grid.
    pub present: bool,
    /// The captured filters differ from the previously stored ones.
    pub changed: bool,
}

/// Keeps the grid's filter values in one session entry. Filters arrive as
/// `Model[field]=value` parameters, `Model` being the record's short name
/// unless a parameter name is configured.
#[derive(Debug, Clone)]
pub struct GridFilters {
    session_key: String,
    param_name: Option<String>,
    default: FilterDefault,
}

impl GridFilters {
    pub fn new(session_key: impl Into<String>, default: FilterDefault) -> BehaviorResult<Self> {
        Ok(Self {
            session_key: require_key(session_key.into(), "filters session key")?,
            param_name: None,
            default,
        })
    }

    pub fn with_param_name(mut self, param_name: impl Into<String>) -> Self {
        self.param_name = Some(param_name.into());
        self
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn param_name<'a>(&'a self, record: &'a dyn Record) -> &'a str {
        self.param_name
            .as_deref()
            .unwrap_or_else(|| record.short_name())
    }

    pub fn ensure_initialized(&self, session: &mut dyn SessionStorage, record: &dyn Record) {
        if !session.contains(&self.session_key) {
            session.set(
                &self.session_key,
                SessionValue::Filters(self.default.resolve(record)),
            );
        }
    }

    pub fn capture_from_request(
        &self,
        session: &mut dyn SessionStorage,
        request: &RequestParams,
        record: &dyn Record,
    ) -> FilterCapture {
        let Some(incoming) = request.sub_map(self.param_name(record)) else {
            return FilterCapture::default();
        };

        let previous = self.current_value(session);
        let changed = previous != incoming;
        debug!(
            session_key = %self.session_key,
            changed,
            filters = incoming.len(),
            "captured grid filters"
        );
        session.set(&self.session_key, SessionValue::Filters(incoming));
        FilterCapture {
            present: true,
            changed,
        }
    }

    pub fn current_value(&self, session: &dyn SessionStorage) -> FilterSet {
        session
            .get(&self.session_key)
            .and_then(SessionValue::as_filters)
            .cloned()
            .unwrap_or_default()
    }

    /// Filters to load into the search model: the request's own filters when
    /// present, otherwise the ones remembered in the session.
    pub fn filters_for_load(
        &self,
        session: &dyn SessionStorage,
        request: &RequestParams,
        record: &dyn Record,
    ) -> FilterSet {
        request
            .sub_map(self.param_name(record))
            .unwrap_or_else(|| self.current_value(session))
    }
}
