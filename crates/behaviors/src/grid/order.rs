use shared::domain::{parse_sort, SessionValue, SortPair};
use tracing::debug;

use super::require_key;
use crate::{
    error::BehaviorResult,
    session::{RequestParams, SessionStorage},
};

/// Keeps the grid's sort criterion (`field1,-field2`) in the session.
#[derive(Debug, Clone)]
pub struct GridOrder {
    session_key: String,
    param_name: String,
    default: String,
}

impl GridOrder {
    pub fn new(session_key: impl Into<String>) -> BehaviorResult<Self> {
        Ok(Self {
            session_key: require_key(session_key.into(), "order session key")?,
            param_name: "sort".into(),
            default: String::new(),
        })
    }

    pub fn with_param_name(mut self, param_name: impl Into<String>) -> Self {
        self.param_name = param_name.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn ensure_initialized(&self, session: &mut dyn SessionStorage) {
        if !session.contains(&self.session_key) {
            session.set(&self.session_key, SessionValue::Text(self.default.clone()));
        }
    }

    /// Returns whether the request carried a sort parameter.
    pub fn capture_from_request(
        &self,
        session: &mut dyn SessionStorage,
        request: &RequestParams,
    ) -> bool {
        let Some(sort) = request.get(&self.param_name) else {
            return false;
        };
        debug!(session_key = %self.session_key, %sort, "captured grid order");
        session.set(&self.session_key, SessionValue::Text(sort.to_string()));
        true
    }

    pub fn current_value(&self, session: &dyn SessionStorage) -> String {
        session
            .get(&self.session_key)
            .and_then(SessionValue::as_text)
            .unwrap_or_default()
            .to_string()
    }

    pub fn sort_pairs(&self, session: &dyn SessionStorage) -> Vec<SortPair> {
        parse_sort(&self.current_value(session))
    }
}
