use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(AuditRowId);
id_newtype!(TicketId);

/// Current filter values of one grid, keyed by attribute name.
pub type FilterSet = BTreeMap<String, String>;

/// Username recorded for changes made without an authenticated user.
pub const SYSTEM_ACTOR: &str = "Console";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPair {
    pub field: String,
    pub direction: SortDirection,
}

impl SortPair {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Parses a sort criterion such as `name,-age`. A leading `-` marks a
/// descending field; empty tokens are skipped.
pub fn parse_sort(raw: &str) -> Vec<SortPair> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(SortPair::new(field, SortDirection::Desc)),
            Some(_) => None,
            None => Some(SortPair::new(token, SortDirection::Asc)),
        })
        .collect()
}

pub fn format_sort(pairs: &[SortPair]) -> String {
    pairs
        .iter()
        .map(|pair| match pair.direction {
            SortDirection::Asc => pair.field.clone(),
            SortDirection::Desc => format!("-{}", pair.field),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// A value held in session storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SessionValue {
    Text(String),
    Int(i64),
    Filters(FilterSet),
}

impl SessionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SessionValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_filters(&self) -> Option<&FilterSet> {
        match self {
            SessionValue::Filters(filters) => Some(filters),
            _ => None,
        }
    }
}

/// Who triggered a record change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(String),
    /// Background work with no authenticated user.
    System,
}

impl Actor {
    pub fn username(&self) -> &str {
        match self {
            Actor::User(name) => name,
            Actor::System => SYSTEM_ACTOR,
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
