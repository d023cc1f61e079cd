use std::collections::HashMap;

use shared::domain::{FilterSet, SessionValue};

/// Per-user key/value storage that survives across requests.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Option<&SessionValue>;
    fn set(&mut self, key: &str, value: SessionValue);
    fn remove(&mut self, key: &str) -> Option<SessionValue>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Session entries held in memory for the duration of one request. The host
/// loads them before dispatching behaviors and saves them back when `dirty`.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    entries: HashMap<String, SessionValue>,
    dirty: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, SessionValue>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entries(&self) -> &HashMap<String, SessionValue> {
        &self.entries
    }

    pub fn into_entries(self) -> HashMap<String, SessionValue> {
        self.entries
    }
}

impl SessionStorage for MemorySession {
    fn get(&self, key: &str) -> Option<&SessionValue> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: SessionValue) {
        if self.entries.get(key) != Some(&value) {
            self.dirty = true;
        }
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<SessionValue> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }
}

/// Query parameters of the inbound request.
///
/// Bracketed names such as `Ticket[status]=2` are kept verbatim and can be
/// grouped with [`RequestParams::sub_map`].
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Last value of a flat parameter, like a query string parser that lets
    /// later duplicates win.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Integer value of a parameter. Present but non-numeric values coerce to
    /// zero instead of being rejected.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).map(coerce_int)
    }

    /// Collects every `name[field]=value` parameter into a filter set.
    /// Returns `None` when the request carries no such parameter.
    pub fn sub_map(&self, name: &str) -> Option<FilterSet> {
        let mut found = None;
        for (key, value) in &self.pairs {
            let Some(field) = key
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('['))
                .and_then(|rest| rest.strip_suffix(']'))
            else {
                continue;
            };
            if field.is_empty() || field.contains('[') {
                continue;
            }
            found
                .get_or_insert_with(FilterSet::new)
                .insert(field.to_string(), value.clone());
        }
        found
    }
}

/// Reads an optional sign followed by leading digits; anything else is zero.
pub fn coerce_int(raw: &str) -> i64 {
    let raw = raw.trim();
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
