//! Record lifecycle events and the explicit listener registry behaviors
//! attach to.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use shared::domain::Actor;
use tracing::trace;

use crate::{
    error::BehaviorResult,
    session::{RequestParams, SessionStorage},
};

pub type AttributeMap = BTreeMap<String, Value>;

/// A persisted entity that publishes lifecycle events.
pub trait Record: Send + Sync {
    /// Fully qualified type name, written to the audit table.
    fn model_class(&self) -> &str;

    /// Type name without its module path; used as the grid filter parameter.
    fn short_name(&self) -> &str {
        self.model_class().rsplit("::").next().unwrap_or_default()
    }

    fn primary_key(&self) -> Option<String>;

    fn attributes(&self) -> AttributeMap;

    /// Builds the whole attribute map; read `attributes()` once when looking
    /// up several values.
    fn attribute(&self, name: &str) -> Value {
        self.attributes().remove(name).unwrap_or(Value::Null)
    }

    fn attribute_label(&self, attr: &str) -> String {
        humanize_attribute(attr)
    }

    /// Custom audit text for deletions.
    fn deleted_record_text(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Init,
    AfterInsert,
    /// `changed_attributes` holds the old value of every dirty attribute.
    AfterUpdate { changed_attributes: AttributeMap },
    AfterDelete,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Init => "init",
            LifecycleEvent::AfterInsert => "after_insert",
            LifecycleEvent::AfterUpdate { .. } => "after_update",
            LifecycleEvent::AfterDelete => "after_delete",
        }
    }
}

/// The request-scoped state a listener may read or mutate.
pub struct EventContext<'a> {
    pub session: &'a mut (dyn SessionStorage + Send + Sync),
    pub request: &'a RequestParams,
    pub actor: &'a Actor,
}

#[async_trait]
pub trait RecordListener: Send + Sync {
    fn on_init(&self, _record: &dyn Record, _ctx: &mut EventContext<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn after_insert(&self, _record: &dyn Record, _ctx: &EventContext<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn after_update(
        &self,
        _record: &dyn Record,
        _changed_attributes: &AttributeMap,
        _ctx: &EventContext<'_>,
    ) -> BehaviorResult<()> {
        Ok(())
    }

    async fn after_delete(&self, _record: &dyn Record, _ctx: &EventContext<'_>) -> BehaviorResult<()> {
        Ok(())
    }
}

/// Listeners attached to one record type, invoked in registration order.
#[derive(Clone, Default)]
pub struct RecordLifecycle {
    listeners: Vec<Arc<dyn RecordListener>>,
}

impl RecordLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn RecordListener>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Runs every listener for `event`. The first error stops dispatch and is
    /// returned to the caller.
    pub async fn dispatch(
        &self,
        record: &dyn Record,
        event: &LifecycleEvent,
        ctx: &mut EventContext<'_>,
    ) -> BehaviorResult<()> {
        trace!(
            model_class = record.model_class(),
            event = event.name(),
            listeners = self.listeners.len(),
            "dispatching lifecycle event"
        );
        for listener in &self.listeners {
            match event {
                LifecycleEvent::Init => listener.on_init(record, ctx)?,
                LifecycleEvent::AfterInsert => listener.after_insert(record, ctx).await?,
                LifecycleEvent::AfterUpdate { changed_attributes } => {
                    listener
                        .after_update(record, changed_attributes, ctx)
                        .await?
                }
                LifecycleEvent::AfterDelete => listener.after_delete(record, ctx).await?,
            }
        }
        Ok(())
    }
}

/// Old values of every attribute whose value differs between `before` and
/// `after`.
pub fn changed_attributes(before: &AttributeMap, after: &AttributeMap) -> AttributeMap {
    before
        .iter()
        .filter(|(name, old)| after.get(*name).unwrap_or(&Value::Null) != *old)
        .map(|(name, old)| (name.clone(), old.clone()))
        .collect()
}

/// String form used for every attribute comparison, so that `1` and `"1"`
/// compare equal.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(number) => match number.as_f64() {
            Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => number.to_string(),
        },
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `due_date` and `dueDate` both become `Due Date`.
pub fn humanize_attribute(attr: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in attr.chars() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
