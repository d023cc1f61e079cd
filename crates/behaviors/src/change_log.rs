//! Audit trail of record changes.
//!
//! [`ChangeLogRecorder`] listens to insert, update and delete events and
//! appends one human-readable row per event to the audit table. Updates are
//! described field by field as `«label» changed from «old» to «new»`, after
//! value replacement and display formatting; an update whose fields are all
//! ignored or format to identical text writes nothing.

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{Actor, AuditRowId};
use storage::{AuditTable, NewAuditRow, Storage};
use tracing::debug;

use crate::{
    error::{BehaviorError, BehaviorResult},
    format::{strip_html, ValueFormatter},
    lifecycle::{stringify_value, AttributeMap, EventContext, Record, RecordListener},
};

type RecordTextFn = dyn Fn(&dyn Record) -> String + Send + Sync;
type ReplacementFn = dyn Fn() -> ReplacementTable + Send + Sync;

pub type ReplacementTable = HashMap<String, String>;

/// Text that is either fixed or computed from the record being logged.
#[derive(Clone)]
pub enum TextSource {
    Static(String),
    Computed(Arc<RecordTextFn>),
}

impl TextSource {
    pub fn computed(f: impl Fn(&dyn Record) -> String + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, record: &dyn Record) -> String {
        match self {
            TextSource::Static(text) => text.clone(),
            TextSource::Computed(f) => f(record),
        }
    }
}

impl From<&str> for TextSource {
    fn from(value: &str) -> Self {
        Self::Static(value.to_string())
    }
}

impl From<String> for TextSource {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

impl fmt::Debug for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSource::Static(text) => f.debug_tuple("Static").field(text).finish(),
            TextSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Display values substituted for raw attribute values, e.g. `1` → `Yes`.
#[derive(Clone)]
pub enum Replacement {
    Static(ReplacementTable),
    /// Built on demand, at most once per logged event.
    Computed(Arc<ReplacementFn>),
}

impl Replacement {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Static(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn computed(f: impl Fn() -> ReplacementTable + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self) -> Cow<'_, ReplacementTable> {
        match self {
            Replacement::Static(table) => Cow::Borrowed(table),
            Replacement::Computed(f) => Cow::Owned(f()),
        }
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Static(table) => f.debug_tuple("Static").field(table).finish(),
            Replacement::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Markup wrapped around the label, old value and new value of a change line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMarkup {
    pub label_open: String,
    pub label_close: String,
    pub old_open: String,
    pub old_close: String,
    pub new_open: String,
    pub new_close: String,
    /// Rendered in place of an empty value.
    pub empty_value: String,
}

impl Default for TokenMarkup {
    fn default() -> Self {
        let open = r#"<span class="label label-default label-changed-value">"#;
        Self {
            label_open: open.into(),
            label_close: "</span>".into(),
            old_open: open.into(),
            old_close: "</span>".into(),
            new_open: open.into(),
            new_close: "</span>".into(),
            empty_value: r#"<span class="label label-default label-empty-value"><i>empty</i></span>"#
                .into(),
        }
    }
}

impl TokenMarkup {
    /// No wrappers at all; empty values read `(empty)`.
    pub fn plain() -> Self {
        Self {
            label_open: String::new(),
            label_close: String::new(),
            old_open: String::new(),
            old_close: String::new(),
            new_open: String::new(),
            new_close: String::new(),
            empty_value: "(empty)".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeLogConfig {
    pub table: AuditTable,
    pub text_new_record: String,
    pub text_deleted_record: String,
    pub text_changed_from: String,
    pub text_changed_to: String,
    pub glue: String,
    pub text_before_changes: Option<TextSource>,
    pub text_after_changes: Option<TextSource>,
    /// Overrides the primary key as the logged model id.
    pub model_id_value: Option<TextSource>,
    pub values_replacement: HashMap<String, Replacement>,
    pub date_attributes: HashSet<String>,
    pub datetime_attributes: HashSet<String>,
    pub currency_attributes: HashSet<String>,
    pub html_attributes: HashSet<String>,
    pub ignored_attributes: HashSet<String>,
    pub markup: TokenMarkup,
    pub formatter: ValueFormatter,
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self {
            table: AuditTable::default(),
            text_new_record: "New record created.".into(),
            text_deleted_record: "Record deleted.".into(),
            text_changed_from: "changed from".into(),
            text_changed_to: "to".into(),
            glue: "<br>".into(),
            text_before_changes: None,
            text_after_changes: None,
            model_id_value: None,
            values_replacement: HashMap::new(),
            date_attributes: HashSet::new(),
            datetime_attributes: HashSet::new(),
            currency_attributes: HashSet::new(),
            html_attributes: HashSet::new(),
            ignored_attributes: HashSet::new(),
            markup: TokenMarkup::default(),
            formatter: ValueFormatter::default(),
        }
    }
}

fn name_set<I, S>(names: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

impl ChangeLogConfig {
    pub fn with_table(mut self, table: AuditTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_glue(mut self, glue: impl Into<String>) -> Self {
        self.glue = glue.into();
        self
    }

    pub fn with_markup(mut self, markup: TokenMarkup) -> Self {
        self.markup = markup;
        self
    }

    pub fn with_formatter(mut self, formatter: ValueFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_text_before(mut self, text: impl Into<TextSource>) -> Self {
        self.text_before_changes = Some(text.into());
        self
    }

    pub fn with_text_after(mut self, text: impl Into<TextSource>) -> Self {
        self.text_after_changes = Some(text.into());
        self
    }

    pub fn with_model_id(mut self, value: impl Into<TextSource>) -> Self {
        self.model_id_value = Some(value.into());
        self
    }

    pub fn replace_values(mut self, attr: impl Into<String>, replacement: Replacement) -> Self {
        self.values_replacement.insert(attr.into(), replacement);
        self
    }

    pub fn date_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_attributes = name_set(attrs);
        self
    }

    pub fn datetime_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datetime_attributes = name_set(attrs);
        self
    }

    pub fn currency_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currency_attributes = name_set(attrs);
        self
    }

    pub fn html_attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.html_attributes = name_set(attrs);
        self
    }

    pub fn ignore<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_attributes = name_set(attrs);
        self
    }
}

#[derive(Clone)]
pub struct ChangeLogRecorder {
    storage: Storage,
    config: ChangeLogConfig,
}

impl ChangeLogRecorder {
    pub fn new(storage: Storage, config: ChangeLogConfig) -> BehaviorResult<Self> {
        config
            .table
            .validate()
            .map_err(|e| BehaviorError::config(e.to_string()))?;
        Ok(Self { storage, config })
    }

    pub fn config(&self) -> &ChangeLogConfig {
        &self.config
    }

    /// Static override, then computed override, then the primary key.
    pub fn resolve_model_id(&self, record: &dyn Record) -> String {
        match &self.config.model_id_value {
            Some(source) => source.resolve(record),
            None => record.primary_key().unwrap_or_default(),
        }
    }

    pub async fn record_insert(
        &self,
        record: &dyn Record,
        actor: &Actor,
    ) -> BehaviorResult<AuditRowId> {
        self.write(record, actor, self.config.text_new_record.clone())
            .await
    }

    /// Returns `None` when nothing changed materially and no row was written.
    pub async fn record_update(
        &self,
        record: &dyn Record,
        changed_attributes: &AttributeMap,
        actor: &Actor,
    ) -> BehaviorResult<Option<AuditRowId>> {
        let Some(log) = self.describe_changes(record, changed_attributes) else {
            debug!(
                model_class = record.model_class(),
                "no material changes, audit row skipped"
            );
            return Ok(None);
        };
        self.write(record, actor, log).await.map(Some)
    }

    pub async fn record_delete(
        &self,
        record: &dyn Record,
        actor: &Actor,
    ) -> BehaviorResult<AuditRowId> {
        let log = record
            .deleted_record_text()
            .unwrap_or_else(|| self.config.text_deleted_record.clone());
        self.write(record, actor, log).await
    }

    /// Renders the update description, or `None` when no attribute changed
    /// after formatting.
    pub fn describe_changes(
        &self,
        record: &dyn Record,
        changed_attributes: &AttributeMap,
    ) -> Option<String> {
        let config = &self.config;
        let mut tables: HashMap<&str, Cow<'_, ReplacementTable>> = HashMap::new();
        let current = record.attributes();
        let mut lines = Vec::new();

        for (attr, old_value) in changed_attributes {
            if config.ignored_attributes.contains(attr) {
                continue;
            }

            let mut old = stringify_value(old_value);
            let mut new = current.get(attr).map(stringify_value).unwrap_or_default();
            if old == new {
                continue;
            }

            if let Some(replacement) = config.values_replacement.get(attr) {
                let table = tables
                    .entry(attr.as_str())
                    .or_insert_with(|| replacement.resolve());
                old = table.get(&old).cloned().unwrap_or(old);
                new = table.get(&new).cloned().unwrap_or(new);
            }

            if config.date_attributes.contains(attr) {
                old = format_if_dashed(&old, |v| config.formatter.format_date(v));
                new = format_if_dashed(&new, |v| config.formatter.format_date(v));
            }
            if config.datetime_attributes.contains(attr) {
                old = format_if_dashed(&old, |v| config.formatter.format_datetime(v));
                new = format_if_dashed(&new, |v| config.formatter.format_datetime(v));
            }
            if config.currency_attributes.contains(attr) {
                old = config.formatter.format_currency(&old);
                new = config.formatter.format_currency(&new);
            }
            if config.html_attributes.contains(attr) {
                old = strip_html(&old);
                new = strip_html(&new);
            }

            let old = self.display_value(&old);
            let new = self.display_value(&new);
            if old != new {
                lines.push(self.render_line(&record.attribute_label(attr), &old, &new));
            }
        }

        if lines.is_empty() {
            return None;
        }

        let mut parts = Vec::with_capacity(lines.len() + 2);
        if let Some(before) = &config.text_before_changes {
            let text = before.resolve(record);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.extend(lines);
        if let Some(after) = &config.text_after_changes {
            let text = after.resolve(record);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        Some(parts.join(&config.glue))
    }

    /// Blank values and a bare `0` read as empty.
    fn display_value(&self, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() || value == "0" {
            self.config.markup.empty_value.clone()
        } else {
            value.to_string()
        }
    }

    fn render_line(&self, label: &str, old: &str, new: &str) -> String {
        let m = &self.config.markup;
        format!(
            "{}{label}{} {} {}{old}{} {} {}{new}{}",
            m.label_open,
            m.label_close,
            self.config.text_changed_from,
            m.old_open,
            m.old_close,
            self.config.text_changed_to,
            m.new_open,
            m.new_close,
        )
    }

    async fn write(&self, record: &dyn Record, actor: &Actor, log: String) -> BehaviorResult<AuditRowId> {
        let row = NewAuditRow {
            model_class: record.model_class().to_string(),
            model_id: self.resolve_model_id(record),
            log,
            created_by: actor.username().to_string(),
            created_at: Utc::now(),
        };
        self.storage
            .insert_audit_row(&self.config.table, &row)
            .await
            .map_err(BehaviorError::Persistence)
    }
}

/// Date values are only reformatted when they look like `YYYY-MM-DD...`.
fn format_if_dashed(value: &str, format: impl Fn(&str) -> String) -> String {
    if value.contains('-') {
        format(value)
    } else {
        value.to_string()
    }
}

#[async_trait]
impl RecordListener for ChangeLogRecorder {
    async fn after_insert(&self, record: &dyn Record, ctx: &EventContext<'_>) -> BehaviorResult<()> {
        self.record_insert(record, ctx.actor).await.map(|_| ())
    }

    async fn after_update(
        &self,
        record: &dyn Record,
        changed_attributes: &AttributeMap,
        ctx: &EventContext<'_>,
    ) -> BehaviorResult<()> {
        self.record_update(record, changed_attributes, ctx.actor)
            .await
            .map(|_| ())
    }

    async fn after_delete(&self, record: &dyn Record, ctx: &EventContext<'_>) -> BehaviorResult<()> {
        self.record_delete(record, ctx.actor).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "tests/change_log_tests.rs"]
mod tests;
