use super::*;
use crate::{
    audit::AuditLogReader,
    lifecycle::{LifecycleEvent, RecordLifecycle},
    session::{MemorySession, RequestParams},
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
struct Invoice {
    id: i64,
    attrs: AttributeMap,
    deleted_text: Option<String>,
}

impl Invoice {
    fn new(id: i64) -> Self {
        Self {
            id,
            attrs: AttributeMap::new(),
            deleted_text: None,
        }
    }

    fn with(mut self, attr: &str, value: Value) -> Self {
        self.attrs.insert(attr.to_string(), value);
        self
    }
}

impl Record for Invoice {
    fn model_class(&self) -> &str {
        "billing::Invoice"
    }

    fn primary_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn attributes(&self) -> AttributeMap {
        self.attrs.clone()
    }

    fn deleted_record_text(&self) -> Option<String> {
        self.deleted_text.clone()
    }
}

fn changed(pairs: &[(&str, Value)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn plain_config() -> ChangeLogConfig {
    ChangeLogConfig::default()
        .with_markup(TokenMarkup::plain())
        .with_glue("\n")
}

async fn recorder(config: ChangeLogConfig) -> (ChangeLogRecorder, AuditLogReader) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let reader = AuditLogReader::new(storage.clone(), config.table.clone()).expect("reader");
    (ChangeLogRecorder::new(storage, config).expect("recorder"), reader)
}

#[tokio::test]
async fn insert_writes_new_record_row() {
    let (recorder, reader) = recorder(plain_config()).await;
    let invoice = Invoice::new(7);
    recorder
        .record_insert(&invoice, &Actor::User("maria".into()))
        .await
        .expect("insert");

    let rows = reader.logs_for(&invoice, None).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].log, "New record created.");
    assert_eq!(rows[0].model_class, "billing::Invoice");
    assert_eq!(rows[0].model_id, "7");
    assert_eq!(rows[0].created_by, "maria");
}

#[tokio::test]
async fn update_without_differences_writes_nothing() {
    let (recorder, reader) = recorder(plain_config()).await;
    let invoice = Invoice::new(1).with("status", json!(1)).with("note", json!("a"));

    let written = recorder
        .record_update(&invoice, &AttributeMap::new(), &Actor::System)
        .await
        .expect("update");
    assert!(written.is_none());

    // A type-only difference is not a change.
    let written = recorder
        .record_update(&invoice, &changed(&[("status", json!("1"))]), &Actor::System)
        .await
        .expect("update");
    assert!(written.is_none());
    assert!(reader.logs_for(&invoice, None).await.expect("rows").is_empty());
}

#[tokio::test]
async fn ignored_field_change_writes_nothing() {
    let (recorder, reader) = recorder(plain_config().ignore(["updated_at"])).await;
    let invoice = Invoice::new(1).with("updated_at", json!("2024-01-02 10:00:00"));

    let written = recorder
        .record_update(
            &invoice,
            &changed(&[("updated_at", json!("2024-01-01 10:00:00"))]),
            &Actor::System,
        )
        .await
        .expect("update");
    assert!(written.is_none());
    assert!(reader.logs_for(&invoice, None).await.expect("rows").is_empty());
}

#[tokio::test]
async fn single_change_writes_one_row_with_both_values() {
    let config = plain_config()
        .replace_values("status", Replacement::from_pairs([("1", "Open"), ("2", "Closed")]));
    let (recorder, reader) = recorder(config).await;
    let invoice = Invoice::new(5).with("status", json!(2));

    recorder
        .record_update(&invoice, &changed(&[("status", json!(1))]), &Actor::System)
        .await
        .expect("update")
        .expect("row written");

    let rows = reader.logs_for(&invoice, None).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].log, "Status changed from Open to Closed");
    assert_eq!(rows[0].created_by, "Console");
}

#[tokio::test]
async fn values_equal_after_formatting_are_not_logged() {
    let config = plain_config()
        .currency_attributes(["total"])
        .html_attributes(["notes"]);
    let (recorder, _) = recorder(config).await;
    let invoice = Invoice::new(1)
        .with("total", json!("10.00"))
        .with("notes", json!("<p>Paid  in full</p>"));

    let log = recorder.describe_changes(
        &invoice,
        &changed(&[("total", json!(10)), ("notes", json!("Paid in full"))]),
    );
    assert!(log.is_none());
}

#[tokio::test]
async fn formats_dates_currency_and_empty_values() {
    let config = plain_config()
        .date_attributes(["due_date"])
        .datetime_attributes(["paid_at"])
        .currency_attributes(["total"]);
    let (recorder, _) = recorder(config).await;
    let invoice = Invoice::new(1)
        .with("due_date", json!("2019-07-29"))
        .with("paid_at", json!("2019-06-17 14:05:09"))
        .with("total", json!(1250.5));

    let log = recorder
        .describe_changes(
            &invoice,
            &changed(&[
                ("due_date", json!("2019-06-17")),
                ("paid_at", json!(null)),
                ("total", json!(1000)),
            ]),
        )
        .expect("changes");

    let lines: Vec<_> = log.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Due Date changed from Jun 17, 2019 to Jul 29, 2019",
            "Paid At changed from (empty) to Jun 17, 2019, 2:05:09 PM",
            "Total changed from $1,000.00 to $1,250.50",
        ]
    );
}

#[tokio::test]
async fn zero_reads_as_empty_value() {
    let (recorder, _) = recorder(plain_config()).await;
    let invoice = Invoice::new(1).with("active", json!(1)).with("count", json!(""));

    let log = recorder
        .describe_changes(&invoice, &changed(&[("active", json!(0))]))
        .expect("changes");
    assert_eq!(log, "Active changed from (empty) to 1");

    // `0` and blank render alike, so the change disappears.
    assert!(recorder
        .describe_changes(&invoice, &changed(&[("count", json!("0"))]))
        .is_none());
}

struct CountingInvoice {
    reads: AtomicUsize,
}

impl Record for CountingInvoice {
    fn model_class(&self) -> &str {
        "billing::Invoice"
    }

    fn primary_key(&self) -> Option<String> {
        Some("1".into())
    }

    fn attributes(&self) -> AttributeMap {
        self.reads.fetch_add(1, Ordering::SeqCst);
        AttributeMap::from([
            ("a".to_string(), json!("2")),
            ("b".to_string(), json!("y")),
            ("c".to_string(), json!(3)),
        ])
    }
}

#[tokio::test]
async fn attributes_are_read_once_per_description() {
    let (recorder, _) = recorder(plain_config()).await;
    let invoice = CountingInvoice { reads: AtomicUsize::new(0) };

    let log = recorder
        .describe_changes(
            &invoice,
            &changed(&[("a", json!("1")), ("b", json!("x")), ("c", json!(2))]),
        )
        .expect("changes");
    assert_eq!(log.lines().count(), 3);
    assert_eq!(invoice.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_markup_wraps_every_token() {
    let (recorder, _) = recorder(ChangeLogConfig::default()).await;
    let invoice = Invoice::new(1).with("note", json!("b"));
    let log = recorder
        .describe_changes(&invoice, &changed(&[("note", json!(""))]))
        .expect("changes");
    assert!(log.starts_with(r#"<span class="label label-default label-changed-value">Note</span> changed from"#));
    assert!(log.contains("label-empty-value"));
    assert!(log.ends_with(r#"<span class="label label-default label-changed-value">b</span>"#));
}

#[tokio::test]
async fn computed_replacement_is_built_once_per_log_operation() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let config = plain_config().replace_values(
        "active",
        Replacement::computed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ReplacementTable::from([("0".into(), "No".into()), ("1".into(), "Yes".into())])
        }),
    );
    let (recorder, _) = recorder(config).await;
    let invoice = Invoice::new(1).with("active", json!(true));

    let log = recorder
        .describe_changes(&invoice, &changed(&[("active", json!(0))]))
        .expect("changes");
    assert_eq!(log, "Active changed from No to Yes");
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    recorder.describe_changes(&invoice, &changed(&[("active", json!(0))]));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn surrounding_text_is_joined_with_glue() {
    let config = plain_config()
        .with_glue(" | ")
        .with_text_before(TextSource::computed(|record| {
            format!("Invoice #{}:", record.primary_key().unwrap_or_default())
        }))
        .with_text_after("Reviewed.");
    let (recorder, _) = recorder(config).await;
    let invoice = Invoice::new(9).with("a", json!("2")).with("b", json!("y"));

    let log = recorder
        .describe_changes(&invoice, &changed(&[("a", json!("1")), ("b", json!("x"))]))
        .expect("changes");
    assert_eq!(
        log,
        "Invoice #9: | A changed from 1 to 2 | B changed from x to y | Reviewed."
    );
}

#[tokio::test]
async fn model_id_resolution_prefers_overrides() {
    let invoice = Invoice::new(3).with("number", json!("INV-0003"));

    let (by_key, _) = recorder(plain_config()).await;
    assert_eq!(by_key.resolve_model_id(&invoice), "3");

    let (fixed, _) = recorder(plain_config().with_model_id("batch-1")).await;
    assert_eq!(fixed.resolve_model_id(&invoice), "batch-1");

    let (computed, _) = recorder(plain_config().with_model_id(TextSource::computed(|record| {
        crate::lifecycle::stringify_value(&record.attribute("number"))
    })))
    .await;
    assert_eq!(computed.resolve_model_id(&invoice), "INV-0003");
}

#[tokio::test]
async fn delete_prefers_record_supplied_text() {
    let (recorder, reader) = recorder(plain_config()).await;
    let plain = Invoice::new(1);
    let custom = Invoice {
        deleted_text: Some("Invoice voided by customer request.".into()),
        ..Invoice::new(2)
    };

    recorder.record_delete(&plain, &Actor::System).await.expect("delete");
    recorder.record_delete(&custom, &Actor::System).await.expect("delete");

    assert_eq!(reader.logs_for(&plain, None).await.expect("rows")[0].log, "Record deleted.");
    assert_eq!(
        reader.logs_for(&custom, None).await.expect("rows")[0].log,
        "Invoice voided by customer request."
    );
}

#[tokio::test]
async fn audit_write_failure_is_propagated() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let recorder = ChangeLogRecorder::new(
        storage,
        plain_config().with_table(AuditTable::named("missing_audit")),
    )
    .expect("valid identifiers");

    let err = recorder
        .record_insert(&Invoice::new(1), &Actor::System)
        .await
        .expect_err("table does not exist");
    assert!(matches!(err, BehaviorError::Persistence(_)));
}

#[tokio::test]
async fn invalid_table_name_is_a_configuration_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let result = ChangeLogRecorder::new(
        storage,
        plain_config().with_table(AuditTable::named("audit log")),
    );
    assert!(matches!(result, Err(BehaviorError::Config(_))));
}

#[tokio::test]
async fn recorder_reacts_to_dispatched_lifecycle_events() {
    let (recorder, reader) = recorder(plain_config()).await;
    let mut lifecycle = RecordLifecycle::new();
    lifecycle.register(Arc::new(recorder));

    let mut session = MemorySession::new();
    let request = RequestParams::new();
    let actor = Actor::User("ops".into());
    let mut ctx = EventContext { session: &mut session, request: &request, actor: &actor };

    let invoice = Invoice::new(11).with("status", json!(2));
    lifecycle
        .dispatch(&invoice, &LifecycleEvent::AfterInsert, &mut ctx)
        .await
        .expect("insert");
    lifecycle
        .dispatch(
            &invoice,
            &LifecycleEvent::AfterUpdate { changed_attributes: changed(&[("status", json!(1))]) },
            &mut ctx,
        )
        .await
        .expect("update");
    lifecycle
        .dispatch(&invoice, &LifecycleEvent::AfterDelete, &mut ctx)
        .await
        .expect("delete");

    let logs: Vec<_> = reader
        .logs_for(&invoice, Some(""))
        .await
        .expect("rows")
        .into_iter()
        .map(|row| row.log)
        .collect();
    assert_eq!(
        logs,
        vec!["New record created.", "Status changed from 1 to 2", "Record deleted."]
    );
}
