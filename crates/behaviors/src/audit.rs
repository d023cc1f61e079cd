use shared::protocol::AuditLogEntry;
use storage::{AuditTable, Storage};

use crate::{
    error::{BehaviorError, BehaviorResult},
    lifecycle::Record,
};

/// Reads back the audit trail written by the change log recorder.
#[derive(Clone)]
pub struct AuditLogReader {
    storage: Storage,
    table: AuditTable,
}

impl AuditLogReader {
    pub fn new(storage: Storage, table: AuditTable) -> BehaviorResult<Self> {
        table
            .validate()
            .map_err(|e| BehaviorError::config(e.to_string()))?;
        Ok(Self { storage, table })
    }

    /// Rows for `record`, oldest first; same-second rows keep insertion
    /// order. An absent or empty `model_id` means the record's primary key.
    pub async fn logs_for(
        &self,
        record: &dyn Record,
        model_id: Option<&str>,
    ) -> BehaviorResult<Vec<AuditLogEntry>> {
        let model_id = model_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| record.primary_key())
            .unwrap_or_default();
        self.storage
            .list_audit_rows(&self.table, record.model_class(), &model_id)
            .await
            .map_err(BehaviorError::Persistence)
    }
}
