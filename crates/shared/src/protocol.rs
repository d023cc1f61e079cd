use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AuditRowId, FilterSet, SortPair, TicketId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditRowId,
    pub model_class: String,
    pub model_id: String,
    pub log: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Paging, sorting and filtering handed to the listing query layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub page: i64,
    pub page_size: i64,
    pub sort: Vec<SortPair>,
    pub filters: FilterSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    pub ticket_id: TicketId,
    pub title: String,
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGridPage {
    pub query: ListingQuery,
    pub filters_changed: bool,
    pub total: i64,
    pub items: Vec<TicketPayload>,
}
