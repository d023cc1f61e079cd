use behaviors::{lifecycle::AttributeMap, Record};
use serde_json::{json, Value};
use shared::{domain::TicketId, protocol::TicketPayload};
use storage::StoredTicket;

pub(crate) const TICKET_CLASS: &str = "helpdesk::Ticket";

/// A ticket row seen through the record lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct TicketRecord(pub(crate) StoredTicket);

impl TicketRecord {
    /// A record carrying only the key, for looking up the audit trail of
    /// tickets that may already be deleted.
    pub(crate) fn reference(ticket_id: TicketId) -> Self {
        Self(StoredTicket {
            ticket_id,
            title: String::new(),
            status: 0,
            due_date: None,
            price: 0.0,
            description: String::new(),
        })
    }

    pub(crate) fn payload(&self) -> TicketPayload {
        let t = &self.0;
        TicketPayload {
            ticket_id: t.ticket_id,
            title: t.title.clone(),
            status: t.status,
            due_date: t.due_date,
            price: t.price,
            description: t.description.clone(),
        }
    }
}

impl Record for TicketRecord {
    fn model_class(&self) -> &str {
        TICKET_CLASS
    }

    fn primary_key(&self) -> Option<String> {
        Some(self.0.ticket_id.0.to_string())
    }

    fn attributes(&self) -> AttributeMap {
        let t = &self.0;
        AttributeMap::from([
            ("id".to_string(), json!(t.ticket_id.0)),
            ("title".to_string(), json!(t.title)),
            ("status".to_string(), json!(t.status)),
            (
                "due_date".to_string(),
                t.due_date
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null),
            ),
            ("price".to_string(), json!(t.price)),
            ("description".to_string(), json!(t.description)),
        ])
    }

    fn attribute_label(&self, attr: &str) -> String {
        match attr {
            "due_date" => "Due".to_string(),
            "description" => "Details".to_string(),
            other => behaviors::lifecycle::humanize_attribute(other),
        }
    }
}

/// Search model backing the tickets grid. Its empty attributes seed the
/// remembered filters of a fresh session.
pub(crate) struct TicketSearch;

impl Record for TicketSearch {
    fn model_class(&self) -> &str {
        TICKET_CLASS
    }

    fn primary_key(&self) -> Option<String> {
        None
    }

    fn attributes(&self) -> AttributeMap {
        ["title", "status", "due_date"]
            .into_iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect()
    }
}
