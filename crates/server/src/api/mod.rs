use std::sync::Arc;

use behaviors::{
    lifecycle::changed_attributes, AuditLogReader, BehaviorError, ChangeLogConfig,
    ChangeLogRecorder, EventContext, FilterDefault, GridFilters, GridOrder, GridPagination,
    GridState, LifecycleEvent, MemorySession, Record, RecordLifecycle, Replacement,
    RequestParams,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Actor, TicketId},
    error::{ApiError, ErrorCode},
    protocol::{AuditLogEntry, TicketGridPage, TicketPayload},
};
use storage::{AuditTable, NewTicket, Storage, TicketQuery};
use tracing::info;

use crate::ticket::{TicketRecord, TicketSearch};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub grid: Arc<GridState>,
    pub lifecycle: RecordLifecycle,
    pub audit: AuditLogReader,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateTicketRequest {
    pub title: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub status: Option<i64>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub clear_due_date: bool,
    pub price: Option<f64>,
    pub description: Option<String>,
}

impl ApiContext {
    pub fn new(storage: Storage, audit_table: AuditTable, default_page_size: i64) -> Result<Self, BehaviorError> {
        let grid = GridState::new(
            GridFilters::new("ticketGridFilters", FilterDefault::RecordAttributes)?,
            GridOrder::new("ticketGridOrder")?.with_default("-id"),
            GridPagination::new("ticketGridPage", "ticketGridPageSize")?
                .with_default_page_size(default_page_size),
        );

        let change_log = ChangeLogConfig::default()
            .with_table(audit_table.clone())
            .replace_values(
                "status",
                Replacement::from_pairs([("0", "Open"), ("1", "In progress"), ("2", "Closed")]),
            )
            .date_attributes(["due_date"])
            .currency_attributes(["price"])
            .html_attributes(["description"])
            .ignore(["id"]);
        let recorder = ChangeLogRecorder::new(storage.clone(), change_log)?;

        let mut lifecycle = RecordLifecycle::new();
        lifecycle.register(Arc::new(recorder));

        Ok(Self {
            audit: AuditLogReader::new(storage.clone(), audit_table)?,
            storage,
            grid: Arc::new(grid),
            lifecycle,
        })
    }

    async fn dispatch(
        &self,
        record: &TicketRecord,
        event: LifecycleEvent,
        actor: &Actor,
    ) -> Result<(), ApiError> {
        // Write events never touch grid state, so a throwaway session will do.
        let mut session = MemorySession::new();
        let request = RequestParams::new();
        let mut ctx = EventContext {
            session: &mut session,
            request: &request,
            actor,
        };
        self.lifecycle
            .dispatch(record, &event, &mut ctx)
            .await
            .map_err(behavior_error)
    }
}

/// Captures grid state from the request into `session` and returns the page
/// it selects.
pub async fn list_tickets(
    ctx: &ApiContext,
    session: &mut MemorySession,
    request: &RequestParams,
) -> Result<TicketGridPage, ApiError> {
    let capture = ctx.grid.capture(&TicketSearch, session, request);
    let query = ctx.grid.listing_query(session);

    let ticket_query = TicketQuery {
        filters: query.filters.clone(),
        sort: query.sort.clone(),
        limit: query.page_size,
        offset: query.page.saturating_mul(query.page_size),
    };
    let items = ctx
        .storage
        .list_tickets(&ticket_query)
        .await
        .map_err(internal)?;
    let total = ctx
        .storage
        .count_tickets(&query.filters)
        .await
        .map_err(internal)?;

    Ok(TicketGridPage {
        query,
        filters_changed: capture.filters_changed,
        total,
        items: items
            .into_iter()
            .map(|ticket| TicketRecord(ticket).payload())
            .collect(),
    })
}

pub async fn create_ticket(
    ctx: &ApiContext,
    actor: &Actor,
    req: CreateTicketRequest,
) -> Result<TicketPayload, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "title is required"));
    }
    let ticket_id = ctx
        .storage
        .insert_ticket(&NewTicket {
            title: title.to_string(),
            status: req.status,
            due_date: req.due_date,
            price: req.price,
            description: req.description,
        })
        .await
        .map_err(internal)?;
    let record = load_record(ctx, ticket_id).await?;
    ctx.dispatch(&record, LifecycleEvent::AfterInsert, actor)
        .await?;
    info!(ticket_id = ticket_id.0, actor = actor.username(), "ticket created");
    Ok(record.payload())
}

pub async fn update_ticket(
    ctx: &ApiContext,
    actor: &Actor,
    ticket_id: TicketId,
    req: UpdateTicketRequest,
) -> Result<TicketPayload, ApiError> {
    let before = load_record(ctx, ticket_id).await?;
    let mut ticket = before.0.clone();
    if let Some(title) = req.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::new(ErrorCode::Validation, "title is required"));
        }
        ticket.title = title.to_string();
    }
    if let Some(status) = req.status {
        ticket.status = status;
    }
    if req.clear_due_date {
        ticket.due_date = None;
    } else if let Some(due_date) = req.due_date {
        ticket.due_date = Some(due_date);
    }
    if let Some(price) = req.price {
        ticket.price = price;
    }
    if let Some(description) = req.description {
        ticket.description = description;
    }

    ctx.storage.update_ticket(&ticket).await.map_err(internal)?;
    let after = TicketRecord(ticket);
    let changed = changed_attributes(&before.attributes(), &after.attributes());
    if !changed.is_empty() {
        ctx.dispatch(
            &after,
            LifecycleEvent::AfterUpdate {
                changed_attributes: changed,
            },
            actor,
        )
        .await?;
    }
    Ok(after.payload())
}

pub async fn delete_ticket(
    ctx: &ApiContext,
    actor: &Actor,
    ticket_id: TicketId,
) -> Result<(), ApiError> {
    let record = load_record(ctx, ticket_id).await?;
    ctx.storage
        .delete_ticket(ticket_id)
        .await
        .map_err(internal)?;
    ctx.dispatch(&record, LifecycleEvent::AfterDelete, actor)
        .await?;
    info!(ticket_id = ticket_id.0, actor = actor.username(), "ticket deleted");
    Ok(())
}

pub async fn ticket_logs(
    ctx: &ApiContext,
    ticket_id: TicketId,
    model_id: Option<&str>,
) -> Result<Vec<AuditLogEntry>, ApiError> {
    ctx.audit
        .logs_for(&TicketRecord::reference(ticket_id), model_id)
        .await
        .map_err(behavior_error)
}

async fn load_record(ctx: &ApiContext, ticket_id: TicketId) -> Result<TicketRecord, ApiError> {
    ctx.storage
        .load_ticket(ticket_id)
        .await
        .map_err(internal)?
        .map(TicketRecord)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "ticket not found"))
}

fn behavior_error(err: BehaviorError) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
