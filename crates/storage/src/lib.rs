use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{AuditRowId, FilterSet, SortPair, TicketId},
    protocol::AuditLogEntry,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Table and column names of the audit log. Every name is configurable so the
/// recorder can write into an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTable {
    pub table: String,
    pub id_column: String,
    pub model_class_column: String,
    pub model_id_column: String,
    pub log_column: String,
    pub created_by_column: String,
    pub created_at_column: String,
}

impl Default for AuditTable {
    fn default() -> Self {
        Self {
            table: "log_active_record".into(),
            id_column: "id".into(),
            model_class_column: "model_class".into(),
            model_id_column: "model_id".into(),
            log_column: "log".into(),
            created_by_column: "created_by".into(),
            created_at_column: "created_at".into(),
        }
    }
}

impl AuditTable {
    pub fn named(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for name in [
            &self.table,
            &self.id_column,
            &self.model_class_column,
            &self.model_id_column,
            &self.log_column,
            &self.created_by_column,
            &self.created_at_column,
        ] {
            if !is_identifier(name) {
                bail!("invalid audit table identifier '{name}'");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditRow {
    pub model_class: String,
    pub model_id: String,
    pub log: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTicket {
    pub ticket_id: TicketId,
    pub title: String,
    pub status: i64,
    pub due_date: Option<NaiveDate>,
    pub price: f64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub status: i64,
    pub due_date: Option<NaiveDate>,
    pub price: f64,
    pub description: String,
}

/// Listing parameters for the tickets grid. Unknown filter or sort fields
/// are ignored.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub filters: FilterSet,
    pub sort: Vec<SortPair>,
    pub limit: i64,
    pub offset: i64,
}

const TICKET_SORT_COLUMNS: &[&str] = &["id", "title", "status", "due_date", "price"];

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_audit_row(&self, table: &AuditTable, row: &NewAuditRow) -> Result<AuditRowId> {
        table.validate()?;
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?) RETURNING {}",
            table.table,
            table.model_class_column,
            table.model_id_column,
            table.log_column,
            table.created_by_column,
            table.created_at_column,
            table.id_column,
        );
        let rec = sqlx::query(&sql)
            .bind(&row.model_class)
            .bind(&row.model_id)
            .bind(&row.log)
            .bind(&row.created_by)
            .bind(row.created_at.format(TIMESTAMP_FORMAT).to_string())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to insert audit row into '{}'", table.table))?;
        let id = AuditRowId(rec.get::<i64, _>(0));
        debug!(table = %table.table, model_class = %row.model_class, model_id = %row.model_id, id = id.0, "audit row written");
        Ok(id)
    }

    pub async fn list_audit_rows(
        &self,
        table: &AuditTable,
        model_class: &str,
        model_id: &str,
    ) -> Result<Vec<AuditLogEntry>> {
        table.validate()?;
        let sql = format!(
            "SELECT {id}, {class}, {mid}, {log}, {by}, {at}
             FROM {table}
             WHERE {class} = ? AND {mid} = ?
             ORDER BY {at} ASC, {id} ASC",
            id = table.id_column,
            class = table.model_class_column,
            mid = table.model_id_column,
            log = table.log_column,
            by = table.created_by_column,
            at = table.created_at_column,
            table = table.table,
        );
        let rows = sqlx::query(&sql)
            .bind(model_class)
            .bind(model_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to read audit rows from '{}'", table.table))?;

        rows.into_iter()
            .map(|r| {
                let raw_created_at = r.get::<String, _>(5);
                Ok(AuditLogEntry {
                    id: AuditRowId(r.get::<i64, _>(0)),
                    model_class: r.get::<String, _>(1),
                    model_id: r.get::<String, _>(2),
                    log: r.get::<String, _>(3),
                    created_by: r.get::<String, _>(4),
                    created_at: parse_timestamp(&raw_created_at)?,
                })
            })
            .collect()
    }

    pub async fn insert_ticket(&self, ticket: &NewTicket) -> Result<TicketId> {
        let rec = sqlx::query(
            "INSERT INTO tickets (title, status, due_date, price, description)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&ticket.title)
        .bind(ticket.status)
        .bind(ticket.due_date)
        .bind(ticket.price)
        .bind(&ticket.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(TicketId(rec.get::<i64, _>(0)))
    }

    pub async fn load_ticket(&self, ticket_id: TicketId) -> Result<Option<StoredTicket>> {
        let row = sqlx::query(
            "SELECT id, title, status, due_date, price, description FROM tickets WHERE id = ?",
        )
        .bind(ticket_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ticket_from_row(&r)))
    }

    pub async fn update_ticket(&self, ticket: &StoredTicket) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tickets SET title = ?, status = ?, due_date = ?, price = ?, description = ?
             WHERE id = ?",
        )
        .bind(&ticket.title)
        .bind(ticket.status)
        .bind(ticket.due_date)
        .bind(ticket.price)
        .bind(&ticket.description)
        .bind(ticket.ticket_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_ticket(&self, ticket_id: TicketId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = ?")
            .bind(ticket_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_tickets(&self, query: &TicketQuery) -> Result<Vec<StoredTicket>> {
        let (where_sql, binds) = ticket_filter_clause(&query.filters);

        let mut order_terms = query
            .sort
            .iter()
            .filter(|pair| TICKET_SORT_COLUMNS.contains(&pair.field.as_str()))
            .map(|pair| format!("{} {}", pair.field, pair.direction.as_sql()))
            .collect::<Vec<_>>();
        order_terms.push("id ASC".to_string());

        let sql = format!(
            "SELECT id, title, status, due_date, price, description FROM tickets{where_sql}
             ORDER BY {} LIMIT ? OFFSET ?",
            order_terms.join(", ")
        );
        let mut stmt = sqlx::query(&sql);
        for value in &binds {
            stmt = stmt.bind(value.as_str());
        }
        let rows = stmt
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(ticket_from_row).collect())
    }

    pub async fn count_tickets(&self, filters: &FilterSet) -> Result<i64> {
        let (where_sql, binds) = ticket_filter_clause(filters);
        let sql = format!("SELECT COUNT(*) FROM tickets{where_sql}");
        let mut stmt = sqlx::query_scalar::<_, i64>(&sql);
        for value in &binds {
            stmt = stmt.bind(value.as_str());
        }
        Ok(stmt.fetch_one(&self.pool).await?)
    }
}

fn ticket_from_row(r: &SqliteRow) -> StoredTicket {
    StoredTicket {
        ticket_id: TicketId(r.get::<i64, _>(0)),
        title: r.get::<String, _>(1),
        status: r.get::<i64, _>(2),
        due_date: r.get::<Option<NaiveDate>, _>(3),
        price: r.get::<f64, _>(4),
        description: r.get::<String, _>(5),
    }
}

/// Builds the WHERE clause for the tickets grid. Blank filter values mean
/// "no filter", as an empty grid filter input does.
fn ticket_filter_clause(filters: &FilterSet) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    for (field, value) in filters {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match field.as_str() {
            "title" | "description" => {
                clauses.push(format!("{field} LIKE ?"));
                binds.push(format!("%{value}%"));
            }
            "id" | "status" | "due_date" => {
                clauses.push(format!("CAST({field} AS TEXT) = ?"));
                binds.push(value.to_string());
            }
            _ => {}
        }
    }
    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("invalid audit timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
