use std::collections::HashMap;

use behaviors::MemorySession;
use shared::domain::SessionValue;
use storage::Storage;
use tower_sessions::{cookie::time::Duration, session, Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

/// Session record entry holding every grid store value of the visitor.
pub(crate) const GRID_STATE_KEY: &str = "grid_state";

/// Session store sharing the application's SQLite pool. Creates its table on
/// first use.
pub(crate) async fn session_store(storage: &Storage) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::new(storage.pool().clone());
    store.migrate().await?;
    Ok(store)
}

pub(crate) fn session_layer(
    store: SqliteStore,
    cookie_name: &str,
    idle_minutes: i64,
) -> SessionManagerLayer<SqliteStore> {
    SessionManagerLayer::new(store)
        .with_name(cookie_name.to_string())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(idle_minutes.max(1))))
}

/// Grid entries of the current session record, empty for a new visitor.
pub(crate) async fn load_grid_session(session: &Session) -> Result<MemorySession, session::Error> {
    let entries = session
        .get::<HashMap<String, SessionValue>>(GRID_STATE_KEY)
        .await?
        .unwrap_or_default();
    Ok(MemorySession::from_entries(entries))
}

/// Writes the grid entries back only when a store changed them.
pub(crate) async fn store_grid_session(
    session: &Session,
    grid: &MemorySession,
) -> Result<(), session::Error> {
    if grid.is_dirty() {
        session.insert(GRID_STATE_KEY, grid.entries()).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
