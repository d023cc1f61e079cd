//! Record lifecycle behaviors: grid state kept in the user's session and an
//! audit trail of field-level record changes.

pub mod audit;
pub mod change_log;
pub mod error;
pub mod format;
pub mod grid;
pub mod lifecycle;
pub mod session;

pub use audit::AuditLogReader;
pub use change_log::{ChangeLogConfig, ChangeLogRecorder, Replacement, TextSource, TokenMarkup};
pub use error::{BehaviorError, BehaviorResult};
pub use format::ValueFormatter;
pub use grid::{
    FilterCapture, FilterDefault, GridCapture, GridFilters, GridOrder, GridPagination, GridState,
};
pub use lifecycle::{EventContext, LifecycleEvent, Record, RecordLifecycle, RecordListener};
pub use session::{MemorySession, RequestParams, SessionStorage};
