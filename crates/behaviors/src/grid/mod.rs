//! Grid state (filters, sort order, pagination) kept in the user's session
//! between requests.

mod filters;
mod order;
mod pagination;
mod state;

pub use filters::{FilterCapture, FilterDefault, GridFilters};
pub use order::GridOrder;
pub use pagination::GridPagination;
pub use state::{GridCapture, GridState};

use crate::error::{BehaviorError, BehaviorResult};

fn require_key(value: String, setting: &str) -> BehaviorResult<String> {
    if value.trim().is_empty() {
        return Err(BehaviorError::config(format!(
            "`{setting}` must be configured for this behavior"
        )));
    }
    Ok(value)
}

#[cfg(test)]
#[path = "../tests/grid_tests.rs"]
mod tests;
