//! Boundary to the synchronous statement-execution path.
//!
//! Bulk sessions never run ad-hoc SQL themselves. Anything that does, such as
//! printing a load job's error tables, goes through a [`StatementExecutor`].

use crate::codec::Value;
use crate::error::StatementError;
use async_trait::async_trait;
use tracing::warn;

/// Engine error code for a missing object.
pub const OBJECT_DOES_NOT_EXIST: i32 = 3807;

/// Result set of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Runs one SQL statement and returns its rows.
#[async_trait]
pub trait StatementExecutor: Send {
    async fn query(&mut self, sql: &str) -> Result<StatementRows, StatementError>;
}

/// Policy for statement errors: raise immediately, or keep going and
/// surface them later.
#[derive(Debug, Default)]
pub struct DeferredStatementErrors {
    panic: bool,
    pending: Vec<StatementError>,
}

impl DeferredStatementErrors {
    /// `panic = true` raises every error as soon as it is recorded.
    pub fn new(panic: bool) -> Self {
        Self {
            panic,
            pending: Vec::new(),
        }
    }

    pub fn panics(&self) -> bool {
        self.panic
    }

    /// Pass a statement result through the policy.
    ///
    /// A deferred error is logged and kept; the caller gets `Ok(None)`.
    pub fn record<T>(
        &mut self,
        result: Result<T, StatementError>,
    ) -> Result<Option<T>, StatementError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.panic => Err(e),
            Err(e) => {
                warn!(code = e.code, message = %e.message, "statement failed, continuing");
                self.pending.push(e);
                Ok(None)
            }
        }
    }

    /// Raise the oldest deferred error, if any.
    pub fn check(&mut self) -> Result<(), StatementError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        Err(self.pending.remove(0))
    }

    pub fn pending(&self) -> &[StatementError] {
        &self.pending
    }

    pub fn take(&mut self) -> Vec<StatementError> {
        std::mem::take(&mut self.pending)
    }
}
