//! Bulk transfer sessions.
//!
//! A session owns one transport and walks the lifecycle in [`SessionState`]:
//! configure attributes, initiate the job, set a statement (export) or
//! target table (load), exchange buffers, then close. Closing reports the
//! job's [`CompletionCode`] through a [`JobSummary`].

mod completion;
mod export;
mod lifecycle;
mod load;
mod state;
pub mod statement;

pub use completion::{CompletionCode, JobSummary, LoadSummary};
pub use lifecycle::BulkSession;
pub use export::{normalize_statement, ExportSession};
pub use load::{ErrorTables, LoadSession, PutOutcome};
pub use state::SessionState;
pub use statement::{DeferredStatementErrors, StatementExecutor, StatementRows};
