//! Job completion codes and transfer summaries.

use std::fmt;

/// Completion code reported by the engine when a job terminates.
///
/// Anything other than `Success` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionCode {
    Success,
    Warning,
    UserError,
    Fatal,
    NoMessageDestination,
    Other(u16),
}

impl CompletionCode {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CompletionCode::Success,
            4 => CompletionCode::Warning,
            8 => CompletionCode::UserError,
            12 => CompletionCode::Fatal,
            16 => CompletionCode::NoMessageDestination,
            n => CompletionCode::Other(n),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            CompletionCode::Success => 0,
            CompletionCode::Warning => 4,
            CompletionCode::UserError => 8,
            CompletionCode::Fatal => 12,
            CompletionCode::NoMessageDestination => 16,
            CompletionCode::Other(n) => *n,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == CompletionCode::Success
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompletionCode::Success => "success",
            CompletionCode::Warning => "warning",
            CompletionCode::UserError => "user error",
            CompletionCode::Fatal => "fatal error",
            CompletionCode::NoMessageDestination => "no message destination",
            CompletionCode::Other(_) => "unrecognized",
        };
        write!(f, "{} ({})", self.code(), label)
    }
}

/// Outcome of a closed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    /// `None` if the session ended without the engine reporting a code
    pub code: Option<CompletionCode>,
    pub buffers: u64,
    /// Rows received (export) or accepted by the engine (load)
    pub rows: u64,
    /// Rows refused, locally or by the engine
    pub rejected: u64,
}

/// Running load totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub accepted: u64,
    pub rejected: u64,
}
