//! Session lifecycle states.

use std::fmt;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No attributes yet
    Created,

    /// Attributes set, not yet initiated
    Configured,

    /// Job started on the engine
    Initiated,

    /// Statement or target set, schema available
    SchemaReady,

    /// Buffers are being exchanged
    Transferring,

    /// Session is closed
    Closed,

    /// Session hit an unrecoverable error
    Failed,
}

impl SessionState {
    /// Check if the engine-side job is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Initiated | SessionState::SchemaReady | SessionState::Transferring
        )
    }

    /// Check if buffers may be exchanged.
    pub fn can_transfer(&self) -> bool {
        matches!(self, SessionState::SchemaReady | SessionState::Transferring)
    }

    /// Check if a statement or target may be set.
    pub fn can_set_schema(&self) -> bool {
        matches!(self, SessionState::Initiated | SessionState::SchemaReady)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "Created",
            SessionState::Configured => "Configured",
            SessionState::Initiated => "Initiated",
            SessionState::SchemaReady => "SchemaReady",
            SessionState::Transferring => "Transferring",
            SessionState::Closed => "Closed",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!SessionState::Configured.is_active());
        assert!(SessionState::Initiated.is_active());
        assert!(SessionState::Transferring.is_active());
        assert!(!SessionState::Closed.is_active());

        assert!(SessionState::SchemaReady.can_transfer());
        assert!(!SessionState::Initiated.can_transfer());

        assert!(SessionState::SchemaReady.can_set_schema());
        assert!(!SessionState::Transferring.can_set_schema());

        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Created.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::SchemaReady.to_string(), "SchemaReady");
        assert_eq!(SessionState::Failed.to_string(), "Failed");
    }
}
