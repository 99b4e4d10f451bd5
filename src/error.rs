use std::fmt;

use thiserror::Error;

use crate::signature::Role;
use crate::state_machine::{Folio, ItemId, RecordId, TemplateId};

/// Errors returned by every maintenance operation.
///
/// All variants are terminal for the request that produced them; nothing in
/// the core retries on its own.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("{0} not found")]
    NotFound(Missing),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(Requirement),

    #[error("Forbidden: {0}")]
    Forbidden(ForbiddenReason),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MaintenanceError {
    /// Returns `true` when the caller may resubmit the same request as is.
    pub fn is_transient(&self) -> bool {
        matches!(self, MaintenanceError::Storage(StoreError::Timeout { .. }))
    }
}

/// What a `NotFound` error failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Record(RecordId),
    Item(ItemId),
    Signature(Role),
    Template(TemplateId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Record(id) => write!(f, "Maintenance record {id}"),
            Missing::Item(id) => write!(f, "Checklist item {id}"),
            Missing::Signature(role) => write!(f, "{role} signature"),
            Missing::Template(id) => write!(f, "Checklist template {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// The role already holds a signature; replacing it requires remove-then-add.
    SignatureExists(Role),
    AlreadyCompleted,
    AlreadyCancelled,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::SignatureExists(role) => {
                write!(f, "record already carries a {role} signature")
            }
            ConflictKind::AlreadyCompleted => write!(f, "record is already completed"),
            ConflictKind::AlreadyCancelled => write!(f, "record is already cancelled"),
        }
    }
}

/// The first completion requirement found unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    MissingSignature(Role),
    NoCompletedItems,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::MissingSignature(role) => write!(f, "missing {role} signature"),
            Requirement::NoCompletedItems => {
                write!(f, "at least one checklist item must be completed")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// Mutation of a completed record by an actor without override rights.
    RecordCompleted,
    RecordCancelled,
    /// Deleting a completed record needs `force`.
    ForceRequired,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenReason::RecordCompleted => write!(f, "record is completed"),
            ForbiddenReason::RecordCancelled => write!(f, "record is cancelled"),
            ForbiddenReason::ForceRequired => {
                write!(f, "completed records can only be deleted with force")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Timed out after {waited_ms}ms waiting for the lock on record {record}")]
    Timeout { record: RecordId, waited_ms: u64 },

    #[error("Record already exists: {0}")]
    AlreadyExists(RecordId),

    #[error("Folio {0} is held by more than one record")]
    DuplicateFolio(Folio),

    #[error("Folio sequence exhausted")]
    FolioExhausted,

    #[error("Record {record} holds folio {folio} but is not completed")]
    FolioOnActiveRecord { record: RecordId, folio: Folio },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink {sink} rejected event: {message}")]
    Rejected { sink: String, message: String },

    #[error("Failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_unmet_requirement() {
        let err = MaintenanceError::PreconditionFailed(Requirement::MissingSignature(
            Role::Responsible,
        ));
        assert_eq!(
            err.to_string(),
            "Precondition failed: missing RESPONSIBLE signature"
        );

        let err = MaintenanceError::NotFound(Missing::Item(ItemId::from("oil-level")));
        assert_eq!(err.to_string(), "Checklist item oil-level not found");
    }

    #[test]
    fn only_lock_timeouts_are_transient() {
        let timeout = MaintenanceError::Storage(StoreError::Timeout {
            record: RecordId::from("r-1"),
            waited_ms: 10,
        });
        assert!(timeout.is_transient());
        assert!(!MaintenanceError::Conflict(ConflictKind::AlreadyCompleted).is_transient());
    }
}
