use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::MaintenanceRecord;
use crate::error::{ConflictKind, ForbiddenReason, MaintenanceError};

/// The four states of a maintenance record.
///
/// Normal flow: PENDING → IN_PROGRESS → COMPLETED. CANCELLED is reachable from
/// the two active states. COMPLETED and CANCELLED are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "PENDING"),
            Status::InProgress => write!(f, "IN_PROGRESS"),
            Status::Completed => write!(f, "COMPLETED"),
            Status::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Something that happened to a record which may move its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A checklist answer or a signature was recorded.
    Activity,
    /// The last signature was removed.
    SignaturesCleared,
    Complete { at: DateTime<Utc> },
    Cancel { at: DateTime<Utc> },
}

/// The result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The event was accepted but the status did not change.
    Stay(Status),
    Moved { from: Status, to: Status },
}

impl Transition {
    pub fn status(&self) -> Status {
        match self {
            Transition::Stay(status) => *status,
            Transition::Moved { to, .. } => *to,
        }
    }
}

/// Drives a `MaintenanceRecord` through its lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Check whether `event` may be applied to a record in `status` without
    /// touching the record.
    pub fn check(status: Status, event: &Event) -> Result<(), MaintenanceError> {
        match (status, event) {
            (Status::Completed, Event::Complete { .. }) => {
                Err(MaintenanceError::Conflict(ConflictKind::AlreadyCompleted))
            }
            (Status::Cancelled, Event::Cancel { .. }) => {
                Err(MaintenanceError::Conflict(ConflictKind::AlreadyCancelled))
            }
            (Status::Completed, _) => Err(MaintenanceError::Forbidden(
                ForbiddenReason::RecordCompleted,
            )),
            (Status::Cancelled, _) => Err(MaintenanceError::Forbidden(
                ForbiddenReason::RecordCancelled,
            )),
            _ => Ok(()),
        }
    }

    /// Apply `event` to `record`, returning the transition taken.
    ///
    /// - `Activity` moves PENDING to IN_PROGRESS; on IN_PROGRESS it is a no-op.
    /// - `SignaturesCleared` moves IN_PROGRESS back to PENDING.
    /// - `Complete` moves either active state to COMPLETED and stamps
    ///   `completed_at`. Folio assignment is not part of this step.
    /// - `Cancel` moves either active state to CANCELLED.
    ///
    /// Terminal states reject every event and the record is left untouched.
    pub fn apply(
        record: &mut MaintenanceRecord,
        event: Event,
    ) -> Result<Transition, MaintenanceError> {
        Self::check(record.status, &event)?;

        let from = record.status;
        let to = match (from, event) {
            (Status::Pending, Event::Activity) => Status::InProgress,
            (Status::InProgress, Event::SignaturesCleared) => Status::Pending,
            (_, Event::Complete { at }) => {
                record.completed_at = Some(at);
                Status::Completed
            }
            (_, Event::Cancel { at }) => {
                record.cancelled_at = Some(at);
                Status::Cancelled
            }
            (status, _) => status,
        };

        if to == from {
            return Ok(Transition::Stay(from));
        }
        record.status = to;
        Ok(Transition::Moved { from, to })
    }
}
