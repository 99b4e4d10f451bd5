use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::Status;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Opaque, immutable identity of a maintenance record.
    RecordId
);
string_id!(TemplateId);
string_id!(ItemId);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Permanent sequence number stamped on a record once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folio(u64);

impl Folio {
    /// Folios start at 1; zero is never a valid folio.
    pub fn new(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceKind {
    Preventive,
    Corrective,
}

impl fmt::Display for MaintenanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceKind::Preventive => write!(f, "PREVENTIVE"),
            MaintenanceKind::Corrective => write!(f, "CORRECTIVE"),
        }
    }
}

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Input for creating a record; supplied by the planning side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub scheduled_date: NaiveDate,
    pub kind: MaintenanceKind,
    pub template_id: Option<TemplateId>,
}

/// A scheduled maintenance task and its lifecycle fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: RecordId,
    pub scheduled_date: NaiveDate,
    pub kind: MaintenanceKind,
    pub status: Status,
    pub template_id: Option<TemplateId>,
    pub folio: Option<Folio>,
    pub completed_at: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub completion_override_by: Option<String>,
    pub completion_override_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceRecord {
    pub fn new(draft: NewRecord) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            scheduled_date: draft.scheduled_date,
            kind: draft.kind,
            status: Status::Pending,
            template_id: draft.template_id,
            folio: None,
            completed_at: None,
            observations: None,
            completion_override_by: None,
            completion_override_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable label used in audit events.
    pub fn label(&self) -> String {
        let kind = match self.kind {
            MaintenanceKind::Preventive => "Preventive",
            MaintenanceKind::Corrective => "Corrective",
        };
        match self.folio {
            Some(folio) => format!(
                "{kind} maintenance due {} (folio {folio})",
                self.scheduled_date
            ),
            None => format!("{kind} maintenance due {}", self.scheduled_date),
        }
    }

    /// Marks an edit made by a privileged actor after completion.
    pub fn stamp_override(&mut self, actor: &Actor, at: DateTime<Utc>) {
        self.completion_override_by = Some(actor.id.clone());
        self.completion_override_at = Some(at);
    }
}

/// The state returned to callers after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub id: RecordId,
    pub kind: MaintenanceKind,
    pub scheduled_date: NaiveDate,
    pub status: Status,
    pub folio: Option<Folio>,
    pub completed_at: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub completion_override_by: Option<String>,
    pub total_items: usize,
    pub completed_items: usize,
    pub signatures_present: usize,
}

impl RecordSnapshot {
    pub fn new(
        record: &MaintenanceRecord,
        total_items: usize,
        completed_items: usize,
        signatures_present: usize,
    ) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            scheduled_date: record.scheduled_date,
            status: record.status,
            folio: record.folio,
            completed_at: record.completed_at,
            observations: record.observations.clone(),
            completion_override_by: record.completion_override_by.clone(),
            total_items,
            completed_items,
            signatures_present,
        }
    }
}
