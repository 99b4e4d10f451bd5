mod record;
mod state;

pub use record::{
    Actor, Folio, ItemId, MaintenanceKind, MaintenanceRecord, NewRecord, RecordId, RecordSnapshot,
    TemplateId,
};
pub use state::{Event, StateMachine, Status, Transition};
