//! In-memory, transactional storage for maintenance records.
//!
//! A [`RecordRow`] is a record together with its checklist responses and
//! signatures; the row is the unit of mutual exclusion. The lifecycle of a
//! write is:
//!
//! 1. [`RecordStore::begin`] locks the row and hands out a [`RecordTx`]
//!    holding a working copy.
//! 2. The caller mutates the working copy.
//! 3. [`RecordStore::commit`] writes the copy back, or
//!    [`RecordStore::remove`] deletes the row.
//!
//! Dropping a `RecordTx` without committing discards every change made
//! through it and releases the row lock.
//!
//! Readers never take the row lock. Each slot publishes its last committed
//! row through a `watch` channel that only `commit` and `remove` update.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tracing::debug;

use crate::checklist::ChecklistResponses;
use crate::error::{MaintenanceError, Missing, StoreError};
use crate::folio::FolioSequencer;
use crate::signature::SignatureLedger;
use crate::state_machine::{MaintenanceRecord, RecordId, Status};

/// A record and the child rows it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub record: MaintenanceRecord,
    #[serde(default)]
    pub responses: ChecklistResponses,
    #[serde(default)]
    pub signatures: SignatureLedger,
}

impl RecordRow {
    pub fn new(record: MaintenanceRecord) -> Self {
        Self {
            record,
            responses: ChecklistResponses::default(),
            signatures: SignatureLedger::default(),
        }
    }
}

struct RowSlot {
    writer: Arc<Mutex<()>>,
    // `None` marks a row deleted while others were queued on its lock.
    committed: watch::Sender<Option<RecordRow>>,
}

type Slot = Arc<RowSlot>;

fn new_slot(row: RecordRow) -> Slot {
    let (committed, _) = watch::channel(Some(row));
    Arc::new(RowSlot {
        writer: Arc::new(Mutex::new(())),
        committed,
    })
}

/// An open write transaction on one record row.
pub struct RecordTx {
    _guard: OwnedMutexGuard<()>,
    slot: Slot,
    row: RecordRow,
}

impl RecordTx {
    pub fn record(&self) -> &MaintenanceRecord {
        &self.row.record
    }

    pub fn record_mut(&mut self) -> &mut MaintenanceRecord {
        &mut self.row.record
    }

    pub fn responses(&self) -> &ChecklistResponses {
        &self.row.responses
    }

    pub fn responses_mut(&mut self) -> &mut ChecklistResponses {
        &mut self.row.responses
    }

    pub fn signatures(&self) -> &SignatureLedger {
        &self.row.signatures
    }

    pub fn signatures_mut(&mut self) -> &mut SignatureLedger {
        &mut self.row.signatures
    }
}

impl fmt::Debug for RecordTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordTx")
            .field("row", &self.row)
            .finish_non_exhaustive()
    }
}

pub struct RecordStore {
    rows: RwLock<HashMap<RecordId, Slot>>,
    folios: FolioSequencer,
    lock_timeout: Duration,
}

impl RecordStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            folios: FolioSequencer::new(),
            lock_timeout,
        }
    }

    /// Build a store from existing rows, resuming the folio sequence after
    /// the largest folio found. Only COMPLETED rows may carry a folio.
    pub fn with_rows(
        rows: impl IntoIterator<Item = RecordRow>,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut seen = HashSet::new();
        let mut map = HashMap::new();
        let mut high_water = 0;
        for row in rows {
            if let Some(folio) = row.record.folio {
                if row.record.status != Status::Completed {
                    return Err(StoreError::FolioOnActiveRecord {
                        record: row.record.id.clone(),
                        folio,
                    });
                }
                if !seen.insert(folio) {
                    return Err(StoreError::DuplicateFolio(folio));
                }
                high_water = high_water.max(folio.get());
            }
            let id = row.record.id.clone();
            if map.insert(id.clone(), new_slot(row)).is_some() {
                return Err(StoreError::AlreadyExists(id));
            }
        }
        Ok(Self {
            rows: RwLock::new(map),
            folios: FolioSequencer::starting_after(high_water),
            lock_timeout,
        })
    }

    pub fn folios(&self) -> &FolioSequencer {
        &self.folios
    }

    pub async fn insert(&self, record: MaintenanceRecord) -> Result<RecordRow, StoreError> {
        let row = RecordRow::new(record);
        let mut rows = self.rows.write().await;
        if rows.contains_key(&row.record.id) {
            return Err(StoreError::AlreadyExists(row.record.id.clone()));
        }
        rows.insert(row.record.id.clone(), new_slot(row.clone()));
        Ok(row)
    }

    async fn slot(&self, id: &RecordId) -> Result<Slot, MaintenanceError> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MaintenanceError::NotFound(Missing::Record(id.clone())))
    }

    /// Lock the row for update and open a transaction on it.
    pub async fn begin(&self, id: &RecordId) -> Result<RecordTx, MaintenanceError> {
        let slot = self.slot(id).await?;
        let guard = tokio::time::timeout(self.lock_timeout, Arc::clone(&slot.writer).lock_owned())
            .await
            .map_err(|_| {
                MaintenanceError::Storage(StoreError::Timeout {
                    record: id.clone(),
                    waited_ms: self.lock_timeout.as_millis() as u64,
                })
            })?;
        let row = slot
            .committed
            .borrow()
            .clone()
            .ok_or_else(|| MaintenanceError::NotFound(Missing::Record(id.clone())))?;
        Ok(RecordTx {
            _guard: guard,
            slot,
            row,
        })
    }

    /// Make every change in `tx` visible and release the row.
    pub fn commit(&self, tx: RecordTx) -> RecordRow {
        let RecordTx {
            _guard,
            slot,
            mut row,
        } = tx;
        row.record.updated_at = Utc::now();
        slot.committed.send_replace(Some(row.clone()));
        row
    }

    /// Discard `tx`. Equivalent to dropping it.
    pub fn abort(&self, tx: RecordTx) {
        debug!(record = %tx.record().id, "transaction aborted");
    }

    /// Delete the row held by `tx`, children included. Returns the row as it
    /// stood in the transaction.
    pub async fn remove(&self, tx: RecordTx) -> RecordRow {
        let RecordTx { _guard, slot, row } = tx;
        slot.committed.send_replace(None);
        self.rows.write().await.remove(&row.record.id);
        row
    }

    /// Read the last committed row. Never waits on an open transaction.
    pub async fn get(&self, id: &RecordId) -> Result<RecordRow, MaintenanceError> {
        let slot = self.slot(id).await?;
        let row = slot.committed.borrow().clone();
        row.ok_or_else(|| MaintenanceError::NotFound(Missing::Record(id.clone())))
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}
