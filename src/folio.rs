//! Globally unique, monotonically increasing folio numbers.
//!
//! The sequencer is a single counter behind one lock. A folio can only be
//! taken with an open [`RecordTx`], and it is written into that
//! transaction's record while the counter lock is held, so the value never
//! exists outside the transaction that persists it.

use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;
use crate::state_machine::Folio;
use crate::store::RecordTx;

/// Outcome of [`FolioSequencer::assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub folio: Folio,
    /// `false` when the record already carried a folio.
    pub fresh: bool,
}

#[derive(Debug, Default)]
pub struct FolioSequencer {
    high_water: Mutex<u64>,
}

impl FolioSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequencer whose next folio is `high_water + 1`.
    pub fn starting_after(high_water: u64) -> Self {
        Self {
            high_water: Mutex::new(high_water),
        }
    }

    /// Give the transaction's record a folio unless it already has one.
    ///
    /// Folios are never reassigned. If the transaction is later aborted the
    /// value is skipped, never handed out twice.
    pub async fn assign(&self, tx: &mut RecordTx) -> Result<Assignment, StoreError> {
        if let Some(folio) = tx.record().folio {
            return Ok(Assignment {
                folio,
                fresh: false,
            });
        }

        let mut high_water = self.high_water.lock().await;
        let folio = high_water
            .checked_add(1)
            .and_then(Folio::new)
            .ok_or(StoreError::FolioExhausted)?;
        tx.record_mut().folio = Some(folio);
        *high_water = folio.get();
        drop(high_water);

        info!(record = %tx.record().id, %folio, "folio assigned");
        Ok(Assignment { folio, fresh: true })
    }

    /// The largest folio handed out so far (0 if none).
    pub async fn high_water(&self) -> u64 {
        *self.high_water.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{MaintenanceKind, MaintenanceRecord, NewRecord};
    use crate::store::RecordStore;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn new_record() -> MaintenanceRecord {
        MaintenanceRecord::new(NewRecord {
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            kind: MaintenanceKind::Preventive,
            template_id: None,
        })
    }

    #[tokio::test]
    async fn folios_increase_from_one() {
        let store = RecordStore::new(Duration::from_secs(1));
        let a = store.insert(new_record()).await.unwrap().record.id;
        let b = store.insert(new_record()).await.unwrap().record.id;

        let mut tx = store.begin(&a).await.unwrap();
        let first = store.folios().assign(&mut tx).await.unwrap();
        store.commit(tx);

        let mut tx = store.begin(&b).await.unwrap();
        let second = store.folios().assign(&mut tx).await.unwrap();
        store.commit(tx);

        assert_eq!(first.folio.get(), 1);
        assert_eq!(second.folio.get(), 2);
        assert!(first.fresh && second.fresh);
        assert_eq!(store.folios().high_water().await, 2);
    }

    #[tokio::test]
    async fn existing_folio_is_never_reassigned() {
        let store = RecordStore::new(Duration::from_secs(1));
        let id = store.insert(new_record()).await.unwrap().record.id;

        let mut tx = store.begin(&id).await.unwrap();
        let first = store.folios().assign(&mut tx).await.unwrap();
        let again = store.folios().assign(&mut tx).await.unwrap();
        store.commit(tx);

        assert_eq!(first.folio, again.folio);
        assert!(!again.fresh);
        assert_eq!(store.folios().high_water().await, 1);
    }

    #[tokio::test]
    async fn aborted_assignment_leaves_a_gap_not_a_duplicate() {
        let store = RecordStore::new(Duration::from_secs(1));
        let a = store.insert(new_record()).await.unwrap().record.id;
        let b = store.insert(new_record()).await.unwrap().record.id;

        let mut tx = store.begin(&a).await.unwrap();
        store.folios().assign(&mut tx).await.unwrap();
        drop(tx);
        assert!(store.get(&a).await.unwrap().record.folio.is_none());

        let mut tx = store.begin(&b).await.unwrap();
        let assigned = store.folios().assign(&mut tx).await.unwrap();
        store.commit(tx);
        assert_eq!(assigned.folio.get(), 2);
    }

    #[tokio::test]
    async fn sequencer_resumes_after_high_water() {
        let sequencer = FolioSequencer::starting_after(41);
        let store = RecordStore::new(Duration::from_secs(1));
        let id = store.insert(new_record()).await.unwrap().record.id;

        let mut tx = store.begin(&id).await.unwrap();
        let assigned = sequencer.assign(&mut tx).await.unwrap();
        assert_eq!(assigned.folio.get(), 42);
    }

    #[tokio::test]
    async fn exhausted_sequence_is_an_error() {
        let sequencer = FolioSequencer::starting_after(u64::MAX);
        let store = RecordStore::new(Duration::from_secs(1));
        let id = store.insert(new_record()).await.unwrap().record.id;

        let mut tx = store.begin(&id).await.unwrap();
        let err = sequencer.assign(&mut tx).await.unwrap_err();
        assert!(matches!(err, StoreError::FolioExhausted));
        assert!(tx.record().folio.is_none());
    }
}
