//! Transactional orchestration of maintenance-record operations.
//!
//! Every operation follows the same shape: lock the record row through
//! [`RecordStore::begin`], check preconditions, mutate the working copy,
//! run status changes through [`StateMachine`], commit, then emit audit
//! events. Any error before commit drops the transaction and leaves the row
//! as it was.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditAction, AuditEmitter, AuditEvent, EntityType};
use crate::catalog::{PrivilegePolicy, TemplateCatalog};
use crate::checklist::{ChecklistAnswer, ChecklistTemplate, Upsert};
use crate::config::CompletionConfig;
use crate::error::{ForbiddenReason, MaintenanceError, Missing, Requirement};
use crate::folio::Assignment;
use crate::signature::{Role, SignerInfo};
use crate::state_machine::{
    Actor, Event, ItemId, MaintenanceRecord, NewRecord, RecordId, RecordSnapshot, StateMachine,
    Status, Transition,
};
use crate::store::{RecordRow, RecordStore, RecordTx};

/// Input to an explicit completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub observations: Option<String>,
    /// Answers persisted in the same transaction before the checks run.
    #[serde(default)]
    pub pending_answers: Vec<ChecklistAnswer>,
}

impl CompletionRequest {
    pub fn with_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }

    pub fn with_answer(mut self, answer: ChecklistAnswer) -> Self {
        self.pending_answers.push(answer);
        self
    }
}

struct Completion {
    from: Status,
    assignment: Assignment,
}

pub struct MaintenanceService {
    store: Arc<RecordStore>,
    templates: Arc<dyn TemplateCatalog>,
    privileges: Arc<dyn PrivilegePolicy>,
    audit: AuditEmitter,
    completion: CompletionConfig,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<RecordStore>,
        templates: Arc<dyn TemplateCatalog>,
        privileges: Arc<dyn PrivilegePolicy>,
    ) -> Self {
        Self {
            store,
            templates,
            privileges,
            audit: AuditEmitter::new(),
            completion: CompletionConfig::default(),
        }
    }

    pub fn with_audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_completion(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Create a PENDING record.
    #[instrument(skip_all, fields(actor = %actor.id))]
    pub async fn create_record(
        &self,
        draft: NewRecord,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let record = MaintenanceRecord::new(draft);
        let template = self.template_for(&record).await?;
        let row = self.store.insert(record).await?;
        info!(record = %row.record.id, "record created");

        let record = &row.record;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Create,
                EntityType::MaintenanceRecord,
                record.id.as_str(),
                record.label(),
                json!({
                    "kind": record.kind,
                    "scheduled_date": record.scheduled_date,
                    "template_id": record.template_id,
                }),
            ))
            .await;

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Read the committed state of a record.
    pub async fn get_record(&self, record_id: &RecordId) -> Result<RecordSnapshot, MaintenanceError> {
        let row = self.store.get(record_id).await?;
        let template = self.template_for(&row.record).await?;
        Ok(snapshot(&row, template.as_deref()))
    }

    /// Record the answer for one checklist item.
    ///
    /// Moves PENDING to IN_PROGRESS. When the answer completes the last item
    /// of the record's template the record is completed through the same
    /// path as [`complete_record`](Self::complete_record), folio included.
    /// That path does not look at signatures unless
    /// `auto_complete_requires_signatures` is set.
    ///
    /// A privileged actor may answer on a COMPLETED record: the answer is
    /// stored, the override marker is stamped and the status stays.
    #[instrument(skip_all, fields(record = %record_id, item = %answer.item_id, actor = %actor.id))]
    pub async fn submit_checklist_answer(
        &self,
        record_id: &RecordId,
        answer: ChecklistAnswer,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let mut tx = self.store.begin(record_id).await?;
        let template = self.template_for(tx.record()).await?;
        ensure_item(template.as_deref(), &answer.item_id)?;
        let overriding = self.override_allowed(tx.record(), actor)?;

        let now = Utc::now();
        let upsert = tx.responses_mut().upsert(&answer, actor, now);

        let mut completion = None;
        let transition = if overriding {
            tx.record_mut().stamp_override(actor, now);
            Transition::Stay(Status::Completed)
        } else {
            let transition = StateMachine::apply(tx.record_mut(), Event::Activity)?;
            if let Some(template) = &template {
                completion = self.auto_complete(&mut tx, template, now).await?;
            }
            transition
        };

        let row = self.store.commit(tx);
        log_transition(&transition);

        self.announce_answer(&row.record, actor, &answer, upsert, overriding)
            .await;
        if let Some(completion) = &completion {
            self.announce_completion(&row, actor, completion, "checklist")
                .await;
        }

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Attach a signature for `role`.
    #[instrument(skip_all, fields(record = %record_id, role = %role, actor = %actor.id))]
    pub async fn add_signature(
        &self,
        record_id: &RecordId,
        role: Role,
        signer: SignerInfo,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        signer.validate()?;

        let mut tx = self.store.begin(record_id).await?;
        let template = self.template_for(tx.record()).await?;
        let overriding = self.override_allowed(tx.record(), actor)?;

        let now = Utc::now();
        let signature = tx.signatures_mut().insert(role, signer, actor, now)?;
        let details = json!({
            "role": role,
            "signer_name": signature.signer_name,
            "signer_title": signature.signer_title,
            "override": overriding,
        });

        let mut completion = None;
        let transition = if overriding {
            tx.record_mut().stamp_override(actor, now);
            Transition::Stay(Status::Completed)
        } else {
            let transition = StateMachine::apply(tx.record_mut(), Event::Activity)?;
            // Signatures only gate auto-completion when the paths are unified.
            if self.completion.auto_complete_requires_signatures
                && let Some(template) = &template
            {
                completion = self.auto_complete(&mut tx, template, now).await?;
            }
            transition
        };

        let row = self.store.commit(tx);
        log_transition(&transition);

        let record = &row.record;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Sign,
                EntityType::Signature,
                format!("{}:{role}", record.id),
                record.label(),
                details,
            ))
            .await;
        if let Some(completion) = &completion {
            self.announce_completion(&row, actor, completion, "signature")
                .await;
        }

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Remove the signature for `role`. With no signatures left the record
    /// returns to PENDING whatever its checklist progress.
    #[instrument(skip_all, fields(record = %record_id, role = %role, actor = %actor.id))]
    pub async fn remove_signature(
        &self,
        record_id: &RecordId,
        role: Role,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let mut tx = self.store.begin(record_id).await?;
        StateMachine::check(tx.record().status, &Event::SignaturesCleared)?;
        let template = self.template_for(tx.record()).await?;

        let removed = tx.signatures_mut().remove(role)?;
        let transition = if tx.signatures().is_empty() {
            StateMachine::apply(tx.record_mut(), Event::SignaturesCleared)?
        } else {
            Transition::Stay(tx.record().status)
        };

        let row = self.store.commit(tx);
        log_transition(&transition);

        let record = &row.record;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Delete,
                EntityType::Signature,
                format!("{}:{role}", record.id),
                record.label(),
                json!({
                    "role": role,
                    "signer_name": removed.signer_name,
                    "status": transition.status(),
                }),
            ))
            .await;

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Explicitly complete a record.
    ///
    /// Requires a TECHNICIAN and a RESPONSIBLE signature and at least one
    /// completed checklist response, checked in that order after the
    /// request's pending answers are persisted. Assigns a folio if the record
    /// has none.
    #[instrument(skip_all, fields(record = %record_id, actor = %actor.id))]
    pub async fn complete_record(
        &self,
        record_id: &RecordId,
        request: CompletionRequest,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let now = Utc::now();
        let mut tx = self.store.begin(record_id).await?;
        StateMachine::check(tx.record().status, &Event::Complete { at: now })?;
        let template = self.template_for(tx.record()).await?;

        for answer in &request.pending_answers {
            ensure_item(template.as_deref(), &answer.item_id)?;
        }
        let upserts: Vec<Upsert> = request
            .pending_answers
            .iter()
            .map(|answer| tx.responses_mut().upsert(answer, actor, now))
            .collect();

        if let Some(role) = tx.signatures().first_missing() {
            return Err(MaintenanceError::PreconditionFailed(
                Requirement::MissingSignature(role),
            ));
        }
        if !tx.responses().any_completed() {
            return Err(MaintenanceError::PreconditionFailed(
                Requirement::NoCompletedItems,
            ));
        }

        let observations = request
            .observations
            .filter(|text| !text.trim().is_empty());
        let completion = self.finish(&mut tx, observations, now).await?;
        let row = self.store.commit(tx);
        log_transition(&Transition::Moved {
            from: completion.from,
            to: Status::Completed,
        });

        for (answer, upsert) in request.pending_answers.iter().zip(upserts) {
            self.announce_answer(&row.record, actor, answer, upsert, false)
                .await;
        }
        self.announce_completion(&row, actor, &completion, "explicit")
            .await;

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Cancel an active record. CANCELLED is terminal.
    #[instrument(skip_all, fields(record = %record_id, actor = %actor.id))]
    pub async fn cancel_record(
        &self,
        record_id: &RecordId,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let mut tx = self.store.begin(record_id).await?;
        let template = self.template_for(tx.record()).await?;
        let transition = StateMachine::apply(tx.record_mut(), Event::Cancel { at: Utc::now() })?;

        let row = self.store.commit(tx);
        log_transition(&transition);

        let record = &row.record;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Cancel,
                EntityType::MaintenanceRecord,
                record.id.as_str(),
                record.label(),
                json!({ "reason": reason }),
            ))
            .await;

        Ok(snapshot(&row, template.as_deref()))
    }

    /// Delete a record with its responses and signatures. A COMPLETED
    /// record needs `force`. Returns the record as it was before removal.
    #[instrument(skip_all, fields(record = %record_id, force = force, actor = %actor.id))]
    pub async fn delete_record(
        &self,
        record_id: &RecordId,
        force: bool,
        actor: &Actor,
    ) -> Result<RecordSnapshot, MaintenanceError> {
        let tx = self.store.begin(record_id).await?;
        if tx.record().status == Status::Completed && !force {
            return Err(MaintenanceError::Forbidden(ForbiddenReason::ForceRequired));
        }
        // Counts are informational here; a vanished template must not block deletion.
        let template = self.template_for(tx.record()).await.unwrap_or_else(|e| {
            warn!(error = %e, "template lookup failed during delete");
            None
        });

        let row = self.store.remove(tx).await;
        info!(folio = ?row.record.folio, "record deleted");

        let record = &row.record;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Delete,
                EntityType::MaintenanceRecord,
                record.id.as_str(),
                record.label(),
                json!({
                    "forced": force,
                    "status": record.status,
                    "folio": record.folio,
                    "responses": row.responses.len(),
                    "signatures": row.signatures.len(),
                }),
            ))
            .await;

        Ok(snapshot(&row, template.as_deref()))
    }

    async fn template_for(
        &self,
        record: &MaintenanceRecord,
    ) -> Result<Option<Arc<ChecklistTemplate>>, MaintenanceError> {
        let Some(id) = &record.template_id else {
            return Ok(None);
        };
        let template = self
            .templates
            .template(id)
            .await?
            .ok_or_else(|| MaintenanceError::NotFound(Missing::Template(id.clone())))?;
        Ok(Some(template))
    }

    /// `Ok(true)` when `actor` is editing a COMPLETED record under override,
    /// `Ok(false)` for an ordinary edit of an active record.
    fn override_allowed(
        &self,
        record: &MaintenanceRecord,
        actor: &Actor,
    ) -> Result<bool, MaintenanceError> {
        match record.status {
            Status::Completed if self.privileges.is_privileged(actor) => Ok(true),
            status => StateMachine::check(status, &Event::Activity).map(|()| false),
        }
    }

    /// Complete the record when every template item is done. The count is
    /// taken from the transaction's response set after the caller's write.
    async fn auto_complete(
        &self,
        tx: &mut RecordTx,
        template: &ChecklistTemplate,
        at: DateTime<Utc>,
    ) -> Result<Option<Completion>, MaintenanceError> {
        let total = template.total_items();
        let done = tx.responses().completed_count(template);
        if total == 0 || done < total || tx.record().status == Status::Completed {
            return Ok(None);
        }
        if self.completion.auto_complete_requires_signatures
            && let Some(role) = tx.signatures().first_missing()
        {
            debug!(%role, "checklist complete, waiting for signature");
            return Ok(None);
        }
        self.finish(tx, None, at).await.map(Some)
    }

    /// The single completion path: status, timestamp, observations, folio.
    async fn finish(
        &self,
        tx: &mut RecordTx,
        observations: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Completion, MaintenanceError> {
        let from = tx.record().status;
        StateMachine::apply(tx.record_mut(), Event::Complete { at })?;
        if observations.is_some() {
            tx.record_mut().observations = observations;
        }
        let assignment = self.store.folios().assign(tx).await?;
        Ok(Completion { from, assignment })
    }

    async fn announce_answer(
        &self,
        record: &MaintenanceRecord,
        actor: &Actor,
        answer: &ChecklistAnswer,
        upsert: Upsert,
        overriding: bool,
    ) {
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Update,
                EntityType::ChecklistResponse,
                format!("{}:{}", record.id, answer.item_id),
                record.label(),
                json!({
                    "item_id": answer.item_id,
                    "completed": answer.completed,
                    "comment": answer.comment,
                    "created": upsert == Upsert::Inserted,
                    "status": record.status,
                    "override": overriding,
                }),
            ))
            .await;
    }

    async fn announce_completion(
        &self,
        row: &RecordRow,
        actor: &Actor,
        completion: &Completion,
        trigger: &str,
    ) {
        let record = &row.record;
        let folio = completion.assignment.folio;
        self.audit
            .emit(AuditEvent::new(
                actor,
                AuditAction::Complete,
                EntityType::MaintenanceRecord,
                record.id.as_str(),
                record.label(),
                json!({
                    "trigger": trigger,
                    "from": completion.from,
                    "folio": folio,
                    "completed_at": record.completed_at,
                    "observations": record.observations,
                    "signatures": row.signatures.len(),
                }),
            ))
            .await;
        if completion.assignment.fresh {
            self.audit
                .emit(AuditEvent::new(
                    actor,
                    AuditAction::Assign,
                    EntityType::MaintenanceRecord,
                    record.id.as_str(),
                    record.label(),
                    json!({ "field": "folio", "folio": folio }),
                ))
                .await;
        }
    }
}

fn ensure_item(template: Option<&ChecklistTemplate>, item: &ItemId) -> Result<(), MaintenanceError> {
    match template {
        Some(template) if !template.contains(item) => {
            Err(MaintenanceError::NotFound(Missing::Item(item.clone())))
        }
        _ => Ok(()),
    }
}

fn log_transition(transition: &Transition) {
    match transition {
        Transition::Moved { from, to } => info!(%from, %to, "status changed"),
        Transition::Stay(status) => debug!(%status, "status unchanged"),
    }
}

fn snapshot(row: &RecordRow, template: Option<&ChecklistTemplate>) -> RecordSnapshot {
    let (total, completed) = match template {
        Some(template) => (
            template.total_items(),
            row.responses.completed_count(template),
        ),
        None => (0, row.responses.completed_total()),
    };
    RecordSnapshot::new(&row.record, total, completed, row.signatures.len())
}
