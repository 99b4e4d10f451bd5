//! Self-contained runs of the maintenance core against an in-memory store:
//! the lifecycle walkthrough behind `maintflow demo` and the concurrent
//! completion run behind `maintflow stress`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::sync::{Semaphore, broadcast};
use tracing::info;

use crate::audit::{AuditEmitter, AuditEvent, BroadcastAuditSink, TracingAuditSink};
use crate::catalog::{InMemoryTemplates, PrivilegedActors};
use crate::checklist::{ChecklistAnswer, ChecklistItem, ChecklistTemplate};
use crate::config::MaintflowConfig;
use crate::error::MaintenanceError;
use crate::service::{CompletionRequest, MaintenanceService};
use crate::signature::{Role, SignerInfo};
use crate::state_machine::{Actor, MaintenanceKind, NewRecord, RecordSnapshot, TemplateId};
use crate::store::RecordStore;

const DEMO_TEMPLATE: &str = "pump-monthly";

/// One step of the walkthrough and what it returned.
#[derive(Debug)]
pub struct Step {
    pub label: String,
    pub outcome: Result<RecordSnapshot, String>,
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub steps: Vec<Step>,
    pub audit: Vec<AuditEvent>,
}

#[derive(Debug, Clone)]
pub struct StressReport {
    pub completed: usize,
    pub distinct_folios: usize,
    pub max_folio: u64,
    pub elapsed: Duration,
}

impl StressReport {
    /// Every completion got its own folio and the sequence has no holes.
    pub fn is_consistent(&self) -> bool {
        self.distinct_folios == self.completed && self.max_folio == self.completed as u64
    }
}

fn demo_templates() -> InMemoryTemplates {
    InMemoryTemplates::new().with_template(ChecklistTemplate::new(
        DEMO_TEMPLATE,
        "Pump monthly inspection",
        vec![
            ChecklistItem::new("seals", "Inspect shaft seals", true),
            ChecklistItem::new("housing", "Clean pump housing", false),
        ],
    ))
}

/// Build a service wired the way `config` describes.
pub fn build_service(config: &MaintflowConfig, audit: AuditEmitter) -> MaintenanceService {
    let store = Arc::new(RecordStore::new(config.store.lock_timeout()));
    MaintenanceService::new(
        store,
        Arc::new(demo_templates()),
        Arc::new(PrivilegedActors::new(["supervisor"])),
    )
    .with_audit(audit)
    .with_completion(config.completion.clone())
}

fn record_step(steps: &mut Vec<Step>, label: &str, result: Result<RecordSnapshot, MaintenanceError>) {
    steps.push(Step {
        label: label.to_string(),
        outcome: result.map_err(|e| e.to_string()),
    });
}

/// Walk one record from creation to forced deletion.
pub async fn run_scenario(config: &MaintflowConfig) -> Result<ScenarioReport> {
    let broadcast = BroadcastAuditSink::new(config.audit.broadcast_capacity);
    let mut events = broadcast.subscribe();
    let audit = AuditEmitter::new()
        .with_timeout(config.audit.emit_timeout())
        .with_sink(Arc::new(TracingAuditSink))
        .with_sink(Arc::new(broadcast));
    let service = build_service(config, audit);

    let tech = Actor::new("tech-01", "Rosa Medina");
    let lead = Actor::new("lead-02", "Tomás Ibarra");
    let mut steps = Vec::new();

    let created = service
        .create_record(
            NewRecord {
                scheduled_date: Utc::now().date_naive(),
                kind: MaintenanceKind::Preventive,
                template_id: Some(TemplateId::from(DEMO_TEMPLATE)),
            },
            &tech,
        )
        .await
        .context("failed to create demo record")?;
    let id = created.id.clone();
    steps.push(Step {
        label: "create".into(),
        outcome: Ok(created),
    });

    let result = service
        .submit_checklist_answer(&id, ChecklistAnswer::new("seals", true), &tech)
        .await;
    record_step(&mut steps, "answer seals", result);

    let result = service
        .add_signature(
            &id,
            Role::Technician,
            SignerInfo::new(&tech.name, b"tech-signature".to_vec()),
            &tech,
        )
        .await;
    record_step(&mut steps, "sign technician", result);

    let result = service
        .complete_record(&id, CompletionRequest::default(), &tech)
        .await;
    record_step(&mut steps, "complete (one signature)", result);

    let result = service
        .add_signature(
            &id,
            Role::Responsible,
            SignerInfo::new(&lead.name, b"lead-signature".to_vec()),
            &lead,
        )
        .await;
    record_step(&mut steps, "sign responsible", result);

    let request = CompletionRequest::default()
        .with_answer(ChecklistAnswer::new("housing", true))
        .with_observations("Seals within tolerance");
    let result = service.complete_record(&id, request, &lead).await;
    record_step(&mut steps, "complete", result);

    let result = service.delete_record(&id, false, &lead).await;
    record_step(&mut steps, "delete", result);

    let result = service.delete_record(&id, true, &lead).await;
    record_step(&mut steps, "delete --force", result);

    let mut audit = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => audit.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                info!(skipped, "audit subscriber lagged");
            }
            Err(_) => break,
        }
    }

    Ok(ScenarioReport { steps, audit })
}

/// Complete `records` records concurrently, at most `workers` at a time, and
/// check the folios they received.
pub async fn run_stress(
    config: &MaintflowConfig,
    records: usize,
    workers: usize,
    on_completed: Arc<dyn Fn() + Send + Sync>,
) -> Result<StressReport> {
    if workers == 0 {
        bail!("workers must be at least 1");
    }
    let service = Arc::new(build_service(config, AuditEmitter::new()));
    let tech = Actor::new("tech-01", "Rosa Medina");

    let mut ids = Vec::with_capacity(records);
    for _ in 0..records {
        let snap = service
            .create_record(
                NewRecord {
                    scheduled_date: Utc::now().date_naive(),
                    kind: MaintenanceKind::Corrective,
                    template_id: Some(TemplateId::from(DEMO_TEMPLATE)),
                },
                &tech,
            )
            .await?;
        service
            .submit_checklist_answer(&snap.id, ChecklistAnswer::new("seals", true), &tech)
            .await?;
        for role in Role::REQUIRED {
            service
                .add_signature(&snap.id, role, SignerInfo::new(&tech.name, b"sig".to_vec()), &tech)
                .await?;
        }
        ids.push(snap.id);
    }

    let started = Instant::now();
    let permits = Arc::new(Semaphore::new(workers));
    let mut handles = Vec::with_capacity(records);
    for id in ids {
        let service = Arc::clone(&service);
        let permits = Arc::clone(&permits);
        let tech = tech.clone();
        let on_completed = Arc::clone(&on_completed);
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let snap = service
                .complete_record(&id, CompletionRequest::default(), &tech)
                .await?;
            on_completed();
            anyhow::Ok(snap)
        }));
    }

    let mut folios = Vec::with_capacity(records);
    for handle in handles {
        let snap = handle.await.context("completion task panicked")??;
        if let Some(folio) = snap.folio {
            folios.push(folio.get());
        }
    }

    let distinct: HashSet<u64> = folios.iter().copied().collect();
    Ok(StressReport {
        completed: folios.len(),
        distinct_folios: distinct.len(),
        max_folio: folios.iter().copied().max().unwrap_or(0),
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::state_machine::Status;

    #[tokio::test]
    async fn scenario_walks_the_full_lifecycle() {
        let report = run_scenario(&MaintflowConfig::default()).await.unwrap();
        let outcome = |label: &str| {
            &report
                .steps
                .iter()
                .find(|s| s.label == label)
                .unwrap()
                .outcome
        };

        assert_eq!(
            outcome("answer seals").as_ref().unwrap().status,
            Status::InProgress
        );
        assert!(outcome("complete (one signature)")
            .as_ref()
            .unwrap_err()
            .contains("RESPONSIBLE"));

        let completed = outcome("complete").as_ref().unwrap();
        assert_eq!(completed.status, Status::Completed);
        assert_eq!(completed.folio.map(|f| f.get()), Some(1));
        assert_eq!(completed.completed_items, 2);

        assert!(outcome("delete").is_err());
        assert!(outcome("delete --force").is_ok());

        let actions: Vec<AuditAction> = report.audit.iter().map(|e| e.action).collect();
        assert_eq!(actions.first(), Some(&AuditAction::Create));
        assert_eq!(actions.last(), Some(&AuditAction::Delete));
        assert!(actions.contains(&AuditAction::Assign));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stress_run_is_consistent() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticks = Arc::clone(&counter);
        let report = run_stress(
            &MaintflowConfig::default(),
            50,
            8,
            Arc::new(move || {
                ticks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }),
        )
        .await
        .unwrap();

        assert_eq!(report.completed, 50);
        assert!(report.is_consistent());
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 50);
    }

    #[tokio::test]
    async fn stress_rejects_zero_workers() {
        let result = run_stress(&MaintflowConfig::default(), 1, 0, Arc::new(|| {})).await;
        assert!(result.is_err());
    }
}
