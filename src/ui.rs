//! Interface de terminal do maintflow: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso do teste de carga e
//! `console` para estilização com cores. O [`Terminal`] imprime cada passo
//! do cenário de demonstração e a trilha de auditoria.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::AuditEvent;
use crate::state_machine::{RecordSnapshot, Status};

/// Saída colorida para os passos de uma operação.
pub struct Terminal {
    // Estilo verde para sucesso e registros concluídos.
    green: Style,
    // Estilo vermelho para erros.
    red: Style,
    // Estilo amarelo para registros em andamento.
    yellow: Style,
    // Estilo apagado para detalhes secundários.
    dim: Style,
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    fn status_style(&self, status: Status) -> &Style {
        match status {
            Status::Completed => &self.green,
            Status::Cancelled => &self.red,
            Status::InProgress => &self.yellow,
            Status::Pending => &self.dim,
        }
    }

    /// Exibe um passo bem-sucedido com o snapshot resultante.
    pub fn step_ok(&self, label: &str, snapshot: &RecordSnapshot) {
        let folio = snapshot
            .folio
            .map(|f| format!(" folio={f}"))
            .unwrap_or_default();
        println!(
            "  {} {label}: {}{folio} {}",
            self.green.apply_to("✓"),
            self.status_style(snapshot.status).apply_to(snapshot.status),
            self.dim.apply_to(format!(
                "(items {}/{}, signatures {})",
                snapshot.completed_items, snapshot.total_items, snapshot.signatures_present
            ))
        );
    }

    /// Exibe um passo recusado com a mensagem de erro.
    pub fn step_err(&self, label: &str, message: &str) {
        println!("  {} {label}: {message}", self.red.apply_to("✗"));
    }

    /// Imprime a trilha de auditoria, um evento por linha.
    pub fn print_audit(&self, events: &[AuditEvent]) {
        println!();
        println!("{}", self.green.apply_to("─── Audit Trail ───"));
        for event in events {
            println!(
                "  {:<8} {} {}",
                event.action,
                event.label,
                self.dim.apply_to(event.details.to_string())
            );
        }
    }

    pub fn summary(&self, ok: bool, message: &str) {
        let style = if ok { &self.green } else { &self.red };
        println!();
        println!("{}", style.apply_to(message));
    }
}

/// Cria a barra de progresso do teste de carga.
pub fn stress_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("completing records");
    pb
}
