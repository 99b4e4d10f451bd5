use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;

use maintflow::cli::{Cli, Command};
use maintflow::config::MaintflowConfig;
use maintflow::{demo, logging, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MaintflowConfig::load_from(path)?,
        None => MaintflowConfig::load()?,
    };
    logging::init_logging(&config.logging.filter, cli.verbose)?;

    let term = ui::Terminal::new();
    match cli.command {
        Command::Demo => {
            let report = demo::run_scenario(&config).await?;
            for step in &report.steps {
                match &step.outcome {
                    Ok(snapshot) => term.step_ok(&step.label, snapshot),
                    Err(message) => term.step_err(&step.label, message),
                }
            }
            term.print_audit(&report.audit);
        }
        Command::Stress { records, workers } => {
            let pb = ui::stress_progress(records as u64);
            let tick = pb.clone();
            let report =
                demo::run_stress(&config, records, workers, Arc::new(move || tick.inc(1))).await?;
            pb.finish_and_clear();

            let message = format!(
                "{} records completed in {:.2?}: {} distinct folios, highest {}",
                report.completed, report.elapsed, report.distinct_folios, report.max_folio
            );
            term.summary(report.is_consistent(), &message);
            if !report.is_consistent() {
                bail!("folio sequence is inconsistent");
            }
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
