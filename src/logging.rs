//! Inicialização do `tracing` para o binário.
//!
//! `RUST_LOG` tem precedência sobre o filtro da configuração; `--verbose`
//! força o nível debug para o próprio crate.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Monta o filtro efetivo a partir da configuração e das flags.
pub fn build_filter(configured: &str, verbose: bool) -> Result<EnvFilter> {
    let base = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => env,
        _ => configured.to_string(),
    };
    let mut filter =
        EnvFilter::try_new(&base).with_context(|| format!("invalid log filter '{base}'"))?;
    if verbose {
        filter = filter.add_directive("maintflow=debug".parse()?);
    }
    Ok(filter)
}

/// Instala o subscriber global. Falha se já houver um instalado.
pub fn init_logging(configured: &str, verbose: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(build_filter(configured, verbose)?)
        .try_init()
        .context("failed to install tracing subscriber")
}
