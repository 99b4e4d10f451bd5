//! Interface de linha de comando do maintflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, stress, config)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// maintflow: ciclo de vida de registros de manutenção com folios sequenciais.
#[derive(Debug, Parser)]
#[command(name = "maintflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./maintflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o cenário completo de um registro, da criação à exclusão.
    Demo,

    /// Conclui muitos registros em paralelo e verifica os folios atribuídos.
    Stress {
        /// Quantidade de registros a concluir.
        #[arg(long, default_value_t = 50)]
        records: usize,

        /// Máximo de conclusões simultâneas.
        #[arg(long, default_value_t = 8)]
        workers: usize,
    },

    /// Mostra a configuração efetiva em TOML.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_stress_subcommand() {
        let cli = Cli::parse_from(["maintflow", "stress", "--records", "200", "--workers", "16"]);
        match cli.command {
            Command::Stress { records, workers } => {
                assert_eq!(records, 200);
                assert_eq!(workers, 16);
            }
            _ => panic!("expected Stress command"),
        }
    }

    #[test]
    fn cli_stress_defaults() {
        let cli = Cli::parse_from(["maintflow", "stress"]);
        assert!(matches!(
            cli.command,
            Command::Stress {
                records: 50,
                workers: 8
            }
        ));
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "maintflow",
            "--config",
            "/etc/maintflow.toml",
            "--verbose",
            "demo",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/maintflow.toml")));
        assert!(matches!(cli.command, Command::Demo));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
