//! Configuração do maintflow carregada a partir de `maintflow.toml`.
//!
//! A struct [`MaintflowConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `MAINTFLOW_LOG` tem precedência sobre o arquivo
//! para o filtro de logs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Nome do arquivo procurado no diretório atual.
pub const DEFAULT_CONFIG_FILE: &str = "maintflow.toml";

/// Configuração de nível superior.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MaintflowConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parâmetros do armazenamento de registros.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Tempo máximo de espera pelo lock de um registro, em milissegundos.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Regras de conclusão.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Exige as duas assinaturas também na conclusão automática por checklist.
    #[serde(default)]
    pub auto_complete_requires_signatures: bool,
}

/// Parâmetros de auditoria.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Capacidade do canal broadcast de eventos.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Tempo máximo de entrega por sink, em milissegundos.
    #[serde(default = "default_emit_timeout_ms")]
    pub emit_timeout_ms: u64,
}

/// Parâmetros de logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Diretiva de filtro no formato do `EnvFilter`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Valor padrão para o lock: 5000ms.
fn default_lock_timeout_ms() -> u64 {
    5000
}

// Valor padrão para o canal de auditoria: 256 eventos.
fn default_broadcast_capacity() -> usize {
    256
}

// Valor padrão para a entrega de auditoria: 1000ms.
fn default_emit_timeout_ms() -> u64 {
    1000
}

// Valor padrão para o filtro: "info".
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            emit_timeout_ms: default_emit_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl AuditConfig {
    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }
}

impl MaintflowConfig {
    /// Carrega a configuração de `maintflow.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Carrega a configuração do caminho informado.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<MaintflowConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(filter) = std::env::var("MAINTFLOW_LOG")
            && !filter.is_empty()
        {
            config.logging.filter = filter;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = MaintflowConfig::default();
        assert_eq!(config.store.lock_timeout_ms, 5000);
        assert!(!config.completion.auto_complete_requires_signatures);
        assert_eq!(config.audit.broadcast_capacity, 256);
        assert_eq!(config.audit.emit_timeout(), Duration::from_millis(1000));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [completion]
            auto_complete_requires_signatures = true

            [store]
            lock_timeout_ms = 250
        "#;
        let config: MaintflowConfig = toml::from_str(toml_str).unwrap();
        assert!(config.completion.auto_complete_requires_signatures);
        assert_eq!(config.store.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.audit.broadcast_capacity, 256);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audit]\nbroadcast_capacity = 16\nemit_timeout_ms = 40").unwrap();

        let config = MaintflowConfig::load_from(file.path()).unwrap();
        assert_eq!(config.audit.broadcast_capacity, 16);
        assert_eq!(config.audit.emit_timeout_ms, 40);
        assert_eq!(config.store.lock_timeout_ms, 5000);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nlock_timeout_ms = \"soon\"").unwrap();

        assert!(MaintflowConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MaintflowConfig::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.store.lock_timeout_ms, 5000);
    }
}
