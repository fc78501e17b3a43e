//! Configuração do formicary carregada a partir de `formicary.toml`.
//!
//! A struct [`Options`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `FORMICARY_AUTO_ROOT` tem precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::LogLevel;
use crate::error::ConfigError;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "formicary.toml";

/// Variável de ambiente que sobrepõe `auto_managed_root`.
pub const AUTO_ROOT_ENV: &str = "FORMICARY_AUTO_ROOT";

/// Opções de nível superior carregadas de `formicary.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Minutos que um job aguarda na fila de correlação antes de falhar.
    #[serde(default = "default_orphan_minutes")]
    pub orphan_minutes: u64,

    /// Raiz dos nests de pasta gerenciados automaticamente.
    #[serde(default)]
    pub auto_managed_root: Option<PathBuf>,

    /// Nível mínimo de log entregue ao sink.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Intervalo de varredura dos nests de pasta, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Diretório de trabalho para pack/unpack.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

// Valor padrão para o timeout de órfãos: 5 minutos.
fn default_orphan_minutes() -> u64 {
    5
}

// Valor padrão para o intervalo de varredura: 10s.
fn default_poll_interval_secs() -> u64 {
    10
}

// Valor padrão para o diretório de trabalho: `<tmp>/formicary`.
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("formicary")
}

impl Default for Options {
    fn default() -> Self {
        Self {
            orphan_minutes: default_orphan_minutes(),
            auto_managed_root: None,
            log_level: LogLevel::default(),
            poll_interval_secs: default_poll_interval_secs(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl Options {
    /// Carrega as opções de `formicary.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega as opções de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut options = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<Options>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(root) = std::env::var(AUTO_ROOT_ENV)
            && !root.is_empty()
        {
            options.auto_managed_root = Some(PathBuf::from(root));
        }

        Ok(options)
    }

    pub fn orphan_timeout(&self) -> Duration {
        Duration::from_secs(self.orphan_minutes.saturating_mul(60))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Raiz gerenciada, ou erro de configuração se ausente.
    pub fn require_auto_root(&self) -> Result<&Path, ConfigError> {
        self.auto_managed_root
            .as_deref()
            .ok_or(ConfigError::MissingOption("auto_managed_root"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_option_values() {
        let options = Options::default();
        assert_eq!(options.orphan_minutes, 5);
        assert_eq!(options.poll_interval_secs, 10);
        assert_eq!(options.log_level, LogLevel::Info);
        assert!(options.auto_managed_root.is_none());
        assert_eq!(options.orphan_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            orphan_minutes = 2
            log_level = "warning"
            auto_managed_root = "/srv/formicary"
        "#;
        let options: Options = toml::from_str(toml_str).unwrap();
        assert_eq!(options.orphan_minutes, 2);
        assert_eq!(options.log_level, LogLevel::Warning);
        assert_eq!(
            options.auto_managed_root.as_deref(),
            Some(Path::new("/srv/formicary"))
        );
        assert_eq!(options.poll_interval_secs, 10);
    }

    #[test]
    fn huge_orphan_minutes_saturate() {
        let options = Options {
            orphan_minutes: u64::MAX,
            ..Default::default()
        };
        assert_eq!(options.orphan_timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn missing_auto_root_is_config_error() {
        let options = Options::default();
        let err = options.require_auto_root().unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption("auto_managed_root")));
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(options.orphan_minutes, 5);
    }

    #[test]
    fn load_from_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "orphan_minutes = \"soon\"").unwrap();
        assert!(matches!(
            Options::load_from(&path),
            Err(ConfigError::Toml(_))
        ));
    }
}
