//! Configuration and backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::catalog::PatternCatalog;
use examforge_core::engine::EngineConfig;
use examforge_core::error::ExamError;
use examforge_core::evaluation::EvaluationPolicy;
use examforge_core::progress::{UploadPolicy, DEFAULT_MAX_FILE_SIZE};
use examforge_core::resolver::{FallbackPolicy, DEFAULT_CONFIGURED_MODEL, DEFAULT_FALLBACK_MODELS};
use examforge_core::traits::GenerationBackend;

use crate::gemini::GeminiBackend;
use crate::mock::MockBackend;

pub const CONFIG_FILE_NAME: &str = "examforge.toml";

/// Which generation backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gemini,
    /// Offline backend that writes papers and reports itself.
    Mock,
}

/// `[gemini]` section.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_keys", &format_args!("[***; {}]", self.api_keys.len()))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `[models]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub configured: String,
    /// Static fallback tiers, best first.
    #[serde(default = "default_fallback")]
    pub fallback: Vec<String>,
    /// Linear backoff step after a quota failure.
    #[serde(default = "default_backoff_ms")]
    pub backoff_step_ms: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            configured: default_model(),
            fallback: default_fallback(),
            backoff_step_ms: default_backoff_ms(),
        }
    }
}

/// `[uploads]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_extensions(),
        }
    }
}

/// `[evaluation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding the exams. Without one, exams only live as
    /// long as the process.
    #[serde(default = "default_database")]
    pub database: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// `[mock]` section, only read when `backend = "mock"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub quota_exhausted: Vec<String>,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mock: MockConfig,
    /// Custom pattern table replacing the built-in one.
    #[serde(default)]
    pub patterns_path: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_CONFIGURED_MODEL.to_string()
}
fn default_fallback() -> Vec<String> {
    DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect()
}
fn default_backoff_ms() -> u64 {
    2000
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_extensions() -> Vec<String> {
    vec![".pdf".to_string()]
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_database() -> Option<PathBuf> {
    Some(PathBuf::from("./examforge-data/exams.db"))
}

impl ExamforgeConfig {
    /// Check the configuration is usable. Missing credentials are fatal.
    pub fn validate(&self) -> examforge_core::error::Result<()> {
        if self.backend == BackendKind::Gemini
            && !self.gemini.api_keys.iter().any(|k| !k.trim().is_empty())
        {
            return Err(ExamError::Configuration(
                "no Gemini API key configured; set GEMINI_API_KEY or [gemini].api_keys".into(),
            ));
        }
        if self.models.configured.trim().is_empty() {
            return Err(ExamError::Configuration("[models].configured is empty".into()));
        }
        if self.evaluation.max_attempts == 0 {
            return Err(ExamError::Configuration(
                "[evaluation].max_attempts must be at least 1".into(),
            ));
        }
        if self.uploads.max_file_size == 0 {
            return Err(ExamError::Configuration(
                "[uploads].max_file_size must be positive".into(),
            ));
        }
        if self.uploads.allowed_extensions.is_empty() {
            return Err(ExamError::Configuration(
                "[uploads].allowed_extensions is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            configured_model: self.models.configured.trim().to_string(),
            fallback_models: self.models.fallback.clone(),
            backoff_step: Duration::from_millis(self.models.backoff_step_ms),
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            allowed_extensions: self
                .uploads
                .allowed_extensions
                .iter()
                .map(|e| format!(".{}", e.trim().trim_start_matches('.').to_lowercase()))
                .collect(),
            max_file_size: self.uploads.max_file_size,
        }
    }

    pub fn evaluation_policy(&self) -> EvaluationPolicy {
        EvaluationPolicy {
            max_attempts: self.evaluation.max_attempts,
            retry_delay: Duration::from_millis(self.evaluation.retry_delay_ms),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fallback: self.fallback_policy(),
            uploads: self.upload_policy(),
            evaluation: self.evaluation_policy(),
        }
    }

    /// The configured pattern table, or the built-in one.
    pub fn pattern_catalog(&self) -> examforge_core::error::Result<PatternCatalog> {
        match &self.patterns_path {
            Some(path) => PatternCatalog::load(path),
            None => PatternCatalog::builtin(),
        }
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `GEMINI_API_KEYS` (comma separated) wins over `GEMINI_API_KEY`;
    /// `GEMINI_MODEL` replaces the configured model.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let keys = lookup("GEMINI_API_KEYS")
            .map(|v| split_keys(&v))
            .filter(|keys| !keys.is_empty())
            .or_else(|| lookup("GEMINI_API_KEY").map(|v| split_keys(&v)))
            .filter(|keys| !keys.is_empty());
        if let Some(keys) = keys {
            self.gemini.api_keys = keys;
        }
        if let Some(model) = lookup("GEMINI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.models.configured = model.trim().to_string();
        }
    }

    /// Resolve `${VAR}` references in credentials and URLs.
    fn resolve_env_vars(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        for key in &mut self.gemini.api_keys {
            *key = resolve_env_vars(key, lookup);
        }
        if let Some(url) = &mut self.gemini.base_url {
            *url = resolve_env_vars(url, lookup);
        }
    }
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unknown variables resolve to an empty string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&lookup(&rest[start + 2..start + end]).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `GEMINI_API_KEY`, `GEMINI_API_KEYS`,
/// `GEMINI_MODEL`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => ExamforgeConfig::default(),
    };
    config.resolve_env_vars(&process_env);
    config.apply_env_overrides(process_env);
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<ExamforgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let mut config = toml::from_str::<ExamforgeConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;

    // Relative paths are relative to the config file, not the working directory.
    if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut config.uploads.dir);
        if let Some(database) = &mut config.store.database {
            rebase(database);
        }
        if let Some(patterns) = &mut config.patterns_path {
            rebase(patterns);
        }
    }
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create the configured generation backend.
pub fn create_backend(config: &ExamforgeConfig) -> Result<Arc<dyn GenerationBackend>> {
    config.validate()?;
    match config.backend {
        BackendKind::Gemini => Ok(Arc::new(GeminiBackend::new(
            config.gemini.api_keys.clone(),
            config.gemini.base_url.clone(),
            config.gemini.timeout_secs,
        )?)),
        BackendKind::Mock => Ok(Arc::new(
            MockBackend::exam_fixture()
                .with_quota_exhausted(config.mock.quota_exhausted.iter().cloned())
                .with_missing(config.mock.missing.iter().cloned()),
        )),
    }
}
