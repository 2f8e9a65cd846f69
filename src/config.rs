//! File, environment, and default configuration.
//!
//! Resolution order: built-in defaults, then the JSON config file, then
//! `ORIN_*` environment overrides, then command-line flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use llm_provider::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_TEMPERATURE};
use ollama_api::OllamaEndpoint;
use reasoner::{DEFAULT_SYSTEM_PROMPT, DEFAULT_VERIFY_TEMPERATURE_FACTOR};
use serde::{Deserialize, Serialize};
use session_log::DEFAULT_SESSION_DIR;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "ORIN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "orin.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[value(name = "llamacpp")]
    LlamaCpp,
    Ollama,
    Mock,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlamaCpp => "llamacpp",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "llamacpp" | "llama.cpp" | "llama" => Some(Self::LlamaCpp),
            "ollama" => Some(Self::Ollama),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlamaCppSection {
    pub binary_path: PathBuf,
    pub model_path: PathBuf,
    pub context_size: Option<u32>,
    pub thread_count: Option<u32>,
    pub batch_size: Option<u32>,
    pub use_memory_map: bool,
    pub gpu_layers: u32,
    pub timeout_sec: u64,
    pub grace_period_sec: u64,
    pub merge_stderr: bool,
}

impl Default for LlamaCppSection {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("llama-cli"),
            model_path: PathBuf::from("models/model.gguf"),
            context_size: Some(4096),
            thread_count: None,
            batch_size: None,
            use_memory_map: true,
            gpu_layers: 0,
            timeout_sec: 120,
            grace_period_sec: 2,
            merge_stderr: false,
        }
    }
}

impl LlamaCppSection {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OllamaSection {
    pub base_url: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_sec: u64,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: ollama_api::url::DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: "deepseek-r1:1.5b".to_string(),
            endpoint: "chat".to_string(),
            timeout_sec: 600,
        }
    }
}

impl OllamaSection {
    pub fn endpoint(&self) -> Result<OllamaEndpoint, ConfigError> {
        OllamaEndpoint::parse(&self.endpoint).ok_or_else(|| {
            ConfigError::invalid(
                "ollama.endpoint",
                format!("expected 'chat' or 'generate', got '{}'", self.endpoint),
            )
        })
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GenerationSection {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReasoningSection {
    pub vote_samples: usize,
    pub vote_temperature: f32,
    pub max_verify_iterations: usize,
    pub verify_temperature_factor: f32,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            vote_samples: 3,
            vote_temperature: 0.7,
            max_verify_iterations: 2,
            verify_temperature_factor: DEFAULT_VERIFY_TEMPERATURE_FACTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: crate::logging::DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrinConfig {
    pub backend: BackendKind,
    pub system_prompt: String,
    pub llamacpp: LlamaCppSection,
    pub ollama: OllamaSection,
    pub generation: GenerationSection,
    pub reasoning: ReasoningSection,
    pub logging: LoggingSection,
    pub session_dir: PathBuf,
}

impl Default for OrinConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            llamacpp: LlamaCppSection::default(),
            ollama: OllamaSection::default(),
            generation: GenerationSection::default(),
            reasoning: ReasoningSection::default(),
            logging: LoggingSection::default(),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
        }
    }
}

/// A loaded configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: OrinConfig,
    pub source: Option<PathBuf>,
}

impl OrinConfig {
    pub fn from_json_str(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }

    /// Loads the file named by `explicit`, `ORIN_CONFIG`, or `./orin.json`,
    /// then applies environment overrides. Validation is left to the caller,
    /// which may still apply command-line flags.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let source = resolve_config_path(explicit, env_string_opt(CONFIG_ENV_VAR), &cwd);
        let mut config = match &source {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        EnvOverrides::from_env().apply(&mut config)?;
        Ok(LoadedConfig { config, source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_temperature("generation.temperature", self.generation.temperature)?;
        validate_temperature("reasoning.vote_temperature", self.reasoning.vote_temperature)?;
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::invalid(
                "generation.max_tokens",
                "must be greater than 0",
            ));
        }
        if self.reasoning.vote_samples == 0 {
            return Err(ConfigError::invalid(
                "reasoning.vote_samples",
                "must be at least 1",
            ));
        }
        let factor = self.reasoning.verify_temperature_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::invalid(
                "reasoning.verify_temperature_factor",
                format!("must be in (0, 1], got {factor}"),
            ));
        }
        if self.llamacpp.timeout_sec == 0 {
            return Err(ConfigError::invalid(
                "llamacpp.timeout_sec",
                "must be greater than 0",
            ));
        }
        if self.ollama.timeout_sec == 0 {
            return Err(ConfigError::invalid(
                "ollama.timeout_sec",
                "must be greater than 0",
            ));
        }
        self.ollama.endpoint()?;
        if self.backend == BackendKind::Ollama && self.ollama.model.trim().is_empty() {
            return Err(ConfigError::invalid("ollama.model", "must not be empty"));
        }
        Ok(())
    }
}

fn validate_temperature(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("must be within [0, {MAX_TEMPERATURE}], got {value}"),
        ));
    }
    Ok(())
}

/// Picks the config file: an explicit path, then the env var, then
/// `orin.json` in `cwd` when it exists.
#[must_use]
pub fn resolve_config_path(
    explicit: Option<&Path>,
    from_env: Option<String>,
    cwd: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env {
        return Some(PathBuf::from(path));
    }
    let local = cwd.join(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

/// `ORIN_*` variables that override file settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub backend: Option<String>,
    pub llama_bin: Option<String>,
    pub model_path: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub session_dir: Option<String>,
    pub log_file: Option<String>,
    pub no_stream: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            backend: env_string_opt("ORIN_BACKEND"),
            llama_bin: env_string_opt("ORIN_LLAMA_BIN"),
            model_path: env_string_opt("ORIN_MODEL_PATH"),
            ollama_url: env_string_opt("ORIN_OLLAMA_URL"),
            ollama_model: env_string_opt("ORIN_OLLAMA_MODEL"),
            session_dir: env_string_opt("ORIN_SESSION_DIR"),
            log_file: env_string_opt("ORIN_LOG_FILE"),
            no_stream: env_flag("ORIN_NO_STREAM"),
        }
    }

    pub fn apply(&self, config: &mut OrinConfig) -> Result<(), ConfigError> {
        if let Some(backend) = &self.backend {
            config.backend = BackendKind::parse(backend).ok_or_else(|| {
                ConfigError::invalid("ORIN_BACKEND", format!("unknown backend '{backend}'"))
            })?;
        }
        if let Some(path) = &self.llama_bin {
            config.llamacpp.binary_path = PathBuf::from(path);
        }
        if let Some(path) = &self.model_path {
            config.llamacpp.model_path = PathBuf::from(path);
        }
        if let Some(url) = &self.ollama_url {
            config.ollama.base_url.clone_from(url);
        }
        if let Some(model) = &self.ollama_model {
            config.ollama.model.clone_from(model);
        }
        if let Some(dir) = &self.session_dir {
            config.session_dir = PathBuf::from(dir);
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(PathBuf::from(file));
        }
        if self.no_stream {
            config.generation.stream = false;
        }
        Ok(())
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const OVERRIDE_KEYS: [&str; 8] = [
        "ORIN_BACKEND",
        "ORIN_LLAMA_BIN",
        "ORIN_MODEL_PATH",
        "ORIN_OLLAMA_URL",
        "ORIN_OLLAMA_MODEL",
        "ORIN_SESSION_DIR",
        "ORIN_LOG_FILE",
        "ORIN_NO_STREAM",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_overrides() -> Vec<EnvGuard> {
        OVERRIDE_KEYS
            .iter()
            .map(|key| set_env_guard(key, None))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = OrinConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.backend, BackendKind::LlamaCpp);
        assert_eq!(config.session_dir, PathBuf::from("logs"));
        assert_eq!(config.reasoning.vote_samples, 3);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = OrinConfig::from_json_str(
            Path::new("orin.json"),
            r#"{ "backend": "ollama", "ollama": { "model": "qwen3:4b" },
                 "generation": { "temperature": 0.5 } }"#,
        )
        .expect("config should parse");

        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.ollama.model, "qwen3:4b");
        assert_eq!(config.ollama.timeout_sec, 600);
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.generation.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = OrinConfig::from_json_str(
            Path::new("orin.json"),
            r#"{ "generation": { "temprature": 0.5 } }"#,
        )
        .expect_err("typo should be rejected");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_values_name_their_field() {
        let mut config = OrinConfig::default();
        config.generation.temperature = 2.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "generation.temperature", .. })
        ));

        let mut config = OrinConfig::default();
        config.reasoning.vote_samples = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "reasoning.vote_samples", .. })
        ));

        let mut config = OrinConfig::default();
        config.ollama.endpoint = "embeddings".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "ollama.endpoint", .. })
        ));
    }

    #[test]
    fn explicit_path_wins_over_env_and_local_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "{}").expect("local config written");

        assert_eq!(
            resolve_config_path(Some(Path::new("/etc/orin.json")), Some("env.json".into()), dir.path()),
            Some(PathBuf::from("/etc/orin.json"))
        );
        assert_eq!(
            resolve_config_path(None, Some("env.json".into()), dir.path()),
            Some(PathBuf::from("env.json"))
        );
        assert_eq!(
            resolve_config_path(None, None, dir.path()),
            Some(dir.path().join(DEFAULT_CONFIG_FILE))
        );

        let empty = tempfile::tempdir().expect("tempdir should be created");
        assert_eq!(resolve_config_path(None, None, empty.path()), None);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let _lock = env_lock();
        let _cleared = clear_overrides();
        let _g1 = set_env_guard("ORIN_BACKEND", Some("ollama"));
        let _g2 = set_env_guard("ORIN_OLLAMA_MODEL", Some("llama3.2"));
        let _g3 = set_env_guard("ORIN_SESSION_DIR", Some("/tmp/orin-logs"));
        let _g4 = set_env_guard("ORIN_NO_STREAM", Some("1"));

        let mut config = OrinConfig::default();
        EnvOverrides::from_env()
            .apply(&mut config)
            .expect("overrides should apply");

        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.session_dir, PathBuf::from("/tmp/orin-logs"));
        assert!(!config.generation.stream);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _lock = env_lock();
        let _cleared = clear_overrides();
        let _g1 = set_env_guard("ORIN_LLAMA_BIN", Some("  "));

        let overrides = EnvOverrides::from_env();
        assert_eq!(overrides, EnvOverrides::default());
    }

    #[test]
    fn unknown_backend_in_env_is_invalid() {
        let overrides = EnvOverrides {
            backend: Some("vllm".to_string()),
            ..EnvOverrides::default()
        };
        let error = overrides
            .apply(&mut OrinConfig::default())
            .expect_err("unknown backend");
        assert!(error.to_string().contains("unknown backend 'vllm'"));
    }
}
