//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level browserd configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Remote automation provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Provider API key. Usually set via `${BROWSERD_API_KEY}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider project id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Provider API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Route new sessions through the provider's proxy pool.
    #[serde(default)]
    pub proxies: bool,

    /// Remote context id to attach new sessions to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Keep remote sessions alive after disconnect, making them resumable.
    #[serde(default)]
    pub keep_alive: bool,
}

/// Post-hoc usage accounting endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Enable the best-effort usage replay fetch at session close.
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model API key forwarded to the accounting endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_api_key: Option<String>,
}

/// Transport binding. Irrelevant to the session/metering core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_port() -> u16 {
    8931
}

fn default_log_format() -> String {
    "plain".to_string()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::BrowserdError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::BrowserdError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    pub fn server_host(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.host.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    /// Engine section, defaulted when absent.
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    /// Replay section, defaulted when absent (disabled).
    pub fn replay(&self) -> ReplayConfig {
        self.replay.clone().unwrap_or_default()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }
}

/// Resolve the browserd data directory (`~/.browserd`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".browserd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_BD_KEY", "bb-test-123") };
        let input = r#"{"key": "${TEST_BD_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("bb-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_BD_KEY") };
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/browserd.json")).unwrap();
        assert!(config.engine.is_none());
        assert!(!config.engine().proxies);
        assert_eq!(config.server_port(), 8931);
    }

    #[test]
    fn test_load_json5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                engine: { proxies: true, context: "ctx-1" },
                server: { port: 9000 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let engine = config.engine();
        assert!(engine.proxies);
        assert_eq!(engine.context.as_deref(), Some("ctx-1"));
        assert_eq!(config.server_port(), 9000);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::BrowserdError::Config(_)));
    }
}
