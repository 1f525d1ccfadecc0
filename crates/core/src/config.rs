use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
pub const DEFAULT_MEETING_TYPE: &str = "Workshop";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub hubspot: HubSpotConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct HubSpotConfig {
    pub access_token: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Activity types configured in the portal; the first one is the fallback.
    pub meeting_types: Vec<String>,
}

impl HubSpotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub access_token: Option<String>,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hubspot: HubSpotConfig {
                access_token: String::new().into(),
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 1_000,
                meeting_types: vec![DEFAULT_MEETING_TYPE.to_string()],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Json },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hubbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(hubspot) = patch.hubspot {
            if let Some(access_token) = hubspot.access_token {
                self.hubspot.access_token = secret_value(access_token);
            }
            if let Some(base_url) = hubspot.base_url {
                self.hubspot.base_url = base_url;
            }
            if let Some(timeout_secs) = hubspot.timeout_secs {
                self.hubspot.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = hubspot.max_retries {
                self.hubspot.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = hubspot.retry_base_delay_ms {
                self.hubspot.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(meeting_types) = hubspot.meeting_types {
                self.hubspot.meeting_types = meeting_types;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let access_token = read_env("HUBBRIDGE_HUBSPOT_ACCESS_TOKEN")
            .or_else(|| read_env("HUBSPOT_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.hubspot.access_token = secret_value(value);
        }
        if let Some(value) = read_env("HUBBRIDGE_HUBSPOT_BASE_URL") {
            self.hubspot.base_url = value;
        }
        if let Some(value) = read_env("HUBBRIDGE_HUBSPOT_TIMEOUT_SECS") {
            self.hubspot.timeout_secs = parse_u64("HUBBRIDGE_HUBSPOT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HUBBRIDGE_HUBSPOT_MAX_RETRIES") {
            self.hubspot.max_retries = parse_u32("HUBBRIDGE_HUBSPOT_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("HUBBRIDGE_HUBSPOT_RETRY_BASE_DELAY_MS") {
            self.hubspot.retry_base_delay_ms =
                parse_u64("HUBBRIDGE_HUBSPOT_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("HUBBRIDGE_HUBSPOT_MEETING_TYPES") {
            self.hubspot.meeting_types = parse_list(&value);
        }

        let log_level = read_env("HUBBRIDGE_LOG_LEVEL").or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        if let Some(value) = read_env("HUBBRIDGE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(access_token) = overrides.access_token {
            self.hubspot.access_token = secret_value(access_token);
        }
        if let Some(base_url) = overrides.base_url {
            self.hubspot.base_url = base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_hubspot(&self.hubspot)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hubbridge.toml"), PathBuf::from("config/hubbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_hubspot(hubspot: &HubSpotConfig) -> Result<(), ConfigError> {
    if hubspot.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "hubspot.access_token is required. Set HUBSPOT_ACCESS_TOKEN to a private app token \
             (HubSpot > Settings > Integrations > Private Apps)"
                .to_string(),
        ));
    }

    let base_url = hubspot.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "hubspot.base_url must start with http:// or https://".to_string(),
        ));
    }

    if hubspot.timeout_secs == 0 || hubspot.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "hubspot.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if hubspot.max_retries > 10 {
        return Err(ConfigError::Validation(
            "hubspot.max_retries must be in range 0..=10".to_string(),
        ));
    }

    if hubspot.meeting_types.iter().all(|value| value.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "hubspot.meeting_types must name at least one activity type".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|part| !part.is_empty()).map(String::from).collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    hubspot: Option<HubSpotPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct HubSpotPatch {
    access_token: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    meeting_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOKEN_VARS: &[&str] = &["HUBSPOT_ACCESS_TOKEN", "HUBBRIDGE_HUBSPOT_ACCESS_TOKEN"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);
        env::set_var("TEST_HUBSPOT_TOKEN", "pat-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hubbridge.toml");
            fs::write(
                &path,
                r#"
[hubspot]
access_token = "${TEST_HUBSPOT_TOKEN}"
meeting_types = ["Workshop", "Demo"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.hubspot.access_token.expose_secret() == "pat-from-env",
                "access token should be interpolated from the environment",
            )?;
            ensure(
                config.hubspot.meeting_types == vec!["Workshop".to_string(), "Demo".to_string()],
                "meeting types should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_HUBSPOT_TOKEN"]);
        result
    }

    #[test]
    fn plain_token_and_log_level_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);
        env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-plain");
        env::set_var("LOG_LEVEL", "warn");
        env::set_var("HUBBRIDGE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.hubspot.access_token.expose_secret() == "pat-plain",
                "HUBSPOT_ACCESS_TOKEN should be honoured",
            )?;
            ensure(config.logging.level == "warn", "LOG_LEVEL should set the log level")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HUBSPOT_ACCESS_TOKEN", "LOG_LEVEL", "HUBBRIDGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);
        env::set_var("HUBBRIDGE_HUBSPOT_ACCESS_TOKEN", "pat-from-env");
        env::set_var("HUBBRIDGE_HUBSPOT_MAX_RETRIES", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hubbridge.toml");
            fs::write(
                &path,
                r#"
[hubspot]
access_token = "pat-from-file"
base_url = "https://from-file.example"
max_retries = 1
timeout_secs = 10

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    base_url: Some("https://from-override.example".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.hubspot.base_url == "https://from-override.example",
                "override base url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.hubspot.access_token.expose_secret() == "pat-from-env",
                "env token should win over file and defaults",
            )?;
            ensure(config.hubspot.max_retries == 5, "env max retries should win over file")?;
            ensure(config.hubspot.timeout_secs == 10, "file timeout should win over default")?;
            Ok(())
        })();

        clear_vars(&["HUBBRIDGE_HUBSPOT_ACCESS_TOKEN", "HUBBRIDGE_HUBSPOT_MAX_RETRIES"]);
        result
    }

    #[test]
    fn missing_token_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("HUBSPOT_ACCESS_TOKEN")
        );
        ensure(has_message, "validation failure should name HUBSPOT_ACCESS_TOKEN")
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);
        env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-test");
        env::set_var("HUBBRIDGE_HUBSPOT_TIMEOUT_SECS", "soon");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override to fail".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "HUBBRIDGE_HUBSPOT_TIMEOUT_SECS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["HUBSPOT_ACCESS_TOKEN", "HUBBRIDGE_HUBSPOT_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOKEN_VARS);
        env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("pat-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "default logging format should be json",
            )?;
            ensure(config.hubspot.timeout_secs == 30, "default timeout should be 30 seconds")?;
            Ok(())
        })();

        clear_vars(&["HUBSPOT_ACCESS_TOKEN"]);
        result
    }
}
