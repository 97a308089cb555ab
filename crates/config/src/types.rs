use serde::Deserialize;
use std::{collections::HashMap, env};

use crate::ConfigError;

/// Source of raw configuration values, keyed by environment variable name.
pub trait VarSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl VarSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

fn required(vars: &dyn VarSource, key: &str) -> Result<String, ConfigError> {
    vars.var(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

fn parsed<T: std::str::FromStr>(
    vars: &dyn VarSource,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match vars.var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: key.to_string(),
            reason: format!("must be {expected}"),
        }),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &dyn VarSource) -> Result<Self, ConfigError> {
        Ok(Self {
            client: ClientConfig::from_vars(vars)?,
            oauth: OAuthConfig::from_vars(vars)?,
            logging: LoggingConfig::from_vars(vars),
        })
    }
}

/// Connection settings for the account service (BaaS endpoint + project).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub project_id: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Scheme part of the `Origin` header sent with every request,
    /// e.g. `appwrite-android://com.restate.app`
    #[serde(default = "default_origin_scheme")]
    pub origin_scheme: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_platform() -> String {
    "com.restate.app".to_string()
}

fn default_origin_scheme() -> String {
    "appwrite-android".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

impl ClientConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &dyn VarSource) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: required(vars, "APPWRITE_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            project_id: required(vars, "APPWRITE_PROJECT_ID")?,
            platform: vars
                .var("APPWRITE_PLATFORM")
                .unwrap_or_else(default_platform),
            origin_scheme: vars
                .var("APPWRITE_ORIGIN_SCHEME")
                .unwrap_or_else(default_origin_scheme),
            timeout_seconds: parsed(
                vars,
                "HTTP_TIMEOUT",
                default_http_timeout(),
                "a number of seconds",
            )?,
        })
    }

    /// Value of the `Origin` header identifying this client platform
    pub fn origin(&self) -> String {
        format!("{}://{}", self.origin_scheme, self.platform)
    }
}

/// Settings for the browser-mediated OAuth consent step
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Loopback port for desktop callbacks; 0 picks a free port
    #[serde(default)]
    pub callback_port: u16,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            callback_port: 0,
            callback_timeout_seconds: default_callback_timeout(),
        }
    }
}

impl OAuthConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &dyn VarSource) -> Result<Self, ConfigError> {
        Ok(Self {
            provider: vars
                .var("OAUTH_PROVIDER")
                .map(|p| p.trim().to_lowercase())
                .unwrap_or_else(default_provider),
            callback_port: parsed(vars, "OAUTH_CALLBACK_PORT", 0, "a valid port number")?,
            callback_timeout_seconds: parsed(
                vars,
                "OAUTH_CALLBACK_TIMEOUT",
                default_callback_timeout(),
                "a number of seconds",
            )?,
        })
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &dyn VarSource) -> Self {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        for (var, module) in [
            ("LOG_MODULE_SERVICES", "services"),
            ("LOG_MODULE_ACCOUNT_CLIENT", "account_client"),
            ("LOG_MODULE_PLATFORM", "platform"),
            ("LOG_MODULE_APP", "app"),
        ] {
            if let Some(level) = vars.var(var) {
                modules.insert(module.to_string(), level);
            }
        }

        Self {
            level: vars.var("LOG_LEVEL").unwrap_or_else(default_log_level),
            format: vars.var("LOG_FORMAT").unwrap_or_else(default_log_format),
            modules,
        }
    }

    /// Filter directive string, e.g. `info,services=debug`
    pub fn filter_directive(&self) -> String {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();

        let mut filter = self.level.clone();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            modules: HashMap::new(),
        }
    }
}
