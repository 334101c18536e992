use crate::acquire::RetryPolicy;
use crate::wb::config::DEFAULT_ROOT as DEFAULT_WB_ROOT;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SHEETS_ROOT: &str = "https://sheets.googleapis.com";
pub const DEFAULT_SOURCE_RANGE: &str = "A2:B";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything a run needs, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub wb_root: String,
    pub sheets: SheetsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub api_root: String,
    pub access_token: String,
    pub source_sheet_id: String,
    pub target_sheet_id: String,
    pub source_range: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);
        let defaults = RetryPolicy::default();

        let retry = RetryPolicy {
            submit_attempts: env.attempts("WB_SUBMIT_ATTEMPTS", defaults.submit_attempts)?,
            submit_delay: env.secs("WB_SUBMIT_DELAY_SECS", defaults.submit_delay)?,
            poll_initial_delay: env.secs("WB_POLL_INITIAL_DELAY_SECS", defaults.poll_initial_delay)?,
            poll_attempts: env.attempts("WB_POLL_ATTEMPTS", defaults.poll_attempts)?,
            poll_delay: env.secs("WB_POLL_DELAY_SECS", defaults.poll_delay)?,
        };

        let http_defaults = HttpConfig::default();
        let http = HttpConfig {
            timeout: env.secs("HTTP_TIMEOUT_SECS", http_defaults.timeout)?,
            connect_timeout: env.secs("HTTP_CONNECT_TIMEOUT_SECS", http_defaults.connect_timeout)?,
        };

        let sheets = SheetsConfig {
            api_root: env.root("SHEETS_API_ROOT", DEFAULT_SHEETS_ROOT),
            access_token: env.required("GOOGLE_ACCESS_TOKEN")?,
            source_sheet_id: env.required("SOURCE_SHEET_ID")?,
            target_sheet_id: env.required("TARGET_SHEET_ID")?,
            source_range: env
                .string("SOURCE_RANGE")
                .unwrap_or_else(|| DEFAULT_SOURCE_RANGE.to_string()),
        };

        Ok(Self {
            http,
            retry,
            wb_root: env.root("WB_API_ROOT", DEFAULT_WB_ROOT),
            sheets,
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.string(key).ok_or(ConfigError::Missing(key))
    }

    fn root(&self, key: &str, default: &str) -> String {
        self.string(key)
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    fn number(&self, key: &'static str) -> Result<Option<u64>, ConfigError> {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
        }
    }

    fn secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .number(key)?
            .map(Duration::from_secs)
            .unwrap_or(default))
    }

    fn attempts(&self, key: &'static str, default: u32) -> Result<u32, ConfigError> {
        match self.number(key)? {
            None => Ok(default),
            Some(value) => u32::try_from(value)
                .ok()
                .filter(|v| *v >= 1)
                .ok_or_else(|| ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                }),
        }
    }
}
