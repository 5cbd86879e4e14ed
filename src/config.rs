//! Configuration types.
//!
//! Everything is plain key/value configuration from the environment (optionally
//! seeded from a `.env` file). Constructors take an [`EnvLookup`] so they can be
//! exercised without touching the process environment.

use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::calendar::CalendarConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailbox::MailboxConfig;

/// Variable lookup: key → value.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Fetch a required variable.
pub(crate) fn required(vars: EnvLookup<'_>, key: &str) -> Result<String, ConfigError> {
    vars(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse a variable, falling back to `default` when it is unset.
pub(crate) fn parse_or<T>(vars: EnvLookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Like [`parse_or`], rejecting values outside `bounds`.
pub(crate) fn parse_within<T>(
    vars: EnvLookup<'_>,
    key: &str,
    default: T,
    bounds: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_or(vars, key, default)?;
    if !bounds.contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value} is outside {}..={}", bounds.start(), bounds.end()),
        });
    }
    Ok(value)
}

/// Longest accepted poll or backoff interval, in seconds.
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// What to do with a message whose classification could not be validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Leave it unread; the next cycle classifies it again.
    #[default]
    Retry,
    /// Treat as not relevant and mark it read.
    Drop,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "drop" => Ok(Self::Drop),
            other => Err(format!("expected retry or drop, got '{other}'")),
        }
    }
}

/// What to do when an appointment request arrives but no slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoAvailabilityPolicy {
    /// Reply with a no-availability notice and mark read.
    #[default]
    Notify,
    /// Leave unread without replying; retried next cycle.
    Defer,
}

impl FromStr for NoAvailabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notify" => Ok(Self::Notify),
            "defer" => Ok(Self::Defer),
            other => Err(format!("expected notify or defer, got '{other}'")),
        }
    }
}

/// Which classifier implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierBackend {
    #[default]
    Llm,
    Keyword,
}

impl FromStr for ClassifierBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "keyword" => Ok(Self::Keyword),
            other => Err(format!("expected llm or keyword, got '{other}'")),
        }
    }
}

/// Orchestrator loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Sleep after a completed cycle.
    pub poll_interval: Duration,
    /// Sleep after a cycle-level failure.
    pub backoff_interval: Duration,
    /// Optional deadline for each external call.
    pub call_timeout: Option<Duration>,
    pub malformed_policy: MalformedPolicy,
    pub no_availability_policy: NoAvailabilityPolicy,
    /// Our own address; mail from it is never answered.
    pub self_address: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300), // 5 minutes
            backoff_interval: Duration::from_secs(60), // 1 minute
            call_timeout: None,
            malformed_policy: MalformedPolicy::default(),
            no_availability_policy: NoAvailabilityPolicy::default(),
            self_address: None,
        }
    }
}

impl LoopConfig {
    pub fn from_vars(vars: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let call_timeout = match vars("CALL_TIMEOUT_SECONDS") {
            None => None,
            Some(_) => Some(Duration::from_secs(parse_or(vars, "CALL_TIMEOUT_SECONDS", 0u64)?)),
        };

        Ok(Self {
            poll_interval: Duration::from_secs(parse_within(
                vars,
                "CHECK_INTERVAL_SECONDS",
                300u64,
                1..=MAX_INTERVAL_SECS,
            )?),
            backoff_interval: Duration::from_secs(parse_within(
                vars,
                "RETRY_INTERVAL_SECONDS",
                60u64,
                1..=MAX_INTERVAL_SECS,
            )?),
            call_timeout: call_timeout.filter(|d| !d.is_zero()),
            malformed_policy: parse_or(vars, "MALFORMED_POLICY", MalformedPolicy::default())?,
            no_availability_policy: parse_or(
                vars,
                "NO_AVAILABILITY_POLICY",
                NoAvailabilityPolicy::default(),
            )?,
            self_address: None,
        })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub loop_config: LoopConfig,
    pub classifier: ClassifierBackend,
    /// Present when `classifier` is `Llm`.
    pub llm: Option<LlmConfig>,
    pub mailbox: MailboxConfig,
    pub calendar: CalendarConfig,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&process_env)
    }

    pub fn from_vars(vars: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let classifier = parse_or(vars, "CLASSIFIER_BACKEND", ClassifierBackend::default())?;

        let llm = match classifier {
            ClassifierBackend::Keyword => None,
            ClassifierBackend::Llm => {
                let backend: LlmBackend = vars("LLM_BACKEND")
                    .as_deref()
                    .unwrap_or("openai")
                    .parse()?;
                let api_key = required(vars, backend.api_key_var())?;
                Some(LlmConfig {
                    backend,
                    api_key: secrecy::SecretString::from(api_key),
                    model: vars("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
                })
            }
        };

        let mailbox = MailboxConfig::from_vars(vars)?;
        let mut loop_config = LoopConfig::from_vars(vars)?;
        loop_config.self_address = Some(mailbox.from_address.clone()).filter(|a| !a.is_empty());

        Ok(Self {
            loop_config,
            classifier,
            llm,
            mailbox,
            calendar: CalendarConfig::from_vars(vars)?,
        })
    }
}
