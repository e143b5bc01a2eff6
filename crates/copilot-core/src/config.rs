//! Configuration for the Copilot client.
//!
//! The backend base URL is resolved from an ordered set of sources:
//!
//! 1. Runtime override (`COPILOT_API_BASE`, then `api_base` in the config file)
//! 2. Build-time value (`COPILOT_BUILD_API_BASE` at compile time)
//! 3. Dev convention: an origin of `http(s)://(localhost|127.0.0.1):3000` maps to `http://localhost:3001`
//! 4. The origin itself (`COPILOT_ORIGIN`, then `origin` in the config file)
//! 5. `http://localhost:3001` when no origin is known
//!
//! The process-wide [`AppConfig`] is resolved once and is immutable afterwards.

use crate::error::{CopilotError, Result};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback backend when nothing else applies.
pub const DEFAULT_API_BASE: &str = "http://localhost:3001";

/// Env var carrying the runtime override.
pub const API_BASE_ENV: &str = "COPILOT_API_BASE";

/// Env var carrying the page/host origin.
pub const ORIGIN_ENV: &str = "COPILOT_ORIGIN";

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^/]+").expect("static regex"));

static DEV_ORIGIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://(localhost|127\.0\.0\.1):3000$").expect("static regex")
});

static APP_CONFIG: OnceCell<AppConfig> = OnceCell::new();

// ============================================================================
// ApiBase
// ============================================================================

/// A validated absolute backend URL prefix.
///
/// Invariant: non-empty, starts with `http://` or `https://`, no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ApiBase(String);

impl ApiBase {
    /// Validates a candidate, trimming whitespace and trailing slashes.
    ///
    /// Returns `None` for empty or non-`http(s)` candidates.
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim().trim_end_matches('/');
        if SCHEME_RE.is_match(trimmed) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    /// Joins a request path (expected to start with `/`) onto the base.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the process-wide base, resolving it on first use.
    pub fn global() -> &'static ApiBase {
        &AppConfig::global().api_base
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ApiBase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Raw inputs to API base resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// Value injected at runtime.
    pub runtime_override: Option<String>,
    /// Value baked in at build time.
    pub build_time: Option<String>,
    /// The host's own origin. `None` means no origin is determinable.
    pub origin: Option<String>,
}

impl ConfigSources {
    /// Collects sources from the environment, falling back to the config file.
    pub fn from_env(file: &ConfigFile) -> Self {
        Self {
            runtime_override: env::var(API_BASE_ENV).ok().or_else(|| file.api_base.clone()),
            build_time: option_env!("COPILOT_BUILD_API_BASE").map(str::to_string),
            origin: env::var(ORIGIN_ENV).ok().or_else(|| file.origin.clone()),
        }
    }
}

/// Which tier produced the resolved base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiBaseSource {
    RuntimeOverride,
    BuildTime,
    DevOrigin,
    SameOrigin,
    Default,
}

/// Resolves the API base from `sources`. First valid tier wins.
pub fn resolve_api_base(sources: &ConfigSources) -> ApiBase {
    resolve_with_source(sources).0
}

/// Same as [`resolve_api_base`], also reporting the winning tier.
pub fn resolve_with_source(sources: &ConfigSources) -> (ApiBase, ApiBaseSource) {
    let candidates = [
        (&sources.runtime_override, ApiBaseSource::RuntimeOverride),
        (&sources.build_time, ApiBaseSource::BuildTime),
    ];
    for (candidate, source) in candidates {
        if let Some(base) = candidate.as_deref().and_then(ApiBase::parse) {
            return (base, source);
        }
    }

    if let Some(origin) = sources.origin.as_deref().and_then(ApiBase::parse) {
        if DEV_ORIGIN_RE.is_match(origin.as_str()) {
            return (default_base(), ApiBaseSource::DevOrigin);
        }
        return (origin, ApiBaseSource::SameOrigin);
    }

    (default_base(), ApiBaseSource::Default)
}

fn default_base() -> ApiBase {
    ApiBase(DEFAULT_API_BASE.to_string())
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Upper bound for a single retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff configuration for a single client call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 400,
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Delay to wait after `current`, capped at [`MAX_BACKOFF`].
    ///
    /// A multiplier that is not a finite number `>= 1` leaves the delay
    /// unchanged instead of panicking.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let secs = current.as_secs_f64() * self.backoff_multiplier;
        if secs.is_nan() || secs < current.as_secs_f64() {
            return current.min(MAX_BACKOFF);
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms == 0 {
            return Err(CopilotError::config("retry.initial_backoff_ms must be > 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(CopilotError::config(
                "retry.backoff_multiplier must be a finite number >= 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Config file
// ============================================================================

/// Contents of `~/.config/copilot/config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub api_base: Option<String>,
    pub origin: Option<String>,
    pub retry: RetryPolicy,
}

impl ConfigFile {
    /// Loads the config file at `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| {
            CopilotError::config(format!(
                "Failed to parse configuration file at {}: {}",
                path.display(),
                e
            ))
        })?;
        file.retry.validate()?;
        Ok(file)
    }

    /// Loads the config file from its default location.
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Returns `~/.config/copilot/config.toml`, if a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("copilot").join("config.toml"))
}

// ============================================================================
// AppConfig
// ============================================================================

/// Process-wide configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: ApiBase,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_sources(sources: &ConfigSources, retry: RetryPolicy) -> Self {
        let (api_base, source) = resolve_with_source(sources);
        tracing::debug!(api_base = %api_base, ?source, "[config] Resolved API base");
        Self { api_base, retry }
    }

    /// Builds the configuration from the environment and the config file.
    pub fn load() -> Result<Self> {
        let file = ConfigFile::load()?;
        let sources = ConfigSources::from_env(&file);
        Ok(Self::from_sources(&sources, file.retry))
    }

    /// Installs `config` as the process-wide value.
    ///
    /// If a value is already installed it is kept and returned.
    pub fn install(config: AppConfig) -> &'static AppConfig {
        APP_CONFIG.get_or_init(|| config)
    }

    /// Returns the process-wide configuration, loading it on first use.
    ///
    /// A broken config file is logged and ignored in favour of environment-only sources.
    pub fn global() -> &'static AppConfig {
        APP_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                tracing::warn!("[config] {e}; continuing without config file");
                Self::from_sources(
                    &ConfigSources::from_env(&ConfigFile::default()),
                    RetryPolicy::default(),
                )
            })
        })
    }
}
