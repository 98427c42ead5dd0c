use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SplitsumError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Parse a profiled env var. Unset keys yield `Ok(None)`, unparsable ones an error
/// naming the key so a typo never silently falls back to a default.
fn profiled_env_parse<T: std::str::FromStr>(
    profile: &str,
    key: &str,
) -> Result<Option<T>, SplitsumError> {
    match profiled_env_opt(profile, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SplitsumError::Config(format!("{} has invalid value {:?}", key, raw))),
    }
}

/// Env var holding the active profile name.
pub const PROFILE_ENV: &str = "SPLITSUM_PROFILE";

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub compute: ComputeConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SPLITSUM_PROFILE`. When set (e.g. `BENCH`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, SplitsumError> {
        let profile = env_or(PROFILE_ENV, "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, SplitsumError> {
        let p = profile.to_uppercase();
        let mut compute = ComputeConfig::default();
        compute.apply_env_profiled(&p)?;
        compute.validate()?;
        Ok(Self { profile: p, compute })
    }

    /// Layered load: defaults, then the TOML file (if given), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SplitsumError> {
        let profile = env_or(PROFILE_ENV, "").to_uppercase();
        let mut compute = match path {
            Some(p) => ComputeConfig::from_toml_file(p)?,
            None => ComputeConfig::default(),
        };
        compute.apply_env_profiled(&profile)?;
        compute.validate()?;
        Ok(Self { profile, compute })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  compute:     workers={} (resolved {}), threshold={}",
            self.compute.worker_threads,
            self.compute.resolved_worker_threads(),
            self.compute.threshold
        );
        tracing::info!(
            "  limits:      max_pending_tasks={}, deadline_ms={}",
            self.compute.max_pending_tasks,
            self.compute.deadline_ms
        );
    }
}

// ── Compute ───────────────────────────────────────────────────

/// Fork/join reduction settings, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Largest range size reduced sequentially instead of split.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Cap on forked-but-unfinished tasks. 0 = unbounded.
    #[serde(default = "default_max_pending")]
    pub max_pending_tasks: usize,
    /// Per-invocation deadline in milliseconds. 0 = none.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_worker_threads() -> usize { 0 }
fn default_threshold() -> usize { 10_000 }
fn default_max_pending() -> usize { 0 }
fn default_deadline_ms() -> u64 { 0 }

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            threshold: default_threshold(),
            max_pending_tasks: default_max_pending(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl ComputeConfig {
    /// Parse from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, SplitsumError> {
        toml::from_str(content).map_err(|e| SplitsumError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, SplitsumError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override fields from `SPLITSUM_*` env vars (profiled).
    pub fn apply_env_profiled(&mut self, p: &str) -> Result<(), SplitsumError> {
        if let Some(v) = profiled_env_parse(p, "SPLITSUM_WORKERS")? {
            self.worker_threads = v;
        }
        if let Some(v) = profiled_env_parse(p, "SPLITSUM_THRESHOLD")? {
            self.threshold = v;
        }
        if let Some(v) = profiled_env_parse(p, "SPLITSUM_MAX_PENDING")? {
            self.max_pending_tasks = v;
        }
        if let Some(v) = profiled_env_parse(p, "SPLITSUM_DEADLINE_MS")? {
            self.deadline_ms = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SplitsumError> {
        if self.threshold == 0 {
            return Err(SplitsumError::Config("threshold must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Pending-task capacity, if bounded.
    pub fn pending_capacity(&self) -> Option<usize> {
        (self.max_pending_tasks > 0).then_some(self.max_pending_tasks)
    }

    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_ms > 0).then(|| Duration::from_millis(self.deadline_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn compute_config_defaults() {
        let config = ComputeConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.threshold, 10_000);
        assert_eq!(config.pending_capacity(), None);
        assert_eq!(config.deadline(), None);
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = ComputeConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ComputeConfig::from_toml_str("threshold = 3\ndeadline_ms = 250\n").unwrap();
        assert_eq!(config.threshold, 3);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = ComputeConfig::from_toml_str("threshold = \"many\"").unwrap_err();
        assert!(matches!(err, SplitsumError::Parse(_)));
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = ComputeConfig { threshold: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 2\nmax_pending_tasks = 64").unwrap();

        let config = ComputeConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.pending_capacity(), Some(64));
        assert_eq!(config.threshold, 10_000);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ComputeConfig::from_toml_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SplitsumError::Io(_)));
    }

    #[test]
    fn profiled_env_overrides() {
        // Profile-prefixed keys are unique to this test.
        env::set_var("CFGTEST_SPLITSUM_THRESHOLD", "42");
        env::set_var("CFGTEST_SPLITSUM_WORKERS", "3");

        let config = Config::for_profile("cfgtest").unwrap();
        assert_eq!(config.profile_label(), "CFGTEST");
        assert_eq!(config.compute.threshold, 42);
        assert_eq!(config.compute.worker_threads, 3);
    }

    #[test]
    fn invalid_env_value_is_reported() {
        env::set_var("BADENV_SPLITSUM_DEADLINE_MS", "soon");

        let err = Config::for_profile("badenv").unwrap_err();
        assert!(err.to_string().contains("SPLITSUM_DEADLINE_MS"));
    }
}
