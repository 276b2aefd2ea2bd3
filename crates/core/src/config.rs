use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Key/value source the config is built from. `std::env` in production,
/// a plain map in tests.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a profiled key: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_opt(lookup: Lookup<'_>, profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup(&prefixed) {
            return Some(v);
        }
    }
    lookup(key)
}

/// Parse a profiled key, keeping `default` only when the key is absent.
/// A present but malformed value is an error, never a silent fallback.
fn profiled_parse<T>(
    lookup: Lookup<'_>,
    profile: &str,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match profiled_opt(lookup, profile, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e.to_string())),
        None => Ok(default),
    }
}

fn profiled_positive(
    lookup: Lookup<'_>,
    profile: &str,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = profiled_parse(lookup, profile, key, default)?;
    if value == 0 {
        return Err(ConfigError::invalid(key, "0", "must be greater than zero"));
    }
    Ok(value)
}

fn profiled_bool(lookup: Lookup<'_>, profile: &str, key: &str) -> Result<bool, ConfigError> {
    match profiled_opt(lookup, profile, key) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
        },
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub monitor: MonitorSettings,
    pub pool: PoolSettings,
    pub parallel: ParallelSettings,
    pub runtime: RuntimeSettings,
}

impl LabConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RUNLAB_PROFILE`. When set (e.g. `BENCH`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_opt("RUNLAB_PROFILE").unwrap_or_default();
        Self::from_lookup(&profile, &env_opt)
    }

    /// Like [`from_env`](Self::from_env) with an explicit profile.
    pub fn from_env_profile(profile: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(profile, &env_opt)
    }

    /// Build config for a named profile from an arbitrary key source.
    pub fn from_lookup(profile: &str, lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            monitor: MonitorSettings::from_lookup(lookup, p)?,
            pool: PoolSettings::from_lookup(lookup, p)?,
            parallel: ParallelSettings::from_lookup(lookup, p)?,
            runtime: RuntimeSettings::from_lookup(lookup, p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  monitor:   interval={}ms, timeout={}ms, history={}",
            self.monitor.sample_interval_ms,
            self.monitor.max_duration_ms,
            self.monitor.history_capacity
        );
        tracing::info!(
            "  pool:      size={}, idle_poll={}ms",
            self.pool.size,
            self.pool.idle_poll_ms
        );
        tracing::info!(
            "  parallel:  workers={}, seed={}",
            self.parallel.workers,
            self.parallel
                .update_seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(random)".to_string())
        );
        tracing::info!("  runtime:   expose_gc={}", self.runtime.expose_gc);
    }

    /// JSON view used by the `config` command.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "monitor": self.monitor,
            "pool": self.pool,
            "parallel": self.parallel,
            "runtime": self.runtime,
        })
    }
}

// ── Lag monitor ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub sample_interval_ms: u64,
    pub max_duration_ms: u64,
    pub history_capacity: usize,
}

impl MonitorSettings {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            sample_interval_ms: profiled_positive(lookup, p, "RUNLAB_SAMPLE_INTERVAL_MS", 1000)?,
            max_duration_ms: profiled_positive(lookup, p, "RUNLAB_MONITOR_TIMEOUT_MS", 30_000)?,
            history_capacity: profiled_positive(lookup, p, "RUNLAB_HISTORY_CAPACITY", 100)?
                as usize,
        })
    }
}

// ── Worker pool ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub size: usize,
    pub idle_poll_ms: u64,
}

impl PoolSettings {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            size: profiled_positive(lookup, p, "RUNLAB_POOL_SIZE", available_parallelism() as u64)?
                as usize,
            idle_poll_ms: profiled_positive(lookup, p, "RUNLAB_POOL_POLL_MS", 10)?,
        })
    }
}

// ── Shared-memory processing ──────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelSettings {
    pub workers: usize,
    /// Seed for the random index streams of concurrent updates.
    pub update_seed: Option<u64>,
}

impl ParallelSettings {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Result<Self, ConfigError> {
        let update_seed = match profiled_opt(lookup, p, "RUNLAB_UPDATE_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        ConfigError::invalid("RUNLAB_UPDATE_SEED", raw.clone(), e.to_string())
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            workers: profiled_positive(lookup, p, "RUNLAB_PARALLEL_WORKERS", 4)? as usize,
            update_seed,
        })
    }
}

// ── Runtime pass-through flags ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Manual memory-reclaimer trigger. Carried and reported only.
    pub expose_gc: bool,
}

impl RuntimeSettings {
    fn from_lookup(lookup: Lookup<'_>, p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            expose_gc: profiled_bool(lookup, p, "RUNLAB_EXPOSE_GC")?,
        })
    }
}
