//! Process-wide aggregator configuration.
//!
//! Fixed at startup and immutable afterwards. Values come from
//! [`Default`], a JSON document ([`AggregatorConfig::from_json_file`]) or
//! `IRONRANK_*` environment variables ([`AggregatorConfig::from_env`]).
//!
//! | variable | field |
//! |---|---|
//! | `IRONRANK_WINDOW_SIZE_MS` | `window_size_ms` |
//! | `IRONRANK_WINDOW_SLIDE_MS` | `window_slide_ms` |
//! | `IRONRANK_TOP_K` | `top_k` |
//! | `IRONRANK_MAX_PAST_SLACK_MS` | `max_past_slack_ms` |
//! | `IRONRANK_MAX_FUTURE_SLACK_MS` | `max_future_slack_ms` |
//! | `IRONRANK_SHARD_COUNT` | `shard_count` |
//! | `IRONRANK_TICK_INTERVAL_MS` | `tick_interval_ms` |
//! | `IRONRANK_EMIT_QUEUE_CAPACITY` | `emit_queue_capacity` |
//! | `IRONRANK_PARALLEL_SELECT_THRESHOLD` | `parallel_select_threshold` |

use crate::error::{AggregatorError, Result};
use crate::window::WindowSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for sink retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following one that waited `current_ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn next_delay_ms(&self, current_ms: u64) -> u64 {
        let scaled = (current_ms as f64 * self.backoff_multiplier.max(1.0)) as u64;
        scaled.min(self.max_delay_ms)
    }
}

/// Aggregator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Window size in milliseconds.
    pub window_size_ms: i64,
    /// Slide between consecutive window starts, in milliseconds.
    pub window_slide_ms: i64,
    /// Number of keys emitted per window.
    pub top_k: usize,
    /// Events older than `now - max_past_slack_ms` are rejected.
    pub max_past_slack_ms: i64,
    /// Events newer than `now + max_future_slack_ms` are rejected.
    pub max_future_slack_ms: i64,
    /// Independently locked store shards.
    pub shard_count: usize,
    /// Scheduler tick period; defaults to the slide.
    pub tick_interval_ms: Option<u64>,
    /// Emit backlog above which a slow sink is reported. Snapshots beyond it
    /// are still queued.
    pub emit_queue_capacity: usize,
    /// Distinct keys above which Top-K selection runs in parallel.
    pub parallel_select_threshold: usize,
    pub retry: RetryConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_size_ms: 60_000,
            window_slide_ms: 5_000,
            top_k: 5,
            max_past_slack_ms: 3_600_000,
            max_future_slack_ms: 60_000,
            shard_count: num_cpus::get() * 4,
            tick_interval_ms: None,
            emit_queue_capacity: 1_024,
            parallel_select_threshold: 50_000,
            retry: RetryConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Sliding windows of `size_ms` advancing by `slide_ms`, other fields default.
    #[must_use]
    pub fn sliding(size_ms: i64, slide_ms: i64) -> Self {
        Self {
            window_size_ms: size_ms,
            window_slide_ms: slide_ms,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    #[must_use]
    pub const fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards;
        self
    }

    #[must_use]
    pub const fn with_slack(mut self, past_ms: i64, future_ms: i64) -> Self {
        self.max_past_slack_ms = past_ms;
        self.max_future_slack_ms = future_ms;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_emit_queue_capacity(mut self, capacity: usize) -> Self {
        self.emit_queue_capacity = capacity;
        self
    }

    /// The validated window geometry.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] if size/slide are invalid.
    pub fn window_spec(&self) -> Result<WindowSpec> {
        WindowSpec::new(self.window_size_ms, self.window_slide_ms)
    }

    /// Scheduler tick period.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(
            self.tick_interval_ms
                .unwrap_or(self.window_slide_ms.max(1) as u64),
        )
    }

    /// Check every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.window_spec()?;
        let invalid = |msg: &str| Err(AggregatorError::InvalidConfig(msg.to_string()));
        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        if self.shard_count == 0 {
            return invalid("shard_count must be at least 1");
        }
        if self.emit_queue_capacity == 0 {
            return invalid("emit_queue_capacity must be at least 1");
        }
        if self.max_past_slack_ms < 0 || self.max_future_slack_ms < 0 {
            return invalid("event slack must not be negative");
        }
        if self.tick_interval_ms == Some(0) {
            return invalid("tick_interval_ms must be positive");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Load a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `IRONRANK_*` environment variables on the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] if a variable does not parse
    /// or the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        override_with(&lookup, "IRONRANK_WINDOW_SIZE_MS", &mut config.window_size_ms)?;
        override_with(&lookup, "IRONRANK_WINDOW_SLIDE_MS", &mut config.window_slide_ms)?;
        override_with(&lookup, "IRONRANK_TOP_K", &mut config.top_k)?;
        override_with(&lookup, "IRONRANK_MAX_PAST_SLACK_MS", &mut config.max_past_slack_ms)?;
        override_with(&lookup, "IRONRANK_MAX_FUTURE_SLACK_MS", &mut config.max_future_slack_ms)?;
        override_with(&lookup, "IRONRANK_SHARD_COUNT", &mut config.shard_count)?;
        override_with(&lookup, "IRONRANK_EMIT_QUEUE_CAPACITY", &mut config.emit_queue_capacity)?;
        override_with(
            &lookup,
            "IRONRANK_PARALLEL_SELECT_THRESHOLD",
            &mut config.parallel_select_threshold,
        )?;
        if let Some(raw) = lookup("IRONRANK_TICK_INTERVAL_MS") {
            config.tick_interval_ms = Some(parse_var("IRONRANK_TICK_INTERVAL_MS", &raw)?);
        }
        config.validate()?;
        Ok(config)
    }
}

fn override_with<F, T>(lookup: &F, name: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_var(name, &raw)?;
    }
    Ok(())
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AggregatorError::InvalidConfig(format!("{name}: cannot parse {raw:?}")))
}
