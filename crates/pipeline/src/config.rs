use std::time::Duration;

use towebp_core::format::{EncodeParams, TargetFormat, DEFAULT_QUALITY};
use towebp_core::scheduling::default_pool_size;
use towebp_events::DEFAULT_RENDER_BATCH_LIMIT;

/// Default scheduling tick: one display frame.
pub const DEFAULT_TICK_MS: u64 = 16;

pub const DEFAULT_FALLBACK_CONCURRENCY: usize = 2;

pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Pipeline configuration loaded from environment variables.
///
/// All fields have defaults suitable for a desktop-class host.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of pool workers (at least 1).
    pub pool_size: usize,
    /// Parameters of the first run.
    pub params: EncodeParams,
    /// Interval of the admission/render tick.
    pub tick_interval: Duration,
    /// Row updates flushed to observers per tick.
    pub render_batch_limit: usize,
    /// Fallback executions allowed to run at once.
    pub fallback_concurrency: usize,
    /// Capacity of the command channel into the coordinator.
    pub command_buffer: usize,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                              |
    /// |-------------------------------|--------------------------------------|
    /// | `TOWEBP_POOL_SIZE`            | `max(2, available_parallelism - 1)`  |
    /// | `TOWEBP_FORMAT`               | `webp`                               |
    /// | `TOWEBP_QUALITY`              | `0.8`                                |
    /// | `TOWEBP_TICK_MS`              | `16`                                 |
    /// | `TOWEBP_RENDER_BATCH_LIMIT`   | `100`                                |
    /// | `TOWEBP_FALLBACK_CONCURRENCY` | `2`                                  |
    /// | `TOWEBP_COMMAND_BUFFER`       | `64`                                 |
    ///
    /// Invalid values abort startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pool_size: usize = env_or("TOWEBP_POOL_SIZE", defaults.pool_size);

        let format: TargetFormat = std::env::var("TOWEBP_FORMAT")
            .map(|v| v.parse().expect("TOWEBP_FORMAT must be a supported target format"))
            .unwrap_or_default();

        let quality: f32 = env_or("TOWEBP_QUALITY", DEFAULT_QUALITY);
        let params =
            EncodeParams::new(format, quality).expect("TOWEBP_QUALITY must be between 0 and 1");

        let tick_ms: u64 = env_or("TOWEBP_TICK_MS", DEFAULT_TICK_MS);

        Self {
            pool_size: pool_size.max(1),
            params,
            tick_interval: Duration::from_millis(tick_ms.max(1)),
            render_batch_limit: env_or("TOWEBP_RENDER_BATCH_LIMIT", defaults.render_batch_limit),
            fallback_concurrency: env_or(
                "TOWEBP_FALLBACK_CONCURRENCY",
                defaults.fallback_concurrency,
            )
            .max(1),
            command_buffer: env_or("TOWEBP_COMMAND_BUFFER", defaults.command_buffer).max(1),
        }
    }

    /// Same configuration with a fixed pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_params(mut self, params: EncodeParams) -> Self {
        self.params = params;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pool_size: default_pool_size(parallelism),
            params: EncodeParams::default(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            render_batch_limit: DEFAULT_RENDER_BATCH_LIMIT,
            fallback_concurrency: DEFAULT_FALLBACK_CONCURRENCY,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Parse `key` if set, panicking with a readable message on bad input.
fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {raw}")),
        Err(_) => default,
    }
}
