//! Service configuration loaded from environment variables

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Judge service configuration
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Address the HTTP server listens on
    pub listen_addr: String,
    /// Number of concurrent judging workers
    pub workers: usize,
    /// Maximum queued jobs per mode before admission fails
    pub queue_depth: usize,
    /// Maximum time a job may wait for queue admission, in milliseconds
    pub queue_wait_ms: u64,
    /// Upper bound on the total lifetime of one job (queue wait excluded),
    /// in milliseconds. Jobs exceeding it resolve to an internal-error verdict.
    pub job_deadline_ms: u64,
    /// Compile time limit in milliseconds
    pub compile_time_limit_ms: u32,
    /// Compile memory limit in MB
    pub compile_memory_limit_mb: u32,
    /// Per-case time limit when the problem does not specify one, in milliseconds
    pub default_time_limit_ms: u32,
    /// Per-case memory limit when the problem does not specify one, in MB
    pub default_memory_limit_mb: u32,
    /// Maximum characters of stdout/stderr returned per case
    pub output_limit_chars: usize,
    /// Directory containing problem definitions (one JSON file per problem)
    pub problems_dir: PathBuf,
    /// Append-only log of scored submissions (submit mode only); disabled if unset
    pub submission_log: Option<PathBuf>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            workers: 4,
            queue_depth: 64,
            queue_wait_ms: 2_000,
            job_deadline_ms: 120_000,
            compile_time_limit_ms: 30_000,
            compile_memory_limit_mb: 2048,
            default_time_limit_ms: 2_000,
            default_memory_limit_mb: 256,
            output_limit_chars: 4096,
            problems_dir: "./files/problems".into(),
            submission_log: None,
        }
    }
}

impl JudgeConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            listen_addr: std::env::var("JUDGE_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            workers: env_parse("JUDGE_WORKERS", defaults.workers)?,
            queue_depth: env_parse("JUDGE_QUEUE_DEPTH", defaults.queue_depth)?,
            queue_wait_ms: env_parse("JUDGE_QUEUE_WAIT_MS", defaults.queue_wait_ms)?,
            job_deadline_ms: env_parse("JUDGE_JOB_DEADLINE_MS", defaults.job_deadline_ms)?,
            compile_time_limit_ms: env_parse(
                "JUDGE_COMPILE_TIME_LIMIT_MS",
                defaults.compile_time_limit_ms,
            )?,
            compile_memory_limit_mb: env_parse(
                "JUDGE_COMPILE_MEMORY_LIMIT_MB",
                defaults.compile_memory_limit_mb,
            )?,
            default_time_limit_ms: env_parse(
                "JUDGE_DEFAULT_TIME_LIMIT_MS",
                defaults.default_time_limit_ms,
            )?,
            default_memory_limit_mb: env_parse(
                "JUDGE_DEFAULT_MEMORY_LIMIT_MB",
                defaults.default_memory_limit_mb,
            )?,
            output_limit_chars: env_parse("JUDGE_OUTPUT_LIMIT_CHARS", defaults.output_limit_chars)?,
            problems_dir: std::env::var("JUDGE_PROBLEMS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.problems_dir),
            submission_log: std::env::var("JUDGE_SUBMISSION_LOG").ok().map(PathBuf::from),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JudgeConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.default_time_limit_ms, 2_000);
        assert!(config.submission_log.is_none());
    }
}
