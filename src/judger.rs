//! Test case executor
//!
//! Processes one judge job end to end: stage the source into a scoped
//! workspace, prepare it (compile if needed), then run every test case in
//! stored order. Each case is an independent sandboxed execution with its
//! own limits; a failing or timing-out case never prevents the remaining
//! cases from running, so the client can show all per-case outcomes.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::compiler::{self, Prepared, PreparedUnit};
use crate::config::JudgeConfig;
use crate::executer::{execute_sandboxed, ExecutionLimits, ExecutionSpec, ExecutionStatus};
use crate::languages;
use crate::scheduler::{JobProcessor, JudgeJob};
use crate::verdict::{CaseOutcome, CaseStatus, JudgeOutcome};

/// Judger backed by the isolate sandbox
pub struct Judger {
    config: Arc<JudgeConfig>,
}

impl Judger {
    pub fn new(config: Arc<JudgeConfig>) -> Self {
        Self { config }
    }

    async fn judge(&self, job: &JudgeJob) -> Result<JudgeOutcome> {
        let lang = languages::get_language_config(&job.language)
            .ok_or_else(|| anyhow::anyhow!("Unsupported language: {}", job.language))?;

        // Scoped workspace, removed when the TempDir drops on any exit path
        let workspace = tempfile::tempdir()?;

        let unit = match compiler::prepare(&lang, &job.code, workspace.path(), &self.config).await?
        {
            Prepared::Ready(unit) => unit,
            Prepared::Failed { diagnostics } => {
                info!(
                    "Compilation failed: problem_id={}, language={}",
                    job.problem_id, job.language
                );
                return Ok(JudgeOutcome::CompileError {
                    compile_output: diagnostics,
                    total: job.cases.len(),
                });
            }
        };

        let time_limit_ms = lang.calculate_time_limit(job.time_limit_ms);
        let memory_limit_mb = lang.calculate_memory_limit(job.memory_limit_mb);

        let mut outcomes = Vec::with_capacity(job.cases.len());

        for case in &job.cases {
            let outcome = self
                .run_case(&unit, &case.input_text, &case.output_text, time_limit_ms, memory_limit_mb)
                .await?;

            outcomes.push(CaseOutcome {
                case_id: case.id,
                is_sample: case.is_sample,
                ..outcome
            });
        }

        Ok(JudgeOutcome::Judged { cases: outcomes })
    }

    async fn run_case(
        &self,
        unit: &PreparedUnit,
        input_text: &str,
        expected_output: &str,
        time_limit_ms: u32,
        memory_limit_mb: u32,
    ) -> Result<CaseOutcome> {
        let spec = ExecutionSpec::new(&unit.work_dir)
            .with_command(unit.run_command.clone())
            .with_limits(ExecutionLimits {
                time_ms: time_limit_ms,
                memory_mb: memory_limit_mb,
            })
            .with_stdin(input_text);

        let exec = execute_sandboxed(&spec).await?;

        if matches!(exec.status, ExecutionStatus::SandboxError) {
            anyhow::bail!("Sandbox fault during case execution");
        }

        let (status, passed) = match exec.status {
            ExecutionStatus::Exited(0) => {
                if compare_output(&exec.stdout, expected_output) {
                    (CaseStatus::Accepted, true)
                } else {
                    (CaseStatus::WrongAnswer, false)
                }
            }
            ExecutionStatus::TimeLimitExceeded => (CaseStatus::TimeLimitExceeded, false),
            ExecutionStatus::MemoryLimitExceeded => (CaseStatus::MemoryLimitExceeded, false),
            ExecutionStatus::Exited(_)
            | ExecutionStatus::Signaled(_)
            | ExecutionStatus::RuntimeError => (CaseStatus::RuntimeError, false),
            ExecutionStatus::SandboxError => unreachable!("handled above"),
        };

        let limit = self.config.output_limit_chars;
        Ok(CaseOutcome {
            case_id: 0,
            is_sample: false,
            passed,
            status,
            stdout: truncate_chars(&exec.stdout, limit),
            stderr: truncate_chars(&exec.stderr, limit),
            time_ms: exec.time_ms,
            memory_kb: exec.memory_kb,
            timed_out: exec.timed_out,
            oom: exec.oom,
        })
    }
}

#[async_trait]
impl JobProcessor for Judger {
    async fn process(&self, job: &JudgeJob) -> JudgeOutcome {
        match self.judge(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Judging failed: problem_id={}, language={}: {:#}",
                    job.problem_id, job.language, e
                );
                JudgeOutcome::Internal {
                    message: format!("{:#}", e),
                }
            }
        }
    }
}

/// Compare program output with expected output.
///
/// Policy: normalize CR/LF, trim trailing whitespace from each line, and
/// ignore trailing blank lines. Case, internal whitespace, and numeric
/// formatting are all significant. This is the single place the comparison
/// policy lives.
pub fn compare_output(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

fn normalize_output(s: &str) -> Vec<String> {
    let mut lines: Vec<String> = s
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect();

    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_output_exact_match() {
        assert!(compare_output("hello\nworld\n", "hello\nworld\n"));
    }

    #[test]
    fn test_compare_output_trailing_newline_insensitive() {
        assert!(compare_output("3", "3\n"));
        assert!(compare_output("hello\nworld\n\n\n", "hello\nworld\n"));
    }

    #[test]
    fn test_compare_output_trailing_whitespace_per_line() {
        assert!(compare_output("hello  \nworld\n", "hello\nworld\n"));
    }

    #[test]
    fn test_compare_output_crlf() {
        assert!(compare_output("hello\r\nworld\r\n", "hello\nworld\n"));
    }

    #[test]
    fn test_compare_output_case_sensitive() {
        assert!(!compare_output("Hello\n", "hello\n"));
    }

    #[test]
    fn test_compare_output_internal_whitespace_significant() {
        assert!(!compare_output("1  2\n", "1 2\n"));
    }

    #[test]
    fn test_compare_output_different() {
        assert!(!compare_output("hello\nworld\n", "hello\nearth\n"));
    }

    #[test]
    fn test_compare_output_missing_line() {
        assert!(!compare_output("hello\n", "hello\nworld\n"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("abc", 4), "abc");
    }
}
