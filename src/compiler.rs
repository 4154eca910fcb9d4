//! Compiler/interpreter adapter
//!
//! Turns `(language, source_code)` into something the test case executor can
//! run. Compiled languages go through a sandboxed compile step under the same
//! isolation and limits as execution (a pathological compile can hang or
//! exhaust memory just like a pathological program). Interpreted languages
//! skip straight to a prepared unit wrapping the source.
//!
//! Nothing here ever executes the program under test.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::config::JudgeConfig;
use crate::executer::{execute_sandboxed, ExecutionLimits, ExecutionSpec, ExecutionStatus};
use crate::languages::LanguageConfig;

/// A submission ready for execution
#[derive(Debug)]
pub struct PreparedUnit {
    /// Workspace containing the source and any compiled artifacts
    pub work_dir: PathBuf,
    /// Command to run one execution of the submission
    pub run_command: Vec<String>,
}

/// Result of preparing a submission
#[derive(Debug)]
pub enum Prepared {
    Ready(PreparedUnit),
    /// Compiler diagnostics, verbatim. Short-circuits all case execution.
    Failed { diagnostics: String },
}

/// Write the source file and compile it if the language requires it.
///
/// `Err` means the preparation infrastructure failed (internal error);
/// a failed compile of valid infrastructure is `Ok(Prepared::Failed)`.
pub async fn prepare(
    lang: &LanguageConfig,
    source_code: &str,
    work_dir: &Path,
    config: &JudgeConfig,
) -> Result<Prepared> {
    let source_path = work_dir.join(&lang.source_file);
    tokio::fs::write(&source_path, source_code).await?;

    let Some(compile_cmd) = &lang.compile_command else {
        return Ok(Prepared::Ready(PreparedUnit {
            work_dir: work_dir.to_path_buf(),
            run_command: lang.run_command.clone(),
        }));
    };

    debug!("Compiling with {:?} inside isolate sandbox", compile_cmd);

    // Artifacts must survive the box teardown, so they are copied back out
    let spec = ExecutionSpec::new(work_dir)
        .with_command(compile_cmd.clone())
        .with_limits(ExecutionLimits {
            time_ms: config.compile_time_limit_ms,
            memory_mb: config.compile_memory_limit_mb,
        })
        .with_copy_out_dir(work_dir);

    let result = execute_sandboxed(&spec).await?;

    if result.is_success() {
        return Ok(Prepared::Ready(PreparedUnit {
            work_dir: work_dir.to_path_buf(),
            run_command: lang.run_command.clone(),
        }));
    }

    if matches!(result.status, ExecutionStatus::SandboxError) {
        anyhow::bail!("Sandbox fault during compilation");
    }

    let diagnostics = if !result.stderr.is_empty() {
        result.stderr
    } else if !result.stdout.is_empty() {
        result.stdout
    } else {
        match result.status {
            ExecutionStatus::TimeLimitExceeded => "Compilation timed out".to_string(),
            ExecutionStatus::MemoryLimitExceeded => {
                "Compilation exceeded the memory limit".to_string()
            }
            ExecutionStatus::Signaled(_) | ExecutionStatus::RuntimeError => {
                "Compiler crashed".to_string()
            }
            ExecutionStatus::Exited(code) => {
                format!("Compilation failed with exit code {}", code)
            }
            // Handled above
            ExecutionStatus::SandboxError => "Compilation failed".to_string(),
        }
    };

    Ok(Prepared::Failed { diagnostics })
}
