//! Sandboxed execution facade
//!
//! One call = one `(command, stdin, limits)` triple executed inside a
//! freshly initialized isolate box. Raw results only; verdict interpretation
//! lives in the judger.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use tokio::fs;

use crate::sandbox::{is_cgroups_available, IoSpec, IsolateBox, IsolateStatus, Limits};

/// Global counter for box ID allocation. Isolate supports box IDs 0-999 per
/// default configuration; the counter cycles within that range, and box 999
/// is reserved for the cgroup availability probe.
static BOX_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_box_id() -> u32 {
    BOX_ID_COUNTER.fetch_add(1, Ordering::Relaxed) % 999
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Time limit exceeded
    TimeLimitExceeded,
    /// Memory limit exceeded
    MemoryLimitExceeded,
    /// Killed by signal
    Signaled(i32),
    /// Runtime error (crash, etc.)
    RuntimeError,
    /// Fault in the sandbox itself, not the program under test
    SandboxError,
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Execution status
    pub status: ExecutionStatus,
    /// CPU time used in milliseconds
    pub time_ms: u32,
    /// Memory used in KB
    pub memory_kb: u32,
    /// Whether the run was forcibly terminated on timeout
    pub timed_out: bool,
    /// Whether the cgroup limit killed or starved the program
    pub oom: bool,
    /// Stdout content
    pub stdout: String,
    /// Stderr content
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Exited(0))
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Time limit in milliseconds
    pub time_ms: u32,
    /// Memory limit in MB
    pub memory_mb: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_ms: 2000,
            memory_mb: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    pub work_dir: std::path::PathBuf,
    pub command: Vec<String>,
    pub limits: ExecutionLimits,
    pub stdin: Option<String>,
    /// Directory to copy produced files to after execution (used for
    /// compilation, where the artifact must survive the box teardown)
    pub copy_out_dir: Option<std::path::PathBuf>,
}

impl ExecutionSpec {
    pub fn new(work_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            command: vec![],
            limits: ExecutionLimits::default(),
            stdin: None,
            copy_out_dir: None,
        }
    }

    pub fn with_command(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_copy_out_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.copy_out_dir = Some(dir.into());
        self
    }
}

/// Execute a command inside a single-use isolate box.
///
/// The box is released on every path after creation; an `Err` from this
/// function is an infrastructure fault (isolate unavailable, staging failed),
/// never a property of the program under test.
pub async fn execute_sandboxed(spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
    if spec.command.is_empty() {
        anyhow::bail!("No command specified for execution");
    }

    if !is_cgroups_available().await {
        anyhow::bail!("Cgroup support is required for sandboxed execution");
    }

    let box_id = next_box_id();
    let isolate_box = IsolateBox::new(box_id).await?;

    let result = run_in_box(&isolate_box, spec).await;
    isolate_box.release().await;
    result
}

async fn run_in_box(isolate_box: &IsolateBox, spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
    isolate_box.copy_dir_in(&spec.work_dir).await?;

    // Stage stdin as a file; isolate redirects it inside the box
    let stdin_file = if let Some(content) = &spec.stdin {
        let temp_file = tempfile::NamedTempFile::new()?;
        fs::write(temp_file.path(), content).await?;
        Some(temp_file)
    } else {
        None
    };

    let mut io = IoSpec::new();
    if let Some(ref temp_file) = stdin_file {
        io = io.with_stdin(temp_file.path());
    }

    let sandbox_limits = Limits {
        time_ms: spec.limits.time_ms,
        memory_mb: spec.limits.memory_mb,
        ..Limits::default()
    };

    let outcome = isolate_box.run(&spec.command, &sandbox_limits, &io).await?;

    if let Some(ref copy_out_dir) = spec.copy_out_dir {
        isolate_box.copy_dir_out(copy_out_dir).await?;
    }

    let memory_limit_kb = spec.limits.memory_mb * 1024;
    let oom = outcome.meta.oom_killed || outcome.meta.memory_kb > memory_limit_kb;

    let status = match outcome.meta.status {
        IsolateStatus::Ok if outcome.meta.exit_code == 0 => {
            if oom {
                ExecutionStatus::MemoryLimitExceeded
            } else {
                ExecutionStatus::Exited(0)
            }
        }
        IsolateStatus::Ok => ExecutionStatus::Exited(outcome.meta.exit_code),
        IsolateStatus::TimeOut => ExecutionStatus::TimeLimitExceeded,
        IsolateStatus::Signal(_) | IsolateStatus::RuntimeError if oom => {
            ExecutionStatus::MemoryLimitExceeded
        }
        IsolateStatus::Signal(sig) => ExecutionStatus::Signaled(sig),
        IsolateStatus::RuntimeError => ExecutionStatus::RuntimeError,
        IsolateStatus::InternalError => ExecutionStatus::SandboxError,
    };

    Ok(ExecutionOutcome {
        timed_out: matches!(status, ExecutionStatus::TimeLimitExceeded),
        oom,
        status,
        time_ms: outcome.meta.time_ms,
        memory_kb: outcome.meta.memory_kb,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
    })
}
