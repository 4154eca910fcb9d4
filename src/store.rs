//! Problem storage and the scored-submission log
//!
//! Problems live as one JSON file each in a directory loaded at startup.
//! The platform's real persistence layer is an external collaborator; this
//! store is the judging engine's read-only view of it.

use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// One test case of a problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub input_text: String,
    pub output_text: String,
    #[serde(default)]
    pub is_sample: bool,
    #[serde(default)]
    pub order: i32,
}

/// A problem with its ordered test cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub time_limit_ms: Option<u32>,
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    /// Sample cases in stored order
    pub fn sample_cases(&self) -> Vec<TestCase> {
        self.test_cases
            .iter()
            .filter(|tc| tc.is_sample)
            .cloned()
            .collect()
    }
}

/// In-memory view of the problem set
#[derive(Debug, Default)]
pub struct ProblemStore {
    problems: HashMap<i64, Problem>,
}

impl ProblemStore {
    /// Load every `*.json` problem file from a directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut problems = HashMap::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read problems directory {:?}", dir))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let mut problem: Problem = serde_json::from_str(&content)
                .with_context(|| format!("Invalid problem file {:?}", path))?;
            problem.test_cases.sort_by_key(|tc| tc.order);
            problems.insert(problem.id, problem);
        }

        info!("Loaded {} problems from {:?}", problems.len(), dir);
        Ok(Self { problems })
    }

    pub fn get(&self, id: i64) -> Option<&Problem> {
        self.problems.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// One scored submission, as recorded by the log
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub problem_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub language: String,
    pub verdict: String,
    pub passed: usize,
    pub total: usize,
    /// Unix timestamp in seconds
    pub created_at: u64,
}

impl SubmissionRecord {
    pub fn now(
        problem_id: i64,
        user_id: Option<String>,
        language: String,
        verdict: String,
        passed: usize,
        total: usize,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            problem_id,
            user_id,
            language,
            verdict,
            passed,
            total,
            created_at,
        }
    }
}

/// Append-only JSONL log of scored submissions.
///
/// Run-mode requests never touch this; only submit mode persists a record.
#[derive(Debug)]
pub struct SubmissionLog {
    path: std::path::PathBuf,
    // Serializes appends so records never interleave
    write_lock: Mutex<()>,
}

impl SubmissionLog {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, record: &SubmissionRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open submission log {:?}", self.path))?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
