//! Judging outcome model and verdict aggregation
//!
//! User code failures are values here, never errors: a crash, timeout, or
//! wrong answer is a `CaseOutcome`, and the overall verdict is a pure fold
//! over the ordered case outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall verdict for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// All cases passed
    #[serde(rename = "AC")]
    Accepted,
    /// Wrong output on at least one case
    #[serde(rename = "WA")]
    WrongAnswer,
    /// Time limit exceeded on at least one case
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    /// Compilation failed; no case was attempted
    #[serde(rename = "CE")]
    CompileError,
    /// Runtime crash or out-of-memory kill
    #[serde(rename = "RE")]
    RuntimeError,
    /// Fault in the judging infrastructure, not the submitted code
    #[serde(rename = "IE")]
    InternalError,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::CompileError => "CE",
            Verdict::RuntimeError => "RE",
            Verdict::InternalError => "IE",
        };
        write!(f, "{}", s)
    }
}

/// Per-case status, surfaced to the client per visible case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
}

/// Outcome of one test case execution
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub case_id: i64,
    pub is_sample: bool,
    pub passed: bool,
    pub status: CaseStatus,
    /// Captured stdout, truncated to the configured preview limit
    pub stdout: String,
    /// Captured stderr, truncated to the configured preview limit
    pub stderr: String,
    pub time_ms: u32,
    pub memory_kb: u32,
    pub timed_out: bool,
    pub oom: bool,
}

/// Result of processing one judge job
#[derive(Debug)]
pub enum JudgeOutcome {
    /// Compilation failed; diagnostics are the compiler output verbatim
    CompileError {
        compile_output: String,
        total: usize,
    },
    /// Every case was executed; outcomes preserve the input case order
    Judged { cases: Vec<CaseOutcome> },
    /// The judging infrastructure failed; the submission was not at fault
    Internal { message: String },
}

/// Reduce ordered case outcomes into the overall verdict.
///
/// Priority: RE > TLE > WA > AC, scanned across all cases. OOM kills count
/// as runtime errors. Compile and internal errors are decided before this
/// fold ever runs, so they do not appear here.
pub fn aggregate(cases: &[CaseOutcome]) -> Verdict {
    let crashed = cases.iter().any(|c| {
        c.oom
            || matches!(
                c.status,
                CaseStatus::RuntimeError | CaseStatus::MemoryLimitExceeded
            )
    });
    if crashed {
        return Verdict::RuntimeError;
    }
    if cases.iter().any(|c| c.timed_out) {
        return Verdict::TimeLimitExceeded;
    }
    if cases.iter().any(|c| !c.passed) {
        return Verdict::WrongAnswer;
    }
    Verdict::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(status: CaseStatus) -> CaseOutcome {
        CaseOutcome {
            case_id: 0,
            is_sample: true,
            passed: status == CaseStatus::Accepted,
            status,
            stdout: String::new(),
            stderr: String::new(),
            time_ms: 10,
            memory_kb: 1024,
            timed_out: status == CaseStatus::TimeLimitExceeded,
            oom: status == CaseStatus::MemoryLimitExceeded,
        }
    }

    #[test]
    fn test_all_passed_is_accepted() {
        let cases = vec![case(CaseStatus::Accepted), case(CaseStatus::Accepted)];
        assert_eq!(aggregate(&cases), Verdict::Accepted);
    }

    #[test]
    fn test_empty_is_accepted() {
        // The handlers reject empty case lists before judging; a vacuous
        // fold still has a defined result
        assert_eq!(aggregate(&[]), Verdict::Accepted);
    }

    #[test]
    fn test_wrong_answer() {
        let cases = vec![case(CaseStatus::Accepted), case(CaseStatus::WrongAnswer)];
        assert_eq!(aggregate(&cases), Verdict::WrongAnswer);
    }

    #[test]
    fn test_tle_beats_wa() {
        let cases = vec![
            case(CaseStatus::WrongAnswer),
            case(CaseStatus::TimeLimitExceeded),
        ];
        assert_eq!(aggregate(&cases), Verdict::TimeLimitExceeded);
    }

    #[test]
    fn test_re_beats_tle_and_wa() {
        let cases = vec![
            case(CaseStatus::TimeLimitExceeded),
            case(CaseStatus::RuntimeError),
            case(CaseStatus::WrongAnswer),
        ];
        assert_eq!(aggregate(&cases), Verdict::RuntimeError);
    }

    #[test]
    fn test_oom_counts_as_runtime_error() {
        let cases = vec![
            case(CaseStatus::Accepted),
            case(CaseStatus::MemoryLimitExceeded),
        ];
        assert_eq!(aggregate(&cases), Verdict::RuntimeError);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let cases = vec![
            case(CaseStatus::Accepted),
            case(CaseStatus::TimeLimitExceeded),
            case(CaseStatus::WrongAnswer),
        ];
        let first = aggregate(&cases);
        for _ in 0..10 {
            assert_eq!(aggregate(&cases), first);
        }
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"TLE\""
        );
        assert_eq!(serde_json::to_string(&Verdict::Accepted).unwrap(), "\"AC\"");
        assert_eq!(
            serde_json::to_string(&Verdict::InternalError).unwrap(),
            "\"IE\""
        );
    }

    #[test]
    fn test_case_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&CaseStatus::WrongAnswer).unwrap(),
            "\"Wrong Answer\""
        );
    }
}
