//! Submission wire types and result shaping
//!
//! This is the boundary the client consumes. Hidden test cases never leak
//! through it: their input, expected output, and captured output are all
//! withheld, and they surface only as pass/fail entries plus the rolled-up
//! `hidden` counters.

use serde::{Deserialize, Serialize};

use crate::scheduler::Mode;
use crate::store::TestCase;
use crate::verdict::{aggregate, CaseStatus, JudgeOutcome, Verdict};

/// Request body for `POST /submissions/run` and `POST /submissions/submit`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub problem_id: i64,
    pub language: String,
    pub code: String,
    /// Optional caller identity, used for fair scheduling and the submission log
    #[serde(default)]
    pub user_id: Option<String>,
}

/// One case as returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct CaseView {
    pub id: i64,
    pub is_sample: bool,
    pub passed: bool,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u32>,
}

/// Pass/fail rollup for hidden cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenSummary {
    pub passed: usize,
    pub total: usize,
}

/// Response body for both submission endpoints
#[derive(Debug, Serialize)]
pub struct SubmissionResult {
    pub verdict: Verdict,
    pub passed: usize,
    pub total: usize,
    pub cases: Vec<CaseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<HiddenSummary>,
    /// Compiler diagnostics, present only for compile errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_output: Option<String>,
}

impl SubmissionResult {
    /// Result shape for infrastructure failures: the submission is not
    /// scored and nothing about the cases is revealed
    pub fn internal_error(total: usize) -> Self {
        Self {
            verdict: Verdict::InternalError,
            passed: 0,
            total,
            cases: vec![],
            hidden: None,
            compile_output: None,
        }
    }
}

/// Shape a judge outcome into the external contract.
///
/// `cases_meta` is the same ordered case list the job was built from; for a
/// judged outcome the executor guarantees one outcome per case in that order.
pub fn format_result(
    mode: Mode,
    cases_meta: &[TestCase],
    outcome: JudgeOutcome,
) -> SubmissionResult {
    let hidden_total = cases_meta.iter().filter(|tc| !tc.is_sample).count();

    match outcome {
        JudgeOutcome::CompileError {
            compile_output,
            total,
        } => SubmissionResult {
            verdict: Verdict::CompileError,
            passed: 0,
            total,
            cases: vec![],
            hidden: (mode == Mode::Submit).then_some(HiddenSummary {
                passed: 0,
                total: hidden_total,
            }),
            compile_output: Some(compile_output),
        },

        JudgeOutcome::Judged { cases } => {
            debug_assert_eq!(cases.len(), cases_meta.len());

            let passed = cases.iter().filter(|c| c.passed).count();
            let total = cases.len();
            let verdict = aggregate(&cases);

            let hidden_passed = cases
                .iter()
                .filter(|c| !c.is_sample && c.passed)
                .count();

            let views = cases
                .into_iter()
                .zip(cases_meta.iter())
                .map(|(case, meta)| {
                    debug_assert_eq!(case.case_id, meta.id);
                    if case.is_sample {
                        CaseView {
                            id: case.case_id,
                            is_sample: true,
                            passed: case.passed,
                            status: case.status,
                            input_text: Some(meta.input_text.clone()),
                            output_text: Some(meta.output_text.clone()),
                            stdout: Some(case.stdout),
                            stderr: Some(case.stderr),
                            time_ms: Some(case.time_ms),
                            memory_kb: Some(case.memory_kb),
                        }
                    } else {
                        // Hidden case: pass/fail only, no raw text
                        CaseView {
                            id: case.case_id,
                            is_sample: false,
                            passed: case.passed,
                            status: case.status,
                            input_text: None,
                            output_text: None,
                            stdout: None,
                            stderr: None,
                            time_ms: None,
                            memory_kb: None,
                        }
                    }
                })
                .collect();

            SubmissionResult {
                verdict,
                passed,
                total,
                cases: views,
                hidden: (mode == Mode::Submit).then_some(HiddenSummary {
                    passed: hidden_passed,
                    total: hidden_total,
                }),
                compile_output: None,
            }
        }

        JudgeOutcome::Internal { message: _ } => {
            SubmissionResult::internal_error(cases_meta.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::CaseOutcome;

    fn meta(id: i64, is_sample: bool) -> TestCase {
        TestCase {
            id,
            input_text: format!("in-{}", id),
            output_text: format!("out-{}", id),
            is_sample,
            order: id as i32,
        }
    }

    fn outcome(id: i64, is_sample: bool, passed: bool) -> CaseOutcome {
        CaseOutcome {
            case_id: id,
            is_sample,
            passed,
            status: if passed {
                CaseStatus::Accepted
            } else {
                CaseStatus::WrongAnswer
            },
            stdout: format!("got-{}", id),
            stderr: String::new(),
            time_ms: 12,
            memory_kb: 2048,
            timed_out: false,
            oom: false,
        }
    }

    #[test]
    fn test_scenario_all_pass_with_hidden_summary() {
        // 2 sample + 1 hidden, all passing, submit mode
        let metas = vec![meta(1, true), meta(2, true), meta(3, false)];
        let judged = JudgeOutcome::Judged {
            cases: vec![
                outcome(1, true, true),
                outcome(2, true, true),
                outcome(3, false, true),
            ],
        };

        let result = format_result(Mode::Submit, &metas, judged);
        assert_eq!(result.verdict, Verdict::Accepted);
        assert_eq!(result.passed, 3);
        assert_eq!(result.total, 3);
        let hidden = result.hidden.unwrap();
        assert_eq!(hidden.passed, 1);
        assert_eq!(hidden.total, 1);
    }

    #[test]
    fn test_compile_error_shape() {
        let metas = vec![meta(1, true), meta(2, false)];
        let outcome = JudgeOutcome::CompileError {
            compile_output: "main.cpp:1: error: expected ';'".into(),
            total: 2,
        };

        let result = format_result(Mode::Submit, &metas, outcome);
        assert_eq!(result.verdict, Verdict::CompileError);
        assert_eq!(result.passed, 0);
        assert_eq!(result.total, 2);
        assert!(result.cases.is_empty());
        assert!(!result.compile_output.unwrap().is_empty());
    }

    #[test]
    fn test_hidden_case_confidentiality() {
        let metas = vec![meta(1, true), meta(2, false)];
        let judged = JudgeOutcome::Judged {
            cases: vec![outcome(1, true, true), outcome(2, false, false)],
        };

        let result = format_result(Mode::Submit, &metas, judged);
        let hidden_case = &result.cases[1];
        assert!(!hidden_case.is_sample);
        assert!(hidden_case.input_text.is_none());
        assert!(hidden_case.output_text.is_none());
        assert!(hidden_case.stdout.is_none());
        assert!(hidden_case.stderr.is_none());

        // The serialized form omits the withheld fields entirely
        let json = serde_json::to_value(&result).unwrap();
        let case_json = &json["cases"][1];
        assert!(case_json.get("input_text").is_none());
        assert!(case_json.get("stdout").is_none());
    }

    #[test]
    fn test_sample_case_carries_full_io() {
        let metas = vec![meta(1, true)];
        let judged = JudgeOutcome::Judged {
            cases: vec![outcome(1, true, false)],
        };

        let result = format_result(Mode::Run, &metas, judged);
        assert_eq!(result.verdict, Verdict::WrongAnswer);
        let case = &result.cases[0];
        assert_eq!(case.input_text.as_deref(), Some("in-1"));
        assert_eq!(case.output_text.as_deref(), Some("out-1"));
        assert_eq!(case.stdout.as_deref(), Some("got-1"));
    }

    #[test]
    fn test_run_mode_has_no_hidden_summary() {
        let metas = vec![meta(1, true)];
        let judged = JudgeOutcome::Judged {
            cases: vec![outcome(1, true, true)],
        };

        let result = format_result(Mode::Run, &metas, judged);
        assert!(result.hidden.is_none());
    }

    #[test]
    fn test_case_order_is_preserved() {
        let metas = vec![meta(5, true), meta(6, false), meta(7, true)];
        let judged = JudgeOutcome::Judged {
            cases: vec![
                outcome(5, true, true),
                outcome(6, false, true),
                outcome(7, true, true),
            ],
        };

        let result = format_result(Mode::Submit, &metas, judged);
        let ids: Vec<i64> = result.cases.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_internal_error_shape() {
        let metas = vec![meta(1, true), meta(2, false)];
        let result = format_result(
            Mode::Submit,
            &metas,
            JudgeOutcome::Internal {
                message: "sandbox unavailable".into(),
            },
        );
        assert_eq!(result.verdict, Verdict::InternalError);
        assert_eq!(result.passed, 0);
        assert_eq!(result.total, 2);
        assert!(result.cases.is_empty());
    }
}
