//! HTTP surface
//!
//! Two submission endpoints share one pipeline: validate the request, pick
//! the case set for the mode, enqueue a judge job, and shape the outcome for
//! the client. `run` judges sample cases only and is never persisted;
//! `submit` judges the full case set and appends to the submission log.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::JudgeConfig;
use crate::error::ApiError;
use crate::languages;
use crate::scheduler::{JudgeJob, Mode, Scheduler, SchedulerError};
use crate::store::{Problem, ProblemStore, SubmissionLog, SubmissionRecord, TestCase};
use crate::submission::{format_result, SubmissionRequest, SubmissionResult};
use crate::verdict::JudgeOutcome;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<ProblemStore>,
    pub log: Option<Arc<SubmissionLog>>,
    pub config: Arc<JudgeConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submissions/run", post(run_submission))
        .route("/submissions/submit", post(submit_submission))
        .route("/languages", get(list_languages))
        .route("/health", get(health))
        .with_state(state)
}

async fn run_submission(
    State(state): State<AppState>,
    Json(req): Json<SubmissionRequest>,
) -> Result<Json<SubmissionResult>, ApiError> {
    judge_submission(state, req, Mode::Run).await
}

async fn submit_submission(
    State(state): State<AppState>,
    Json(req): Json<SubmissionRequest>,
) -> Result<Json<SubmissionResult>, ApiError> {
    judge_submission(state, req, Mode::Submit).await
}

async fn judge_submission(
    state: AppState,
    req: SubmissionRequest,
    mode: Mode,
) -> Result<Json<SubmissionResult>, ApiError> {
    if languages::get_language_config(&req.language).is_none() {
        return Err(ApiError::UnsupportedLanguage(req.language));
    }

    let problem = state
        .store
        .get(req.problem_id)
        .ok_or(ApiError::ProblemNotFound(req.problem_id))?;

    let cases = select_cases(mode, problem)?;

    let job = JudgeJob {
        problem_id: req.problem_id,
        user_id: req.user_id.clone(),
        language: req.language.clone(),
        code: req.code,
        mode,
        time_limit_ms: problem
            .time_limit_ms
            .unwrap_or(state.config.default_time_limit_ms),
        memory_limit_mb: problem
            .memory_limit_mb
            .unwrap_or(state.config.default_memory_limit_mb),
        cases: cases.clone(),
    };

    let result = match state.scheduler.submit(job).await {
        Ok(outcome) => {
            if let JudgeOutcome::Internal { message } = &outcome {
                warn!(
                    "Judging failed internally: problem_id={}: {}",
                    req.problem_id, message
                );
            }
            let result = format_result(mode, &cases, outcome);

            if mode == Mode::Submit {
                if let Some(log) = &state.log {
                    let record = SubmissionRecord::now(
                        req.problem_id,
                        req.user_id,
                        req.language,
                        result.verdict.to_string(),
                        result.passed,
                        result.total,
                    );
                    if let Err(e) = log.append(&record).await {
                        warn!("Failed to record submission: {:#}", e);
                    }
                }
            }

            result
        }
        Err(SchedulerError::UserBusy) => return Err(ApiError::UserBusy),
        Err(e @ (SchedulerError::QueueTimeout
        | SchedulerError::DeadlineExceeded
        | SchedulerError::Aborted)) => {
            // The submission was accepted but could not be judged; report it
            // as an internal-error verdict rather than an HTTP failure
            info!("Submission not judged: problem_id={}: {}", req.problem_id, e);
            SubmissionResult::internal_error(cases.len())
        }
    };

    Ok(Json(result))
}

/// Pick the case set for a judging mode, in stored order
fn select_cases(mode: Mode, problem: &Problem) -> Result<Vec<TestCase>, ApiError> {
    let selected = match mode {
        Mode::Run => problem.sample_cases(),
        Mode::Submit => problem.test_cases.clone(),
    };

    if selected.is_empty() {
        return Err(match mode {
            Mode::Run => ApiError::NoSampleCases(problem.id),
            Mode::Submit => ApiError::NoCases(problem.id),
        });
    }
    Ok(selected)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn list_languages() -> Json<Vec<String>> {
    Json(languages::get_supported_languages())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: i64, is_sample: bool) -> TestCase {
        TestCase {
            id,
            input_text: String::new(),
            output_text: String::new(),
            is_sample,
            order: id as i32,
        }
    }

    fn problem(id: i64, cases: Vec<TestCase>) -> Problem {
        Problem {
            id,
            title: None,
            time_limit_ms: None,
            memory_limit_mb: None,
            test_cases: cases,
        }
    }

    #[test]
    fn test_run_selects_samples_only() {
        let problem = problem(1, vec![case(1, true), case(2, false), case(3, true)]);
        let selected = select_cases(Mode::Run, &problem).unwrap();
        let ids: Vec<i64> = selected.iter().map(|tc| tc.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_submit_selects_all_cases() {
        let problem = problem(1, vec![case(1, true), case(2, false)]);
        let selected = select_cases(Mode::Submit, &problem).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_run_rejects_problem_without_samples() {
        let problem = problem(9, vec![case(1, false)]);
        let result = select_cases(Mode::Run, &problem);
        assert!(matches!(result, Err(ApiError::NoSampleCases(9))));
    }

    #[test]
    fn test_submit_rejects_empty_case_set() {
        let problem = problem(9, vec![]);
        let result = select_cases(Mode::Submit, &problem);
        assert!(matches!(result, Err(ApiError::NoCases(9))));
    }
}
