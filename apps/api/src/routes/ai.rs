//! Axum route handlers for the AI job endpoints.
//!
//! Handlers only validate shape, submit through the broker hub, and embed the
//! worker's payload in the response. Interpreting the payload is up to the client.

use axum::{extract::State, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::broker::JobType;
use crate::errors::AppError;
use crate::jobs::{self, Job, SimilarityScore};
use crate::state::AppState;

/// Upper bound on resumes per batch request; the broker bounds concurrency, this bounds total work.
const MAX_BATCH_RESUMES: usize = 500;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct JobResponse<T> {
    pub job_type: JobType,
    pub result: T,
}

#[derive(Debug, Deserialize)]
pub struct BatchSimilarityRequest {
    pub job_description: String,
    pub resumes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub score: Option<SimilarityScore>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchSimilarityResponse {
    pub results: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ai/{similarity, resume/build, resume/enhance, jobs/scrape, checkpoints,
/// interview/questions, interview/analysis, cultural-fit, cold-approach}
///
/// One handler per `Job` type: validate, submit, wait for the correlated reply.
pub async fn handle_job<J>(
    State(state): State<AppState>,
    Json(job): Json<J>,
) -> Result<Json<JobResponse<J::Reply>>, AppError>
where
    J: Job + DeserializeOwned,
{
    job.validate().map_err(AppError::Validation)?;

    let result = jobs::run(&state.broker, &job).await?;

    Ok(Json(JobResponse {
        job_type: J::TYPE,
        result,
    }))
}

/// POST /api/v1/ai/similarity/batch
///
/// Scores one job description against many resumes with bounded fan-out.
/// Per-item failures are reported inline; the request itself still succeeds.
pub async fn handle_similarity_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchSimilarityRequest>,
) -> Result<Json<BatchSimilarityResponse>, AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "job_description cannot be empty".to_string(),
        ));
    }
    if request.resumes.is_empty() {
        return Err(AppError::Validation("resumes cannot be empty".to_string()));
    }
    if request.resumes.len() > MAX_BATCH_RESUMES {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH_RESUMES} resumes per batch"
        )));
    }

    let outcomes =
        jobs::score_resumes(&state.broker, &request.job_description, &request.resumes).await;

    let results: Vec<BatchItem> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(result) => BatchItem {
                index,
                score: Some(result.score),
                error: None,
            },
            Err(e) => {
                tracing::warn!(index, "Batch similarity item failed: {e}");
                BatchItem {
                    index,
                    score: None,
                    error: Some("scoring failed".to_string()),
                }
            }
        })
        .collect();

    let succeeded = results.iter().filter(|item| item.score.is_some()).count();

    Ok(Json(BatchSimilarityResponse {
        failed: results.len() - succeeded,
        succeeded,
        results,
    }))
}
