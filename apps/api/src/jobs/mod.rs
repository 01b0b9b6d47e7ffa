//! Typed AI jobs: what route handlers hand to the broker.
//!
//! Each request struct is tied to exactly one wire tag through `Job::TYPE`, so a
//! handler cannot submit a payload under the wrong tag. Reply payloads are
//! opaque to the broker; only the similarity score has a fixed shape callers rely on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::broker::{BrokerError, BrokerHub, JobType};

pub trait Job: Serialize + Send + Sync {
    const TYPE: JobType;
    type Reply: DeserializeOwned + Serialize + Send;

    /// Cheap shape checks before anything is published. Business rules belong to the worker.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Publishes `job` on its family's channel and waits for the typed reply.
pub async fn run<J: Job>(hub: &BrokerHub, job: &J) -> Result<J::Reply, BrokerError> {
    hub.call(J::TYPE, job).await
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} cannot be empty"))
    } else {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Similarity scoring
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityRequest {
    pub job_description: String,
    pub resume: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityScore {
    pub semantic_similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    pub score: SimilarityScore,
}

impl Job for SimilarityRequest {
    const TYPE: JobType = JobType::GetSimilarityScore;
    type Reply = SimilarityResult;

    fn validate(&self) -> Result<(), String> {
        require("job_description", &self.job_description)?;
        require("resume", &self.resume)
    }
}

/// Scores one job description against many resumes through bounded fan-out.
/// One entry per resume, in input order; a failed item does not fail the batch.
pub async fn score_resumes(
    hub: &BrokerHub,
    job_description: &str,
    resumes: &[String],
) -> Vec<Result<SimilarityResult, BrokerError>> {
    let payloads = resumes
        .iter()
        .map(|resume| {
            serde_json::json!({
                "job_description": job_description,
                "resume": resume,
            })
        })
        .collect();

    hub.submit_many(JobType::GetSimilarityScore, payloads)
        .await
        .into_iter()
        .map(|result| {
            result.and_then(|payload| {
                serde_json::from_value(payload).map_err(|e| {
                    BrokerError::MalformedEnvelope(format!("similarity payload: {e}"))
                })
            })
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Resume building and enhancement
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResumeRequest {
    pub user_id: Uuid,
    /// Free-form profile: education, experience, projects, skills.
    pub profile: Value,
    pub job_description: Option<String>,
}

impl Job for BuildResumeRequest {
    const TYPE: JobType = JobType::BuildResume;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        if self.profile.is_null() {
            return Err("profile is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceResumeRequest {
    pub resume: String,
    pub job_description: Option<String>,
}

impl Job for EnhanceResumeRequest {
    const TYPE: JobType = JobType::EnhanceResume;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("resume", &self.resume)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job scraping
// ────────────────────────────────────────────────────────────────────────────

/// Field names follow the scraper's camelCase contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJobsRequest {
    /// "internship", "full-time", ...
    pub job_type: String,
    pub role: String,
    pub location: String,
    pub years: String,
}

impl Job for ScrapeJobsRequest {
    const TYPE: JobType = JobType::ScrapeJobs;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("jobType", &self.job_type)?;
        require("role", &self.role)?;
        require("location", &self.location)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Career guidance
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRequest {
    pub current_role: String,
    pub target_role: String,
    pub years_experience: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Job for CheckpointRequest {
    const TYPE: JobType = JobType::GenerateCheckpoints;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("target_role", &self.target_role)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Interview preparation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewQuestionsRequest {
    pub role: String,
    pub job_description: String,
    pub resume: Option<String>,
    pub count: Option<u32>,
}

impl Job for InterviewQuestionsRequest {
    const TYPE: JobType = JobType::GenerateInterviewQuestions;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("role", &self.role)?;
        require("job_description", &self.job_description)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewAnalysisRequest {
    pub question: String,
    pub answer: String,
    pub role: Option<String>,
}

impl Job for InterviewAnalysisRequest {
    const TYPE: JobType = JobType::AnalyzeInterview;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("question", &self.question)?;
        require("answer", &self.answer)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cultural fit and outreach
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CulturalFitRequest {
    pub company: String,
    pub job_description: String,
    #[serde(default)]
    pub responses: Vec<String>,
}

impl Job for CulturalFitRequest {
    const TYPE: JobType = JobType::AnalyzeCulturalFit;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("company", &self.company)?;
        if self.responses.is_empty() {
            return Err("responses cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdApproachRequest {
    pub recipient_name: String,
    pub company: String,
    pub role: String,
    pub resume: String,
}

impl Job for ColdApproachRequest {
    const TYPE: JobType = JobType::GenerateColdApproach;
    type Reply = Value;

    fn validate(&self) -> Result<(), String> {
        require("company", &self.company)?;
        require("role", &self.role)?;
        require("resume", &self.resume)
    }
}
