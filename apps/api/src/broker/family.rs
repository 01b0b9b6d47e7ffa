//! Job families, request tags and reply tags.
//!
//! Tag strings and channel names are a wire contract with the worker fleet.
//! Renaming any of them is a breaking protocol change and must be rolled out
//! together with the workers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A category of AI workload with its own channel pair and correlation space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    Similarity,
    ResumeBuilder,
    JobScraper,
    Interview,
    CulturalFit,
    ColdOutreach,
    Enhancement,
    CareerGuidance,
}

impl JobFamily {
    pub const COUNT: usize = 8;

    /// Every family, in discriminant order. `BrokerHub` indexes its clients by this order.
    pub const ALL: [JobFamily; Self::COUNT] = [
        JobFamily::Similarity,
        JobFamily::ResumeBuilder,
        JobFamily::JobScraper,
        JobFamily::Interview,
        JobFamily::CulturalFit,
        JobFamily::ColdOutreach,
        JobFamily::Enhancement,
        JobFamily::CareerGuidance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobFamily::Similarity => "similarity",
            JobFamily::ResumeBuilder => "resume_builder",
            JobFamily::JobScraper => "job_scraper",
            JobFamily::Interview => "interview",
            JobFamily::CulturalFit => "cultural_fit",
            JobFamily::ColdOutreach => "cold_outreach",
            JobFamily::Enhancement => "enhancement",
            JobFamily::CareerGuidance => "career_guidance",
        }
    }

    /// Channel this family publishes job envelopes on.
    pub fn request_channel(self) -> &'static str {
        match self {
            JobFamily::Similarity => "similarity_requests",
            JobFamily::ResumeBuilder => "resume_builder_requests",
            JobFamily::JobScraper => "job_scraper_requests",
            JobFamily::Interview => "interview_requests",
            JobFamily::CulturalFit => "cultural_fit_requests",
            JobFamily::ColdOutreach => "cold_outreach_requests",
            JobFamily::Enhancement => "enhancement_requests",
            JobFamily::CareerGuidance => "career_guidance_requests",
        }
    }

    /// Channel workers publish response envelopes on.
    pub fn reply_channel(self) -> &'static str {
        match self {
            JobFamily::Similarity => "similarity_responses",
            JobFamily::ResumeBuilder => "resume_builder_responses",
            JobFamily::JobScraper => "job_scraper_responses",
            JobFamily::Interview => "interview_responses",
            JobFamily::CulturalFit => "cultural_fit_responses",
            JobFamily::ColdOutreach => "cold_outreach_responses",
            JobFamily::Enhancement => "enhancement_responses",
            JobFamily::CareerGuidance => "career_guidance_responses",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// True if `kind` is a reply this family's workers may send.
    pub fn accepts(self, kind: ResponseKind) -> bool {
        kind.family() == self
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request tag carried in the `type` field of a job envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    GetSimilarityScore,
    BuildResume,
    ScrapeJobs,
    GenerateCheckpoints,
    GenerateInterviewQuestions,
    AnalyzeInterview,
    AnalyzeCulturalFit,
    GenerateColdApproach,
    EnhanceResume,
}

impl JobType {
    pub fn family(self) -> JobFamily {
        match self {
            JobType::GetSimilarityScore => JobFamily::Similarity,
            JobType::BuildResume => JobFamily::ResumeBuilder,
            JobType::ScrapeJobs => JobFamily::JobScraper,
            JobType::GenerateCheckpoints => JobFamily::CareerGuidance,
            JobType::GenerateInterviewQuestions | JobType::AnalyzeInterview => {
                JobFamily::Interview
            }
            JobType::AnalyzeCulturalFit => JobFamily::CulturalFit,
            JobType::GenerateColdApproach => JobFamily::ColdOutreach,
            JobType::EnhanceResume => JobFamily::Enhancement,
        }
    }

    /// The reply tag a worker echoes for this request.
    pub fn reply_kind(self) -> ResponseKind {
        match self {
            JobType::GetSimilarityScore => ResponseKind::SimilarityScore,
            JobType::BuildResume => ResponseKind::ResumeBuilt,
            JobType::ScrapeJobs => ResponseKind::JobsScraped,
            JobType::GenerateCheckpoints => ResponseKind::Checkpoints,
            JobType::GenerateInterviewQuestions => ResponseKind::InterviewQuestions,
            JobType::AnalyzeInterview => ResponseKind::InterviewAnalysis,
            JobType::AnalyzeCulturalFit => ResponseKind::CulturalFit,
            JobType::GenerateColdApproach => ResponseKind::ColdApproach,
            JobType::EnhanceResume => ResponseKind::ResumeEnhanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::GetSimilarityScore => "GET_SIMILARITY_SCORE",
            JobType::BuildResume => "BUILD_RESUME",
            JobType::ScrapeJobs => "SCRAPE_JOBS",
            JobType::GenerateCheckpoints => "GENERATE_CHECKPOINTS",
            JobType::GenerateInterviewQuestions => "GENERATE_INTERVIEW_QUESTIONS",
            JobType::AnalyzeInterview => "ANALYZE_INTERVIEW",
            JobType::AnalyzeCulturalFit => "ANALYZE_CULTURAL_FIT",
            JobType::GenerateColdApproach => "GENERATE_COLD_APPROACH",
            JobType::EnhanceResume => "ENHANCE_RESUME",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply tag carried in the `type` field of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    SimilarityScore,
    ResumeBuilt,
    JobsScraped,
    Checkpoints,
    InterviewQuestions,
    InterviewAnalysis,
    CulturalFit,
    ColdApproach,
    ResumeEnhanced,
}

impl ResponseKind {
    pub fn family(self) -> JobFamily {
        match self {
            ResponseKind::SimilarityScore => JobFamily::Similarity,
            ResponseKind::ResumeBuilt => JobFamily::ResumeBuilder,
            ResponseKind::JobsScraped => JobFamily::JobScraper,
            ResponseKind::Checkpoints => JobFamily::CareerGuidance,
            ResponseKind::InterviewQuestions | ResponseKind::InterviewAnalysis => {
                JobFamily::Interview
            }
            ResponseKind::CulturalFit => JobFamily::CulturalFit,
            ResponseKind::ColdApproach => JobFamily::ColdOutreach,
            ResponseKind::ResumeEnhanced => JobFamily::Enhancement,
        }
    }
}
