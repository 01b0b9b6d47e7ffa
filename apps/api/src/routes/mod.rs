pub mod ai;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::jobs::{
    BuildResumeRequest, CheckpointRequest, ColdApproachRequest, CulturalFitRequest,
    EnhanceResumeRequest, InterviewAnalysisRequest, InterviewQuestionsRequest, ScrapeJobsRequest,
    SimilarityRequest,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Similarity scoring
        .route(
            "/api/v1/ai/similarity",
            post(ai::handle_job::<SimilarityRequest>),
        )
        .route(
            "/api/v1/ai/similarity/batch",
            post(ai::handle_similarity_batch),
        )
        // Resume
        .route(
            "/api/v1/ai/resume/build",
            post(ai::handle_job::<BuildResumeRequest>),
        )
        .route(
            "/api/v1/ai/resume/enhance",
            post(ai::handle_job::<EnhanceResumeRequest>),
        )
        // Jobs and career guidance
        .route(
            "/api/v1/ai/jobs/scrape",
            post(ai::handle_job::<ScrapeJobsRequest>),
        )
        .route(
            "/api/v1/ai/checkpoints",
            post(ai::handle_job::<CheckpointRequest>),
        )
        // Interview preparation
        .route(
            "/api/v1/ai/interview/questions",
            post(ai::handle_job::<InterviewQuestionsRequest>),
        )
        .route(
            "/api/v1/ai/interview/analysis",
            post(ai::handle_job::<InterviewAnalysisRequest>),
        )
        .route(
            "/api/v1/ai/cultural-fit",
            post(ai::handle_job::<CulturalFitRequest>),
        )
        .route(
            "/api/v1/ai/cold-approach",
            post(ai::handle_job::<ColdApproachRequest>),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::broker::testing::{spawn_worker, InMemoryBroker};
    use crate::broker::{BrokerHub, BrokerSettings, JobFamily};

    async fn app(broker: &Arc<InMemoryBroker>) -> Router {
        let hub = BrokerHub::start(
            broker.clone(),
            BrokerSettings {
                request_timeout: Duration::from_millis(200),
                ..BrokerSettings::default()
            },
        );
        assert!(hub.wait_until_connected(Duration::from_secs(5)).await);
        build_router(AppState {
            broker: Arc::new(hub),
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_every_family() {
        let broker = InMemoryBroker::new();
        let app = app(&broker).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["broker"].as_array().unwrap().len(), JobFamily::COUNT);
        assert_eq!(body["broker"][0]["state"], "connected");
    }

    #[tokio::test]
    async fn test_similarity_embeds_worker_payload() {
        let broker = InMemoryBroker::new();
        let app = app(&broker).await;
        spawn_worker(broker.clone(), JobFamily::Similarity, |_| {
            Some(json!({ "score": { "semantic_similarity": 0.62 } }))
        })
        .await;

        let (status, body) = post_json(
            app,
            "/api/v1/ai/similarity",
            json!({ "job_description": "Backend", "resume": "Rust" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_type"], "GET_SIMILARITY_SCORE");
        assert_eq!(body["result"]["score"]["semantic_similarity"], 0.62);
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_before_publishing() {
        let broker = InMemoryBroker::new();
        let app = app(&broker).await;

        let (status, body) = post_json(
            app,
            "/api/v1/ai/similarity",
            json!({ "job_description": "", "resume": "Rust" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unanswered_job_maps_to_generic_server_error() {
        let broker = InMemoryBroker::new();
        let app = app(&broker).await;

        let (status, body) = post_json(
            app,
            "/api/v1/ai/jobs/scrape",
            json!({
                "jobType": "internship",
                "role": "Software Engineer",
                "location": "New York",
                "years": "2",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "BROKER_ERROR");
        assert_eq!(body["error"]["message"], "The AI job could not be completed");
    }

    #[tokio::test]
    async fn test_batch_reports_per_item_results() {
        let broker = InMemoryBroker::new();
        let app = app(&broker).await;
        spawn_worker(broker.clone(), JobFamily::Similarity, |job| {
            let resume = job.data["resume"].as_str().unwrap();
            (resume != "skip").then(|| json!({ "score": { "semantic_similarity": 0.5 } }))
        })
        .await;

        let (status, body) = post_json(
            app,
            "/api/v1/ai/similarity/batch",
            json!({ "job_description": "jd", "resumes": ["a", "skip", "c"] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["results"][0]["score"]["semantic_similarity"], 0.5);
        assert!(body["results"][1]["score"].is_null());
        assert_eq!(body["results"][1]["error"], "scoring failed");
    }
}
