//! API Module
//!
//! HTTP API layer for the relay.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod pipeline;
pub mod project;
pub mod webhook;
pub mod ws;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use herald_core::template::{TemplateRegistry, TemplateVersion};
use tower_http::trace::TraceLayer;

use crate::broadcast::ProjectChannels;
use crate::bus::BusPublisher;
use crate::repository::{PipelineStore, ProjectStore};
use crate::service::trigger::TriggerService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipelines: Arc<dyn PipelineStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub templates: Arc<TemplateRegistry>,
    pub channels: Arc<ProjectChannels>,
    pub triggers: Arc<TriggerService>,
    pub publisher: Arc<dyn BusPublisher>,
    /// Template for projects and pipelines that do not name one
    pub default_template: TemplateVersion,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Project endpoints
        .route(
            "/api/projects/{id}",
            put(project::register_project).get(project::get_project),
        )
        .route("/api/projects/{id}/bootstrap", get(project::bootstrap))
        .route(
            "/api/projects/{id}/rollback-candidates",
            get(project::rollback_candidates),
        )
        // Pipeline endpoints
        .route("/api/pipelines", post(pipeline::register_pipeline))
        .route(
            "/api/pipelines/project/{project_id}",
            get(pipeline::list_by_project),
        )
        .route("/api/pipelines/{id}", get(pipeline::get_pipeline))
        .route("/api/pipelines/{id}/view", get(pipeline::get_view))
        // Runner event intake
        .route("/api/events/{channel}", post(event::publish_event))
        // Triggers
        .route("/webhooks/trigger", post(webhook::manual_trigger))
        .route("/webhooks/github", post(webhook::github_push))
        // Observers
        .route("/ws/projects/{id}", get(ws::project_socket))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod testing {
    //! A fully in-memory application for router tests.

    use super::*;
    use crate::bus::memory::{MemoryBus, MemorySubscriber};
    use crate::repository::memory::InMemoryStore;
    use crate::service::dispatcher::BroadcastDispatcher;
    use crate::service::trigger::RunnerHandoff;
    use herald_core::template::FIVE_STAGE;

    pub struct TestApp {
        pub state: AppState,
        pub store: InMemoryStore,
        pub subscriber: MemorySubscriber,
    }

    pub fn app(runner: Arc<dyn RunnerHandoff>) -> TestApp {
        let store = InMemoryStore::new();
        let (bus, subscriber) = MemoryBus::new();
        let templates = Arc::new(TemplateRegistry::builtin().unwrap());
        let channels = Arc::new(ProjectChannels::new(16));
        let dispatcher = BroadcastDispatcher::new(channels.clone(), templates.clone());
        let triggers = TriggerService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            runner,
            dispatcher,
            chrono::Duration::seconds(5),
        );

        let state = AppState {
            pipelines: Arc::new(store.clone()),
            projects: Arc::new(store.clone()),
            templates,
            channels,
            triggers: Arc::new(triggers),
            publisher: Arc::new(bus),
            default_template: FIVE_STAGE,
        };

        TestApp {
            state,
            store,
            subscriber,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::testing::app;
    use super::*;
    use crate::service::trigger::UnconfiguredRunner;
    use crate::service::trigger::testing::FakeRunner;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn shop() -> serde_json::Value {
        serde_json::json!({
            "name": "shop",
            "repoUrl": "https://github.com/acme/shop.git",
            "templateVersion": 2
        })
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(app(Arc::new(UnconfiguredRunner)).state);
        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_fetch_project() {
        let router = create_router(app(Arc::new(UnconfiguredRunner)).state);

        let response = router
            .clone()
            .oneshot(json_request("PUT", "/api/projects/shop", shop()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.oneshot(get("/api/projects/shop")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let project = body_json(response).await;
        assert_eq!(project["branch"], "main");
        assert_eq!(project["autoDeploy"], true);
        assert_eq!(project["templateVersion"], 2);
    }

    #[tokio::test]
    async fn test_invalid_project_is_bad_request() {
        let router = create_router(app(Arc::new(UnconfiguredRunner)).state);
        let response = router
            .oneshot(json_request(
                "PUT",
                "/api/projects/shop",
                serde_json::json!({ "name": "", "repoUrl": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_pipeline_registration_and_reads() {
        let router = create_router(app(Arc::new(UnconfiguredRunner)).state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipelines",
                serde_json::json!({ "id": "run-1", "projectId": "shop", "commitHash": "abc" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .clone()
            .oneshot(get("/api/pipelines/project/shop"))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], "run-1");

        let response = router
            .clone()
            .oneshot(get("/api/pipelines/run-1/view"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["stages"].as_array().unwrap().len(), 5);

        let response = router.oneshot(get("/api/pipelines/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_without_runner_is_bad_gateway() {
        let router = create_router(app(Arc::new(UnconfiguredRunner)).state);
        router
            .clone()
            .oneshot(json_request("PUT", "/api/projects/shop", shop()))
            .await
            .unwrap();

        let response = router
            .oneshot(json_request(
                "POST",
                "/webhooks/trigger",
                serde_json::json!({ "projectId": "shop" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_trigger_unknown_project_is_not_found() {
        let router = create_router(app(Arc::new(FakeRunner::answering(None))).state);
        let response = router
            .oneshot(json_request(
                "POST",
                "/webhooks/trigger",
                serde_json::json!({ "projectId": "ghost" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_attributed_by_ack() {
        let router = create_router(app(Arc::new(FakeRunner::answering(Some("run-7")))).state);
        router
            .clone()
            .oneshot(json_request("PUT", "/api/projects/shop", shop()))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/webhooks/trigger",
                serde_json::json!({ "projectId": "shop", "commitHash": "abc", "author": "ada" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "status": "attributed", "pipelineId": "run-7" })
        );

        let response = router.oneshot(get("/api/pipelines/run-7")).await.unwrap();
        let pipeline = body_json(response).await;
        assert_eq!(pipeline["commitHash"], "abc");
        assert_eq!(pipeline["trigger"], "manual");
    }
}
