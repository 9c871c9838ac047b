//! Trigger API Handlers
//!
//! Manual triggers (and rollbacks) plus the GitHub push webhook.

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use herald_core::dto::trigger::{TriggerOutcome, TriggerRequest};
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::webhook::{self, PushEvent, WebhookOutcome};

/// POST /webhooks/trigger
pub async fn manual_trigger(
    State(state): State<AppState>,
    Json(req): Json<TriggerRequest>,
) -> ApiResult<Json<TriggerOutcome>> {
    tracing::info!(
        "Manual trigger for project {} (commit: {:?})",
        req.project_id,
        req.commit_hash
    );

    let outcome = state.triggers.trigger(req).await?;
    Ok(Json(outcome))
}

/// POST /webhooks/github
pub async fn github_push(
    State(state): State<AppState>,
    GithubPayload(event): GithubPayload,
) -> ApiResult<Response> {
    let outcome = webhook::handle_push(state.projects.as_ref(), &state.triggers, event).await?;

    let response = match outcome {
        WebhookOutcome::NotAPush => (StatusCode::OK, "not a push event").into_response(),
        WebhookOutcome::Ignored => {
            (StatusCode::OK, "no auto-deploy project for this push").into_response()
        }
        WebhookOutcome::Triggered(outcome) => Json(outcome).into_response(),
    };
    Ok(response)
}

/// GitHub sends either `application/json` or a form with a `payload` field.
pub struct GithubPayload(pub PushEvent);

#[derive(Deserialize)]
struct FormPayload {
    payload: String,
}

impl<S> FromRequest<S> for GithubPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(form) = Form::<FormPayload>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            let event = serde_json::from_str(&form.payload)
                .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
            Ok(Self(event))
        } else {
            let Json(event) = Json::<PushEvent>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(event))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use tower::ServiceExt;

    use super::*;
    use crate::api::create_router;
    use crate::api::testing::app;
    use crate::repository::PipelineStore;
    use crate::service::trigger::testing::FakeRunner;
    use herald_core::domain::PipelineId;
    use herald_core::domain::pipeline::TriggerKind;

    fn push_json() -> serde_json::Value {
        serde_json::json!({
            "ref": "refs/heads/main",
            "after": "def456",
            "repository": {
                "clone_url": "https://github.com/acme/shop.git",
                "ssh_url": "git@github.com:acme/shop.git"
            },
            "head_commit": {
                "id": "abc123",
                "committer": { "username": "ada", "name": "Ada Lovelace" }
            }
        })
    }

    async fn register_shop(router: &axum::Router) {
        let request = axum::http::Request::builder()
            .method("PUT")
            .uri("/api/projects/shop")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "name": "shop",
                    "repoUrl": "https://github.com/acme/shop.git"
                })
                .to_string(),
            ))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ping_is_not_a_push() {
        let router = create_router(app(Arc::new(FakeRunner::answering(None))).state);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"zen":"Keep it logically awesome."}"#))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "not a push event");
    }

    #[tokio::test]
    async fn test_json_push_triggers_deploy() {
        let test_app = app(Arc::new(FakeRunner::answering(Some("run-9"))));
        let store = test_app.store.clone();
        let router = create_router(test_app.state);
        register_shop(&router).await;

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(push_json().to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let pipeline = store
            .find(&PipelineId::new("run-9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pipeline.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(pipeline.author.as_deref(), Some("ada"));
        assert_eq!(pipeline.trigger, Some(TriggerKind::Github));
    }

    #[tokio::test]
    async fn test_form_encoded_push_is_accepted() {
        let test_app = app(Arc::new(FakeRunner::answering(Some("run-3"))));
        let store = test_app.store.clone();
        let router = create_router(test_app.state);
        register_shop(&router).await;

        let encoded = reqwest::Url::parse_with_params(
            "http://localhost/",
            &[("payload", push_json().to_string())],
        )
        .unwrap();
        let form = encoded.query().unwrap().to_string();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(store.find(&PipelineId::new("run-3")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_push_to_other_branch_is_ignored() {
        let runner = Arc::new(FakeRunner::answering(Some("run-1")));
        let router = create_router(app(runner.clone()).state);
        register_shop(&router).await;

        let mut payload = push_json();
        payload["ref"] = serde_json::json!("refs/heads/feature");
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(runner.requests().is_empty());
    }
}
