//! HTTP fallback API.
//!
//! `POST /api/messages` appends a text message exactly as the socket path
//! would and broadcasts it to connected sessions. `GET /api/health` reports
//! the hub's counters.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use walkie_common::SendMessagePayload;

use crate::hub::PostOutcome;
use crate::session::HubHandle;

/// Request body for `POST /api/messages`. Fields are optional so that a
/// missing one maps to 400 rather than a framework rejection.
#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub id: Option<String>,
    pub user: Option<String>,
    pub text: Option<String>,
}

pub fn router(hub: HubHandle) -> Router {
    Router::new()
        .route("/api/messages", post(post_message))
        .route("/api/health", get(health))
        .with_state(hub)
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

async fn post_message(
    State(hub): State<HubHandle>,
    body: Result<Json<PostMessageBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.body_text()),
    };

    let user = body.user.filter(|u| !u.trim().is_empty());
    let text = body.text.filter(|t| !t.is_empty());
    let (Some(user), Some(text)) = (user, text) else {
        return error(StatusCode::BAD_REQUEST, "user and text are required");
    };

    let payload = SendMessagePayload {
        id: body.id,
        user,
        text,
    };
    match hub.post_message(payload).await {
        Ok(PostOutcome::Created(msg)) => {
            tracing::debug!(id = %msg.id, "Message posted over HTTP");
            (StatusCode::CREATED, Json(msg)).into_response()
        }
        Ok(PostOutcome::Duplicate(msg)) => (StatusCode::OK, Json(msg)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Hub unavailable for HTTP post");
            error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn health(State(hub): State<HubHandle>) -> Response {
    match hub.status().await {
        Ok(status) => Json(json!({
            "status": "ok",
            "onlineCount": status.online_count,
            "messages": status.messages,
            "speaker": status.speaker,
        }))
        .into_response(),
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::hub::Hub;

    fn app() -> Router {
        let (hub, _task) = HubHandle::spawn(Hub::default());
        router(hub)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_creates_message() {
        let app = app();
        let resp = app
            .oneshot(post(r#"{"id":"h1","user":"bob","text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["id"], "h1");
        assert_eq!(body["text"], "hi");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn duplicate_post_returns_existing() {
        let app = app();
        let first = app
            .clone()
            .oneshot(post(r#"{"id":"h1","user":"bob","text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .clone()
            .oneshot(post(r#"{"id":"h1","user":"bob","text":"changed"}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(json_body(second).await["text"], "hi");

        let health = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(health).await["messages"], 1);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = app();
        for body in [
            r#"{"user":"bob"}"#,
            r#"{"text":"hi"}"#,
            r#"{"user":"","text":"hi"}"#,
            r#"{"user":"bob","text":""}"#,
            "not json",
        ] {
            let resp = app.clone().oneshot(post(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let resp = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["onlineCount"], 0);
        assert_eq!(body["speaker"], Value::Null);
    }
}
