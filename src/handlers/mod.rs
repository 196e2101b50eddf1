//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (raw JSON body, headers)
//! 2. Locks the gateway and runs one operation on it
//! 3. Returns the response array or snapshot, tagged with the change token
//!
//! The gateway lock is never held across an `.await`.

/// API key issuance and admin password
pub mod auth;
/// Config snapshot and batch updates
pub mod config;
/// Health check endpoint
pub mod health;
/// Software and firmware update triggers
pub mod update;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::ApiError,
    middleware,
    services::gateway::{ConditionalRead, SharedGateway},
};

/// Builds the application router.
///
/// `POST /api`, `DELETE /api/config/password` and `/health` are public; all
/// other routes carry the API key as second path segment and pass through
/// the authentication middleware.
pub fn router(gateway: SharedGateway) -> Router {
    let authenticated_routes = Router::new()
        .route("/api/{key}", get(config::get_full_state))
        .route(
            "/api/{key}/config",
            get(config::get_config).put(config::modify_config),
        )
        .route("/api/{key}/config/update", post(update::update_software))
        .route(
            "/api/{key}/config/updatefirmware",
            post(update::update_firmware),
        )
        .route("/api/{key}/config/password", put(auth::change_password))
        .route_layer(axum_middleware::from_fn_with_state(
            gateway.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api", post(auth::create_api_key))
        .route("/api/config/password", delete(auth::reset_password))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

/// Value of `If-None-Match`, if any.
pub(crate) fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
}

/// Parses a request body that must be a non-empty JSON object.
pub(crate) fn parse_object(body: &[u8], address: &str) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) if !fields.is_empty() => Ok(fields),
        _ => Err(ApiError::InvalidJson {
            address: address.to_string(),
        }),
    }
}

/// Attaches the change token as `ETag`.
pub(crate) fn with_token(status: StatusCode, token: &str, body: impl IntoResponse) -> Response {
    (status, [(header::ETAG, token.to_string())], body).into_response()
}

pub(crate) fn conditional_response<T: Serialize>(read: ConditionalRead<T>) -> Response {
    match read {
        ConditionalRead::NotModified { token } => {
            (StatusCode::NOT_MODIFIED, [(header::ETAG, token)]).into_response()
        }
        ConditionalRead::Fresh { body, token } => with_token(StatusCode::OK, &token, Json(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gateway_config::SOFTWARE_VERSION;
    use crate::services::gateway::testing::{Harness, harness};
    use crate::services::scheduler::ManualClock;
    use axum::body::{self, Body};
    use axum::http::Request;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "TESTKEY0001";

    struct TestApp {
        router: Router,
        gateway: SharedGateway,
        clock: ManualClock,
        _dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let Harness {
            mut gateway,
            clock,
            dir,
            ..
        } = harness();

        gateway.unlock(60).unwrap();
        gateway
            .issue_api_key("tests", Some(&json!(KEY)), false)
            .unwrap();
        gateway.unlock(0).unwrap();

        let gateway = Arc::new(Mutex::new(gateway));
        TestApp {
            router: router(gateway.clone()),
            gateway,
            clock,
            _dir: dir,
        }
    }

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Reply {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn etag(reply: &Reply) -> String {
        reply.headers[header::ETAG].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn unknown_key_is_rejected_with_403() {
        let app = test_app();

        let reply = send(&app, get("/api/NOTAKEY000/config")).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body[0]["error"]["type"], 1);
        assert_eq!(reply.body[0]["error"]["description"], "unauthorized user");
    }

    #[tokio::test]
    async fn locked_gateway_refuses_new_keys_until_unlocked() {
        let app = test_app();

        let reply = send(&app, with_json("POST", "/api", json!({"devicetype": "app"}))).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body[0]["error"]["type"], 101);

        let reply = send(
            &app,
            with_json("PUT", &format!("/api/{KEY}/config"), json!({"unlock": 60})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!([{"success": {"/config/unlock": 60}}]));

        let reply = send(&app, with_json("POST", "/api", json!({"devicetype": "app"}))).await;
        assert_eq!(reply.status, StatusCode::OK);
        let key = reply.body[0]["success"]["username"].as_str().unwrap().to_string();
        assert_eq!(key.len(), 10);

        let reply = send(&app, get(&format!("/api/{key}/config"))).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["whitelist"][&key]["name"], "app");
    }

    #[tokio::test]
    async fn admin_credentials_preauthorize_key_issuance() {
        let app = test_app();
        let credentials = STANDARD.encode("delight:delight");

        let request = Request::builder()
            .method("POST")
            .uri("/api")
            .header(header::AUTHORIZATION, format!("Basic {credentials}"))
            .body(Body::from(json!({"devicetype": "installer"}).to_string()))
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body[0]["success"]["username"].is_string());

        let wrong = STANDARD.encode("delight:guess");
        let request = Request::builder()
            .method("POST")
            .uri("/api")
            .header(header::AUTHORIZATION, format!("Basic {wrong}"))
            .body(Body::from(json!({"devicetype": "installer"}).to_string()))
            .unwrap();
        assert_eq!(send(&app, request).await.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn key_issuance_validates_the_body() {
        let app = test_app();
        app.gateway.lock().unlock(60).unwrap();

        let reply = send(&app, with_json("POST", "/api", json!({"username": "0123456789"}))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body[0]["error"]["type"], 5);

        let request = Request::builder()
            .method("POST")
            .uri("/api")
            .body(Body::from("{not json"))
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.body[0]["error"]["type"], 2);

        let reply = send(
            &app,
            with_json("POST", "/api", json!({"devicetype": "app", "username": "short"})),
        )
        .await;
        assert_eq!(reply.body[0]["error"]["type"], 7);

        let reply = send(
            &app,
            with_json("POST", "/api", json!({"devicetype": "again", "username": KEY})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body[0]["success"]["username"], KEY);
    }

    #[tokio::test]
    async fn config_reads_honour_if_none_match() {
        let app = test_app();
        let uri = format!("/api/{KEY}/config");

        let first = send(&app, get(&uri)).await;
        assert_eq!(first.status, StatusCode::OK);
        let tag = etag(&first);

        let request = Request::builder()
            .uri(&uri)
            .header(header::IF_NONE_MATCH, &tag)
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::NOT_MODIFIED);
        assert_eq!(reply.body, Value::Null);
        assert_eq!(etag(&reply), tag);

        let reply = send(&app, with_json("PUT", &uri, json!({"name": "Attic"}))).await;
        assert_ne!(etag(&reply), tag);

        let request = Request::builder()
            .uri(&uri)
            .header(header::IF_NONE_MATCH, &tag)
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["name"], "Attic");
    }

    #[tokio::test]
    async fn weak_and_listed_tags_count_as_a_match() {
        let app = test_app();
        let uri = format!("/api/{KEY}/config");
        let tag = etag(&send(&app, get(&uri)).await);

        for value in [format!("W/{tag}"), format!("\"stale\", {tag}"), "*".to_string()] {
            let request = Request::builder()
                .uri(&uri)
                .header(header::IF_NONE_MATCH, &value)
                .body(Body::empty())
                .unwrap();
            let reply = send(&app, request).await;
            assert_eq!(reply.status, StatusCode::NOT_MODIFIED, "{value}");
        }
    }

    #[tokio::test]
    async fn full_state_wraps_the_config() {
        let app = test_app();

        let reply = send(&app, get(&format!("/api/{KEY}"))).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["lights"].is_object());
        assert!(reply.body["config"]["whitelist"][KEY].is_object());
        assert!(reply.headers.contains_key(header::ETAG));
    }

    #[tokio::test]
    async fn batch_status_reflects_field_outcomes() {
        let app = test_app();
        let uri = format!("/api/{KEY}/config");

        let reply = send(
            &app,
            with_json("PUT", &uri, json!({"groupdelay": 100, "permitjoin": 900})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body.as_array().unwrap().len(), 2);
        assert_eq!(reply.body[0]["error"]["type"], 7);
        assert_eq!(reply.body[1]["success"]["/config/groupdelay"], 100);

        let reply = send(&app, with_json("PUT", &uri, json!({"otauactive": "yes"}))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = send(&app, with_json("PUT", &uri, json!({"colour": "blue"}))).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!([]));

        let reply = send(&app, with_json("PUT", &uri, json!({}))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body[0]["error"]["type"], 2);
    }

    #[tokio::test]
    async fn password_change_and_reset() {
        let app = test_app();
        let uri = format!("/api/{KEY}/config/password");

        let reply = send(
            &app,
            with_json("PUT", &uri, json!({"username": "delight", "oldhash": "delight"})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body[0]["error"]["type"], 5);

        let change = json!({"username": "delight", "oldhash": "delight", "newhash": "s3cret"});
        let reply = send(&app, with_json("PUT", &uri, change.clone())).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!([{"success": {"/config/password": "changed"}}]));

        let reply = send(&app, with_json("PUT", &uri, change)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body[0]["error"]["type"], 1);

        let reset = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/config/password")
                .body(Body::empty())
                .unwrap()
        };
        let reply = send(&app, reset()).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!([{"success": {"/config/password": "reset"}}]));

        app.clock.advance(Duration::from_secs(601));
        let reply = send(&app, reset()).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_triggers_answer_with_versions() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/{KEY}/config/update"))
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body[0]["success"]["/config/update"], SOFTWARE_VERSION);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/{KEY}/config/updatefirmware"))
            .body(Body::empty())
            .unwrap();
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.body[0]["success"]["/config/updatefirmware"],
            "0x00000000"
        );
    }

    #[tokio::test]
    async fn health_reports_uptime_and_update_phase() {
        let app = test_app();
        app.clock.advance(Duration::from_secs(42));

        let reply = send(&app, get("/health")).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "healthy");
        assert_eq!(reply.body["uptime_secs"], 42);
        assert_eq!(reply.body["update"], "unknown");
    }
}
