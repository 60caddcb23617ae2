use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::Bytes;
use cdd_contracts::{ContractResult, HandlerError, HttpMethod};
use cdd_core::MethodRegistry;
use serde_json::{json, Value};

use crate::identity;

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<MethodRegistry>,
}

pub(crate) fn build(registry: Arc<MethodRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/contracts", get(contracts))
        .route("/{name}", any(dispatch))
        .with_state(AppState { registry })
}

async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn contracts(State(state): State<AppState>) -> Json<Value> {
    Json(state.registry.describe())
}

fn contract_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::POST => Some(HttpMethod::Post),
        Method::PUT => Some(HttpMethod::Put),
        Method::PATCH => Some(HttpMethod::Patch),
        Method::DELETE => Some(HttpMethod::Delete),
        _ => None,
    }
}

fn envelope(result: ContractResult) -> Response {
    let status =
        StatusCode::from_u16(result.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result)).into_response()
}

fn parse_input(body: &Bytes) -> Result<Value, HandlerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|err| HandlerError::Rejected(format!("request body is not valid JSON: {err}")))
}

async fn dispatch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let Some(verb) = contract_method(&method) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let Some(operation) = state.registry.get(verb, &name) else {
        let status = if state.registry.names().contains(&name.as_str()) {
            StatusCode::METHOD_NOT_ALLOWED
        } else {
            StatusCode::NOT_FOUND
        };
        return status.into_response();
    };

    let input = match parse_input(&body) {
        Ok(input) => input,
        Err(err) => return envelope(ContractResult::from_handler_error(&err, Value::Null)),
    };
    let caller = identity::from_headers(&headers);

    let result = match operation.call(input.clone(), caller.as_ref()).await {
        Ok(result) => result,
        Err(err) => {
            if err.status_code() >= 500 {
                tracing::error!(contract = %name, %verb, error = %err, "handler failed");
            }
            ContractResult::from_handler_error(&err, input)
        }
    };
    tracing::info!(
        target: cdd_otel::ACCESS_TARGET,
        contract = %name,
        method = %verb,
        subject = caller.as_ref().map(|c| c.subject.as_str()).unwrap_or("-"),
        code = result.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "contract call"
    );
    envelope(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cdd_core::{parse_config, Config};
    use cdd_driver::DriverRegistry;
    use cdd_memory_driver::MemoryDriver;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
[[contracts]]
name = "notes"
method = "post"
input_schema = { type = "object", properties = { id = { type = "string" }, text = { type = "string" }, ownerId = { type = "string" } }, required = ["text"] }
output_schema = { type = "object" }
binding = { type = "memory", collection = "notes" }

[[contracts]]
name = "notes"
method = "get"
input_schema = { type = "object", properties = { id = { type = "string" } } }
output_schema = {}
binding = { type = "memory", collection = "notes" }

[[contracts]]
name = "notes"
method = "delete"
authentication = ["admin", { userId = "ownerId" }]
input_schema = { type = "object", properties = { id = { type = "string" } }, required = ["id"] }
output_schema = {}
binding = { type = "memory", collection = "notes" }

[[contracts]]
name = "todo"
method = "get"
input_schema = {}
output_schema = {}
"#;

    fn app() -> Router {
        let cfg: Config = parse_config(CONFIG).unwrap();
        let drivers = DriverRegistry::new().with_driver(Arc::new(MemoryDriver::new()));
        build(cdd_core::bootstrap(&cfg, drivers).unwrap())
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Value,
        subject: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(subject) = subject {
            req = req.header(identity::SUBJECT_HEADER, subject);
        }
        let body = if body.is_null() {
            Body::empty()
        } else {
            Body::from(body.to_string())
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn serves_contract_round_trip() {
        let app = app();
        let (status, body) = send(&app, "GET", "/notes", json!({"id": "n1"}), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
        assert_eq!(body["errorType"], "Not found");

        let note = json!({"id": "n1", "text": "hi", "ownerId": "alice"});
        let (status, body) = send(&app, "POST", "/notes", note.clone(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": note}));

        let (status, body) = send(&app, "GET", "/notes", Value::Null, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"][0]["id"], "n1");
    }

    #[tokio::test]
    async fn pipeline_failures_map_to_status_codes() {
        let app = app();
        let (status, body) = send(&app, "POST", "/notes", json!({"nope": 1}), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["errors"]["text"]["error"], "Required field is missing");

        let (status, _) = send(&app, "DELETE", "/notes", json!({"id": "n1"}), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, "GET", "/todo", Value::Null, None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["data"], "todo");
    }

    #[tokio::test]
    async fn owners_can_delete_their_records() {
        let app = app();
        let note = json!({"id": "n1", "text": "hi", "ownerId": "alice"});
        send(&app, "POST", "/notes", note.clone(), None).await;

        let (status, _) = send(&app, "DELETE", "/notes", json!({"id": "n1"}), Some("bob")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&app, "DELETE", "/notes", json!({"id": "n1"}), Some("alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": [note]}));
    }

    #[tokio::test]
    async fn conflicts_are_409() {
        let app = app();
        let note = json!({"id": "n1", "text": "hi"});
        send(&app, "POST", "/notes", note.clone(), None).await;
        let (status, body) = send(&app, "POST", "/notes", note, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errorType"], "Conflict");
    }

    #[tokio::test]
    async fn unknown_routes_and_verbs() {
        let app = app();
        let (status, _) = send(&app, "GET", "/missing", Value::Null, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "PUT", "/notes", json!({}), None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let app = app();
        let req = Request::builder()
            .method("POST")
            .uri("/notes")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn discovery_and_health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/healthz", Value::Null, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let (_, body) = send(&app, "GET", "/contracts", Value::Null, None).await;
        assert_eq!(body["count"], 4);
    }
}
