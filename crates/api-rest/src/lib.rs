//! # API REST
//!
//! HTTP host for a CDS sandbox [`Session`].
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI document at `/api-docs/openapi.json`
//! - REST-specific concerns (JSON serialization, CORS, reading the `Origin` header)
//!
//! Inbound cross-frame messages arrive as `POST /messages`; the request's `Origin` header is
//! the sender origin and the reply envelope is returned as the response body.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use cds_core::{
    Action, CoreError, Context, Disposition, HashState, MessageEvent, MessageSource,
    ReplyEnvelope, ReplyPayload, Session,
};
use fhir::{Bundle, BundleEntry, Condition, FhirError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    session: Arc<Session>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_state,
        get_state_to_publish,
        get_selection,
        set_context,
        dispatch_action,
        post_message,
        latest_message,
        retrieve_patient,
    ),
    components(schemas(
        HealthRes,
        ContextReq,
        ContextRes,
        StateRes,
        PublishRes,
        SelectionRes,
        ActionReq,
        HashStateReq,
        ReplyRes,
        LatestMessageRes,
        PatientRes,
    ))
)]
struct ApiDoc;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Context to switch to. Missing or empty fields fall back to the configured defaults.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextReq {
    #[serde(default)]
    pub patient: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextRes {
    pub patient: String,
    pub base_url: String,
    pub mock: bool,
}

impl From<&Context> for ContextRes {
    fn from(context: &Context) -> Self {
        Self {
            patient: context.patient.clone(),
            base_url: context.base_url.clone(),
            mock: context.mock,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StateRes {
    pub context: ContextRes,
    #[schema(value_type = Vec<Object>)]
    pub conditions: Vec<BundleEntry<Condition>>,
    pub selection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishRes {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SelectionRes {
    #[schema(value_type = Object, nullable)]
    pub condition: Option<Condition>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct HashStateReq {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Store actions, tagged by `type`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionReq {
    PickCondition {
        #[serde(default)]
        selection: Option<String>,
    },
    NewHashState {
        #[serde(default)]
        hash: HashStateReq,
    },
}

impl From<ActionReq> for Action {
    fn from(req: ActionReq) -> Self {
        match req {
            ActionReq::PickCondition { selection } => Action::PickCondition { selection },
            ActionReq::NewHashState { hash } => Action::NewHashState {
                hash: HashState {
                    reason: hash.reason,
                },
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRes {
    pub message_id: String,
    pub response_to_message_id: String,
    #[schema(value_type = Object)]
    pub payload: ReplyPayload,
}

impl From<ReplyEnvelope> for ReplyRes {
    fn from(reply: ReplyEnvelope) -> Self {
        Self {
            message_id: reply.message_id.to_string(),
            response_to_message_id: reply.response_to_message_id,
            payload: reply.payload,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LatestMessageRes {
    #[schema(value_type = Object, nullable)]
    pub message: Option<Value>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PatientQuery {
    /// Patient to retrieve
    pub id: Option<String>,
    /// Patient named by the launch access token, used when `id` is absent
    pub token_patient: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRes {
    pub id: String,
    pub name: String,
    pub birth_date: Option<String>,
    #[schema(value_type = Object, nullable)]
    pub conditions: Option<Bundle>,
}

/// Builds the REST router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(get_state))
        .route("/state/publish", get(get_state_to_publish))
        .route("/selection", get(get_selection))
        .route("/context", post(set_context))
        .route("/actions", post(dispatch_action))
        .route("/messages", post(post_message))
        .route("/messages/latest", get(latest_message))
        .route("/patient", get(retrieve_patient))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the REST API for `session` on `addr` until the server stops.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails while running.
pub async fn serve(session: Arc<Session>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("++ Starting CDS sandbox REST on {}", addr);
    axum::serve(listener, router(AppState::new(session))).await
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CDS sandbox REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/state",
    responses(
        (status = 200, description = "Current store snapshot", body = StateRes)
    )
)]
#[axum::debug_handler]
async fn get_state(State(state): State<AppState>) -> Json<StateRes> {
    let snapshot = state.session.store().get_state();
    Json(StateRes {
        context: ContextRes::from(&snapshot.context),
        conditions: snapshot.conditions.clone(),
        selection: snapshot.selection.clone(),
    })
}

#[utoipa::path(
    get,
    path = "/state/publish",
    responses(
        (status = 200, description = "Hash state mirroring the selection", body = PublishRes)
    )
)]
#[axum::debug_handler]
async fn get_state_to_publish(State(state): State<AppState>) -> Json<PublishRes> {
    let hash = state.session.store().get_state_to_publish();
    Json(PublishRes {
        reason: hash.reason,
    })
}

#[utoipa::path(
    get,
    path = "/selection",
    responses(
        (status = 200, description = "Selected condition, or null", body = SelectionRes)
    )
)]
#[axum::debug_handler]
async fn get_selection(State(state): State<AppState>) -> Json<SelectionRes> {
    Json(SelectionRes {
        condition: state.session.store().get_selection_as_fhir(),
    })
}

#[utoipa::path(
    post,
    path = "/context",
    request_body = ContextReq,
    responses(
        (status = 200, description = "Context applied and conditions fetched", body = ContextRes)
    )
)]
/// Replace the session context
///
/// Waits for the condition fetch for the new context to finish, so a following `GET /state`
/// sees its result. A failed fetch leaves the conditions unchanged and still returns `200`.
#[axum::debug_handler]
async fn set_context(
    State(state): State<AppState>,
    Json(req): Json<ContextReq>,
) -> Json<ContextRes> {
    let context = {
        let config = state.session.config();
        Context {
            patient: present(req.patient)
                .unwrap_or_else(|| config.default_patient().to_string()),
            base_url: present(req.base_url)
                .unwrap_or_else(|| config.default_fhir_service_url().to_string()),
            mock: false,
        }
    };

    if let Err(e) = state.session.store().set_context(context).await {
        tracing::debug!("condition fetch did not complete: {}", e);
    }

    Json(ContextRes::from(&state.session.store().get_state().context))
}

#[utoipa::path(
    post,
    path = "/actions",
    request_body = ActionReq,
    responses(
        (status = 200, description = "Action reduced", body = PublishRes),
        (status = 422, description = "Unknown action")
    )
)]
/// Dispatch a store action
///
/// # Returns
/// * `Json<PublishRes>` - the hash state after the action
#[axum::debug_handler]
async fn dispatch_action(
    State(state): State<AppState>,
    Json(req): Json<ActionReq>,
) -> Json<PublishRes> {
    let store = state.session.store();
    store.dispatch(req.into());
    Json(PublishRes {
        reason: store.get_state_to_publish().reason,
    })
}

/// Collects the reply the message panel posts back to the sender.
#[derive(Default)]
struct CapturedReply {
    reply: Mutex<Option<ReplyEnvelope>>,
}

impl CapturedReply {
    fn take(&self) -> Option<ReplyEnvelope> {
        self.reply.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl MessageSource for CapturedReply {
    fn post_message(&self, message: &ReplyEnvelope, target_origin: &str) {
        tracing::debug!("reply {} posted to {}", message.message_id, target_origin);
        *self.reply.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.clone());
    }
}

#[utoipa::path(
    post,
    path = "/messages",
    responses(
        (status = 200, description = "Reply envelope", body = ReplyRes),
        (status = 403, description = "Origin not trusted")
    )
)]
/// Deliver a cross-frame message
///
/// The body is the message data. A body that is not JSON is delivered as a JSON string.
///
/// This simulates a browser `postMessage` for local testing. The sender's origin is taken from
/// the `Origin` request header, which any non-browser client can set to an arbitrary value, so
/// the allow-list check here is not an authentication boundary. Expose this route only to
/// trusted callers.
///
/// # Errors
/// Returns `403 Forbidden` if the `Origin` header is missing or not a trusted origin.
#[axum::debug_handler]
async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ReplyRes>, (StatusCode, &'static str)> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let data = match serde_json::from_str::<Value>(&body) {
        Ok(value) => value,
        Err(_) => Value::String(body),
    };

    let source = CapturedReply::default();
    let disposition = state.session.panel().handle_message(MessageEvent {
        origin,
        data,
        source: &source,
    });

    match disposition {
        Disposition::Rejected => Err((StatusCode::FORBIDDEN, "Untrusted origin")),
        Disposition::Replied(_) => source
            .take()
            .map(|reply| Json(ReplyRes::from(reply)))
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Internal error")),
    }
}

#[utoipa::path(
    get,
    path = "/messages/latest",
    responses(
        (status = 200, description = "Most recently accepted message, or null", body = LatestMessageRes)
    )
)]
#[axum::debug_handler]
async fn latest_message(State(state): State<AppState>) -> Json<LatestMessageRes> {
    Json(LatestMessageRes {
        message: state.session.panel().latest_message(),
    })
}

#[utoipa::path(
    get,
    path = "/patient",
    params(PatientQuery),
    responses(
        (status = 200, description = "Patient and conditions", body = PatientRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Patient not found"),
        (status = 502, description = "FHIR server error")
    )
)]
/// Retrieve the patient in context
///
/// # Errors
/// Returns:
/// - `400 Bad Request` if the patient id or FHIR context is invalid,
/// - `404 Not Found` if the FHIR server has no such patient,
/// - `502 Bad Gateway` if the FHIR server fails or returns something other than a `Patient`.
#[axum::debug_handler]
async fn retrieve_patient(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<PatientRes>, (StatusCode, &'static str)> {
    let retrieved = state
        .session
        .retrieve_patient(query.id.as_deref(), query.token_patient.as_deref())
        .await
        .map_err(patient_error)?;

    Ok(Json(PatientRes {
        id: retrieved.patient.id.to_string(),
        name: retrieved.patient.display_name(),
        birth_date: retrieved.patient.birth_date,
        conditions: retrieved.conditions,
    }))
}

fn patient_error(e: CoreError) -> (StatusCode, &'static str) {
    match &e {
        CoreError::Text(_) => {
            tracing::warn!("Patient retrieval rejected: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid patient id")
        }
        CoreError::Fhir(FhirError::InvalidInput(_) | FhirError::InvalidUrl(_)) => {
            tracing::warn!("Patient retrieval rejected: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid FHIR context")
        }
        CoreError::Fhir(FhirError::Status { status: 404, .. }) => {
            (StatusCode::NOT_FOUND, "Patient not found")
        }
        _ => {
            tracing::error!("Patient retrieval error: {:?}", e);
            (StatusCode::BAD_GATEWAY, "FHIR server error")
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use cds_core::SandboxConfig;
    use fhir::{FhirClient, FhirConnector, FhirContext, FhirResult, SearchQuery};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    const APP: &str = "https://app.example.org";

    /// Answers every condition search with one condition and knows one patient, `p1`.
    struct StaticFhir;

    #[async_trait]
    impl FhirClient for StaticFhir {
        async fn search(&self, _query: &SearchQuery) -> FhirResult<Bundle> {
            Bundle::from_json(json!({
                "resourceType": "Bundle",
                "type": "searchset",
                "entry": [{"resource": {"resourceType": "Condition", "id": "c1",
                    "code": {"coding": [{"code": "44054006"}]}}}]
            }))
        }

        async fn read(&self, resource_type: &str, id: &str) -> FhirResult<Value> {
            if resource_type == "Patient" && id == "p1" {
                return Ok(json!({"resourceType": "Patient", "id": "p1",
                    "name": [{"use": "official", "family": "Doe", "given": ["Jane"]}]}));
            }
            Err(FhirError::Status {
                status: 404,
                url: format!("static:///{resource_type}/{id}"),
            })
        }
    }

    impl FhirConnector for StaticFhir {
        fn connect(&self, _context: &FhirContext) -> FhirResult<Arc<dyn FhirClient>> {
            Ok(Arc::new(StaticFhir))
        }
    }

    fn app() -> Router {
        let config = SandboxConfig::new(
            "p1",
            "http://fhir.test",
            vec![APP.to_string()],
            "127.0.0.1:0".parse().expect("socket addr"),
        )
        .expect("valid config");
        let session = Session::from_config(config, Arc::new(StaticFhir)).expect("session");
        router(AppState::new(Arc::new(session)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn message_from(origin: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/messages")
            .header(header::ORIGIN, origin)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(&app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn context_then_state_shows_fetched_conditions() {
        let app = app();

        let (status, body) = send(&app, post_json("/context", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"patient": "p1", "baseUrl": "http://fhir.test", "mock": false}));

        let (_, state) = send(&app, get("/state")).await;
        assert_eq!(state["context"]["patient"], json!("p1"));
        assert_eq!(state["conditions"][0]["resource"]["id"], json!("c1"));
        assert_eq!(state["selection"], Value::Null);
    }

    #[tokio::test]
    async fn picking_a_condition_updates_selection_and_hash() {
        let app = app();
        send(&app, post_json("/context", json!({"patient": "p1"}))).await;

        let (status, body) = send(
            &app,
            post_json("/actions", json!({"type": "PICK_CONDITION", "selection": "44054006"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"reason": "44054006"}));

        let (_, selection) = send(&app, get("/selection")).await;
        assert_eq!(selection["condition"]["id"], json!("c1"));

        let (_, publish) = send(&app, get("/state/publish")).await;
        assert_eq!(publish, json!({"reason": "44054006"}));
    }

    #[tokio::test]
    async fn hash_state_without_reason_keeps_selection() {
        let app = app();
        send(&app, post_json("/actions", json!({"type": "PICK_CONDITION", "selection": "A"}))).await;

        let (status, body) = send(
            &app,
            post_json("/actions", json!({"type": "NEW_HASH_STATE", "hash": {}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"reason": "A"}));
    }

    #[tokio::test]
    async fn selection_is_null_without_match() {
        let (status, body) = send(&app(), get("/selection")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"condition": null}));
    }

    #[tokio::test]
    async fn untrusted_origin_is_forbidden_and_not_stored() {
        let app = app();

        let (status, _) = send(
            &app,
            message_from(
                "https://evil.example.com",
                r#"{"messageId": "m1", "messageType": "fhir.read"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, latest) = send(&app, get("/messages/latest")).await;
        assert_eq!(latest, json!({"message": null}));
    }

    #[tokio::test]
    async fn missing_origin_is_forbidden() {
        let request = Request::builder()
            .method("POST")
            .uri("/messages")
            .body(Body::from("{}"))
            .expect("request");
        let (status, _) = send(&app(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn trusted_fhir_message_gets_reply_and_is_stored() {
        let app = app();
        let message = json!({"messageId": "m1", "messageType": "fhir.read"});

        let (status, reply) = send(&app, message_from(APP, &message.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["responseToMessageId"], json!("m1"));
        assert_eq!(reply["payload"]["status"], json!(200));
        assert_eq!(reply["payload"]["outcome"], json!("Success"));
        assert!(reply["payload"]["location"].is_string());
        assert_eq!(reply["messageId"].as_str().map(str::len), Some(36));

        let (_, latest) = send(&app, get("/messages/latest")).await;
        assert_eq!(latest, json!({"message": message}));
    }

    #[tokio::test]
    async fn non_json_body_gets_generic_reply() {
        let app = app();

        let (status, reply) = send(&app, message_from(APP, "hello")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["responseToMessageId"], json!(""));
        assert_eq!(reply["payload"]["success"], json!(false));
        let (_, latest) = send(&app, get("/messages/latest")).await;
        assert_eq!(latest, json!({"message": "hello"}));
    }

    #[tokio::test]
    async fn patient_lookup_maps_errors_to_status() {
        let app = app();

        let (status, body) = send(&app, get("/patient?id=p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("Jane Doe"));
        assert_eq!(body["conditions"]["entry"][0]["resource"]["id"], json!("c1"));

        let (status, _) = send(&app, get("/patient?id=unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get("/patient?id=bad%2Fid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (status, doc) = send(&app(), get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/messages"].is_object());
        assert!(doc["paths"]["/state"].is_object());
    }

    #[tokio::test]
    async fn message_route_docs_warn_that_origin_header_is_forgeable() {
        let (_, doc) = send(&app(), get("/api-docs/openapi.json")).await;
        let description = doc["paths"]["/messages"]["post"]["description"]
            .as_str()
            .unwrap_or_default();
        assert!(description.contains("not an authentication boundary"));
    }
}
