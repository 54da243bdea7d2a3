//! `/v1/scoring_engines` resource handlers.
//!
//! Read paths (list, detail, show) and invocation are the public surface;
//! register, update, and deregister are the administrative one. Views carry
//! `self` and `collection` links built from the configured base URL.

use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use scoring_core::{EnginePatch, EngineSpec, Metainfo, ScoringEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::error::{ScoringError, ScoringResult};
use crate::listing::{ListRequest, Page};

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Link {
    pub rel: &'static str,
    pub href: String,
}

fn links(base_url: &str, uuid: &Uuid) -> Vec<Link> {
    vec![
        Link {
            rel: "self",
            href: format!("{base_url}/v1/scoring_engines/{uuid}"),
        },
        Link {
            rel: "collection",
            href: format!("{base_url}/v1/scoring_engines"),
        },
    ]
}

/// Collection entry.
#[derive(Debug, Serialize)]
pub struct EngineSummary {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub links: Vec<Link>,
}

impl EngineSummary {
    fn new(engine: &ScoringEngine, base_url: &str) -> Self {
        Self {
            uuid: engine.uuid,
            name: engine.name.clone(),
            description: engine.description.clone(),
            links: links(base_url, &engine.uuid),
        }
    }
}

/// Full view; `metainfo` is returned as the exact string registered.
#[derive(Debug, Serialize)]
pub struct EngineDetail {
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub metainfo: Option<Metainfo>,
    pub links: Vec<Link>,
}

impl EngineDetail {
    fn new(engine: &ScoringEngine, base_url: &str) -> Self {
        Self {
            uuid: engine.uuid,
            name: engine.name.clone(),
            description: engine.description.clone(),
            metainfo: engine.metainfo.clone(),
            links: links(base_url, &engine.uuid),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EngineCollection<T> {
    pub scoring_engines: Vec<T>,
    /// URL of the following page, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

fn collection<T>(
    state: &AppState,
    page: Page,
    path: &str,
    view: impl Fn(&ScoringEngine, &str) -> T,
) -> EngineCollection<T> {
    let base_url = &*state.base_url;
    let next = page.next_marker.as_ref().map(|marker| {
        format!(
            "{base_url}{path}?limit={}&sort_key={}&sort_dir={}&marker={marker}",
            page.limit, page.sort_key, page.sort_dir
        )
    });
    EngineCollection {
        scoring_engines: page.engines.iter().map(|e| view(&**e, base_url)).collect(),
        next,
    }
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

/// `GET /v1/scoring_engines`
pub async fn list_engines(
    State(state): State<AppState>,
    query: Result<Query<ListRequest>, QueryRejection>,
) -> ScoringResult<Json<EngineCollection<EngineSummary>>> {
    let Query(req) = query?;
    let page = state.listing.list(&req)?;
    Ok(Json(collection(&state, page, "/v1/scoring_engines", EngineSummary::new)))
}

/// `GET /v1/scoring_engines/detail`
pub async fn list_engines_detail(
    State(state): State<AppState>,
    query: Result<Query<ListRequest>, QueryRejection>,
) -> ScoringResult<Json<EngineCollection<EngineDetail>>> {
    let Query(req) = query?;
    let page = state.listing.list(&req)?;
    Ok(Json(collection(
        &state,
        page,
        "/v1/scoring_engines/detail",
        EngineDetail::new,
    )))
}

/// `GET /v1/scoring_engines/{ident}`, by uuid or name.
pub async fn show_engine(
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> ScoringResult<Json<EngineDetail>> {
    let engine = state.catalog.get(&ident)?;
    Ok(Json(EngineDetail::new(&engine, &state.base_url)))
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub input: Value,
    /// Seconds; capped by the engine and gateway limits.
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct EngineRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub engine: EngineRef,
    pub output: Value,
}

/// `POST /v1/scoring_engines/{ident}/invoke`
///
/// A client disconnect drops this future, which cancels the invocation.
pub async fn invoke_engine(
    State(state): State<AppState>,
    Path(ident): Path<String>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> ScoringResult<Json<InvokeResponse>> {
    let Json(req) = body?;
    let timeout = req
        .timeout
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                ScoringError::InvalidArgument(format!(
                    "timeout must be a non-negative number of seconds, got {secs}"
                ))
            })
        })
        .transpose()?;

    let _in_flight = state.shutdown.in_flight_guard();
    let score = state.gateway.invoke(&ident, req.input, timeout).await?;
    Ok(Json(InvokeResponse {
        engine: EngineRef {
            uuid: score.engine_uuid,
            name: score.engine_name,
        },
        output: score.output,
    }))
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// `POST /v1/scoring_engines`
pub async fn register_engine(
    State(state): State<AppState>,
    body: Result<Json<EngineSpec>, JsonRejection>,
) -> ScoringResult<(StatusCode, Json<EngineDetail>)> {
    let Json(spec) = body?;
    let engine = state.catalog.register(spec).await?;
    Ok((
        StatusCode::CREATED,
        Json(EngineDetail::new(&engine, &state.base_url)),
    ))
}

/// `PATCH /v1/scoring_engines/{ident}`
pub async fn update_engine(
    State(state): State<AppState>,
    Path(ident): Path<String>,
    body: Result<Json<EnginePatch>, JsonRejection>,
) -> ScoringResult<Json<EngineDetail>> {
    let Json(patch) = body?;
    let engine = state.catalog.update(&ident, patch).await?;
    Ok(Json(EngineDetail::new(&engine, &state.base_url)))
}

/// `DELETE /v1/scoring_engines/{ident}`
pub async fn deregister_engine(
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> ScoringResult<StatusCode> {
    state.catalog.deregister(&ident).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::Router;
    use serde_json::json;
    use tower::ServiceExt;

    use super::super::test_state;
    use super::*;
    use crate::network::{build_router, NetworkConfig};

    fn app() -> (Router, AppState) {
        let state = test_state();
        (build_router(state.clone(), &NetworkConfig::default()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn builtin_engine(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("{name} engine"),
            "metainfo": "{\"weights\": {\"cpu\": 2}}",
            "target": {"type": "builtin", "function": "weighted_utilization"},
        })
    }

    #[tokio::test]
    async fn register_show_and_list() {
        let (app, _state) = app();
        let (status, created) =
            send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let uuid = created["uuid"].as_str().unwrap().to_string();
        assert_eq!(created["metainfo"], "{\"weights\": {\"cpu\": 2}}");
        assert_eq!(
            created["links"][0]["href"],
            format!("http://scoring.test/v1/scoring_engines/{uuid}")
        );
        assert_eq!(created["links"][1]["rel"], "collection");

        let (status, by_name) = send(&app, Method::GET, "/v1/scoring_engines/power-score", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, by_uuid) = send(&app, Method::GET, &format!("/v1/scoring_engines/{uuid}"), None).await;
        assert_eq!(by_name, by_uuid);

        let (status, listed) = send(&app, Method::GET, "/v1/scoring_engines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["scoring_engines"][0]["name"], "power-score");
        assert!(listed["scoring_engines"][0].get("metainfo").is_none());
        assert!(listed.get("next").is_none());

        let (_, detailed) = send(&app, Method::GET, "/v1/scoring_engines/detail", None).await;
        assert_eq!(detailed["scoring_engines"][0]["metainfo"], created["metainfo"]);
    }

    #[tokio::test]
    async fn pagination_follows_next_links() {
        let (app, _state) = app();
        for name in ["c", "a", "b"] {
            send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine(name))).await;
        }

        let (status, first) = send(
            &app,
            Method::GET,
            "/v1/scoring_engines?limit=2&sort_key=name&sort_dir=asc",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = first["scoring_engines"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["a", "b"]);

        let next = first["next"].as_str().unwrap();
        let path = next.strip_prefix("http://scoring.test").unwrap();
        let (_, second) = send(&app, Method::GET, path, None).await;
        assert_eq!(second["scoring_engines"][0]["name"], "c");
        assert!(second.get("next").is_none());
    }

    #[tokio::test]
    async fn bad_query_parameters_are_400() {
        let (app, _state) = app();
        for uri in [
            "/v1/scoring_engines?sort_key=metainfo",
            "/v1/scoring_engines?sort_dir=up",
            "/v1/scoring_engines?limit=-1",
            "/v1/scoring_engines?limit=many",
            "/v1/scoring_engines?marker=garbage",
        ] {
            let (status, body) = send(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"]["kind"], "invalid_argument", "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_engine_is_404() {
        let (app, _state) = app();
        let (status, body) = send(&app, Method::GET, "/v1/scoring_engines/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "not_found");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("does-not-exist"));
    }

    #[tokio::test]
    async fn invoke_returns_engine_output() {
        let (app, state) = app();
        send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines/power-score/invoke",
            Some(json!({"input": {"cpu": 0.8, "mem": 0.5}, "timeout": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["engine"]["name"], "power-score");
        assert_eq!(body["output"]["fields"], 2);
        assert_eq!(state.shutdown.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn invoke_errors_map_to_statuses() {
        let (app, _state) = app();
        send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines/ghost/invoke",
            Some(json!({"input": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "not_found");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines/power-score/invoke",
            Some(json!({"input": {}, "timeout": -1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines/power-score/invoke",
            Some(json!({"timeout": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Builtin rejects non-numeric fields.
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines/power-score/invoke",
            Some(json!({"input": {"cpu": "high"}})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "execution_error");
    }

    #[tokio::test]
    async fn admin_errors_map_to_statuses() {
        let (app, _state) = app();
        send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;

        let (status, body) =
            send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "conflict");

        let mut bad = builtin_engine("bad-meta");
        bad["metainfo"] = json!("{not json");
        let (status, body) = send(&app, Method::POST, "/v1/scoring_engines", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "malformed_metainfo");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/scoring_engines",
            Some(json!({"name": "no-target"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_deregister() {
        let (app, _state) = app();
        send(&app, Method::POST, "/v1/scoring_engines", Some(builtin_engine("power-score"))).await;

        let (status, updated) = send(
            &app,
            Method::PATCH,
            "/v1/scoring_engines/power-score",
            Some(json!({"name": "power-score-v2", "description": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "power-score-v2");
        assert!(updated["description"].is_null());
        assert_eq!(updated["metainfo"], "{\"weights\": {\"cpu\": 2}}");

        let (status, _) = send(&app, Method::DELETE, "/v1/scoring_engines/power-score-v2", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/v1/scoring_engines/power-score-v2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, "/v1/scoring_engines/power-score-v2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
