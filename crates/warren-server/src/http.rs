//! HTTP session layer.
//!
//! Every request except `/healthz` is turned into a plugin-facing
//! [`HttpRequest`] and run through the dispatcher: `before`, then `handle`
//! (falling back to [`default_handler`]), then `after`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use warren_db::EntityId;
use warren_plugin::{HttpRequest, HttpResponse};

use crate::api;
use crate::error::ServerError;
use crate::state::AppState;

/// Largest request body accepted from devices or API clients.
const MAX_BODY: usize = 1024 * 1024;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "request body rejected");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut req = HttpRequest::new(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query().unwrap_or(""),
    );
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            req = req.with_header(name.as_str(), value);
        }
    }
    let req = req.with_body(body.to_vec());

    let dispatcher = &state.dispatcher;
    dispatcher.http_request_before(&req);
    let response = match dispatcher.http_request_handle(&req) {
        Some(response) => response,
        None => default_handler(&state, &req).await,
    };
    dispatcher.http_request_after(&req);

    into_response(response)
}

/// What the server answers when no plugin handled the request.
pub async fn default_handler(state: &AppState, req: &HttpRequest) -> HttpResponse {
    let config = &state.config;
    if let Some(call) = req.path().strip_prefix(api::PREFIX) {
        if !config.http_api {
            return HttpResponse::not_found();
        }
        return HttpResponse::api(&api::process(state, call, req).await);
    }

    if req.path().starts_with("/vl/") {
        if config.http_violet {
            if let Some(response) = device_endpoint(state, req) {
                return response;
            }
        }
        if !config.standalone {
            return forward_to_violet(state, req).await;
        }
    }

    HttpResponse::not_found()
}

fn into_response(response: HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        Body::from(response.body),
    )
        .into_response()
}

// ─── Device endpoints ───────────────────────────────────────────────────

/// Endpoints the device calls itself. `None` leaves the request to Violet.
fn device_endpoint(state: &AppState, req: &HttpRequest) -> Option<HttpResponse> {
    match req.path() {
        "/vl/rfid.jsp" => rfid(state, req),
        _ => None,
    }
}

/// `/vl/rfid.jsp?sn=<serial>&t=<tag>`: a tag was put on the device.
fn rfid(state: &AppState, req: &HttpRequest) -> Option<HttpResponse> {
    let (Some(serial), Some(tag)) = (req.arg("sn"), req.arg("t")) else {
        return Some(HttpResponse::new(400, "text/plain", "Missing sn or t"));
    };
    let (Some(bunny), Ok(tag)) = (
        state.entities.bunnies.get_hex(serial),
        EntityId::from_hex(tag),
    ) else {
        tracing::warn!(serial, tag, "malformed rfid request");
        return Some(HttpResponse::new(400, "text/plain", "Malformed sn or t"));
    };

    let consumed = state.dispatcher.on_rfid(&bunny, &tag);
    tracing::debug!(bunny = %bunny.id(), ztamp = %tag, consumed, "rfid");
    if consumed || state.config.standalone {
        Some(HttpResponse::empty())
    } else {
        None
    }
}

// ─── Violet proxy ───────────────────────────────────────────────────────

async fn forward_to_violet(state: &AppState, req: &HttpRequest) -> HttpResponse {
    match proxy(state, req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(uri = %req.uri(), error = %e, "violet http request failed");
            HttpResponse::new(502, "text/plain", "Bad gateway")
        }
    }
}

async fn proxy(state: &AppState, req: &HttpRequest) -> Result<HttpResponse, ServerError> {
    let url = url::Url::parse(&state.config.violet_http_url)?.join(&req.uri())?;
    let method = reqwest::Method::from_bytes(req.method().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut upstream = state.http_client.request(method, url);
    for (name, value) in req.headers() {
        if !matches!(name, "host" | "content-length" | "connection") {
            upstream = upstream.header(name, value);
        }
    }
    let response = upstream.body(req.body().to_vec()).send().await?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = response.bytes().await?;
    Ok(HttpResponse::new(status, &content_type, body.to_vec()))
}
