//! Request handlers.

use crate::error::{rate_limit_headers, ApiError};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use threadscope_core::{validate, Post, ScrapeError};
use threadscope_scraper::ScrapeOptions;
use tracing::{info, Instrument};
use uuid::Uuid;

/// Headers consulted for the client address, most trusted first.
const CLIENT_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Body of `POST /scrape`.
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    /// Handle (`@name`, `name`) or profile URL
    pub handle: String,
    /// Posts to return, `1..=100`
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Success body of `POST /scrape`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    pub posts: Vec<Post>,
    pub count: usize,
    pub request_id: String,
}

/// Rate-limit key for the caller.
///
/// The first address in `X-Forwarded-For` wins, then `X-Real-IP`, then
/// `CF-Connecting-IP`, then the socket peer.
pub fn client_key(headers: &HeaderMap, extensions: &Extensions) -> String {
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// `POST /scrape`: rate limit, admission gate, validation, then the scrape.
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: std::result::Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let client = client_key(&headers, &extensions);
    let span = tracing::info_span!("scrape", request_id = %request_id, client = %client);

    async move {
        let decision = state.limiter.check(&client);
        if let Err(e) = decision.clone().into_result() {
            return Err(ApiError::new(e, request_id).with_rate_limit(decision));
        }

        state
            .governor
            .check_admission()
            .map_err(|e| ApiError::new(e, request_id))?;

        let Json(body) = payload.map_err(|rejection| {
            ApiError::new(ScrapeError::Validation(rejection.body_text()), request_id)
        })?;
        let handle = validate::validate_and_normalize_handle(&body.handle, &state.allowed_domains)
            .map_err(|e| ApiError::new(e, request_id))?;
        let limit = validate::validate_limit(body.limit).map_err(|e| ApiError::new(e, request_id))?;

        info!(handle = %handle, limit, "Scrape requested");
        let posts = state
            .governor
            .with_resource_control(
                state
                    .scraper
                    .get_posts(&handle, ScrapeOptions::with_limit(limit)),
            )
            .await
            .map_err(|e| ApiError::new(e, request_id))?;

        info!(handle = %handle, count = posts.len(), "Scrape completed");
        let body = ScrapeResponse {
            success: true,
            count: posts.len(),
            posts,
            request_id: request_id.to_string(),
        };
        let mut response = Json(body).into_response();
        rate_limit_headers(response.headers_mut(), &decision);
        Ok(response)
    }
    .instrument(span)
    .await
}

/// `GET /health`: 200 when the admission gate is open, 503 otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let resources = state.governor.health();
    let status = if resources.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if resources.healthy { "healthy" } else { "unhealthy" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "threadscope",
        "resources": resources,
        "cache": state.scraper.cache_stats(),
    });
    (status, Json(body)).into_response()
}
