//! Error responses for the HTTP boundary.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use threadscope_core::ScrapeError;
use threadscope_governor::RateLimitDecision;
use uuid::Uuid;

/// Sanitized error body returned to callers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Fixed user-facing message
    pub error: &'static str,
    /// Error category, e.g. `validation`
    pub category: &'static str,
    /// RFC 3339 time the error was produced
    pub timestamp: String,
    /// Correlation id, also present in server logs
    pub request_id: String,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// A failed request: the underlying error plus the context needed to report it.
#[derive(Debug)]
pub struct ApiError {
    /// What went wrong
    pub error: ScrapeError,
    /// Correlation id for the request
    pub request_id: Uuid,
    /// Limiter state, attached when the request was rate limited
    pub rate_limit: Option<RateLimitDecision>,
}

impl ApiError {
    /// Wrap `error` for the request identified by `request_id`.
    pub fn new(error: ScrapeError, request_id: Uuid) -> Self {
        Self {
            error,
            request_id,
            rate_limit: None,
        }
    }

    /// Attach limiter headers.
    #[must_use]
    pub fn with_rate_limit(mut self, decision: RateLimitDecision) -> Self {
        self.rate_limit = Some(decision);
        self
    }

    fn retry_after_secs(&self) -> Option<u64> {
        self.error
            .retry_after()
            .map(|after| (after.as_secs() + u64::from(after.subsec_nanos() > 0)).max(1))
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}

/// `X-RateLimit-*` headers for a limiter decision.
pub fn rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    insert_header(
        headers,
        HeaderName::from_static("x-ratelimit-limit"),
        decision.limit,
    );
    insert_header(
        headers,
        HeaderName::from_static("x-ratelimit-remaining"),
        decision.remaining,
    );
    insert_header(
        headers,
        HeaderName::from_static("x-ratelimit-reset"),
        decision.reset_unix_secs(),
    );
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, "Request failed");
        } else {
            tracing::warn!(request_id = %self.request_id, error = %self.error, "Request rejected");
        }

        let retry_after = self.retry_after_secs();
        let body = ErrorBody {
            error: self.error.user_message(),
            category: self.error.category().as_str(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: self.request_id.to_string(),
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        if let Some(secs) = retry_after {
            insert_header(headers, header::RETRY_AFTER, secs);
        }
        if let Some(decision) = &self.rate_limit {
            rate_limit_headers(headers, decision);
        }
        response
    }
}
