use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Outcome of a failed call to the Roam graph API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// 404: the host does not own this graph's shard.
    #[error("{url} does not own the graph")]
    ShardMiss { url: String },
    #[error("{status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("All Roam endpoints failed: {last}")]
    Exhausted { last: String },
    #[error("invalid upstream response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Server configuration error: ROAM_API_TOKEN missing")]
    MissingToken,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingToken => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(UpstreamError::Status { status, .. })
                if status.is_client_error() || status.is_server_error() =>
            {
                *status
            }
            // A stray 3xx (e.g. 308 without Location) is not something to relay.
            ApiError::Upstream(UpstreamError::Status { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Upstream(UpstreamError::Status { body, .. }) => {
                format!("Roam API error: {body}")
            }
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!("request failed with {status}: {message}");
        }
        (status, Json(ErrResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_relayed() {
        let err = ApiError::from(UpstreamError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "bad token".into(),
        });
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn exhaustion_and_config_errors_are_500() {
        let err = ApiError::from(UpstreamError::Exhausted {
            last: "500: boom".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "All Roam endpoints failed: 500: boom");
        assert_eq!(ApiError::MissingToken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn redirect_status_becomes_bad_gateway() {
        let err = ApiError::from(UpstreamError::Status {
            status: StatusCode::PERMANENT_REDIRECT,
            body: String::new(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
