use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::tmdb::TmdbStatusError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    TooManyRequests,
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// TMDB 404s become our 404; anything else from upstream is a bad gateway.
    pub fn from_tmdb(err: anyhow::Error, what: &str) -> Self {
        if let Some(status) = err.downcast_ref::<TmdbStatusError>() {
            if status.is_not_found() {
                return ApiError::NotFound(format!("{} not found", what));
            }
        }
        ApiError::Upstream(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(m) | ApiError::NotFound(m) => m,
            ApiError::Unauthorized => "Invalid or missing API token".to_string(),
            ApiError::TooManyRequests => "Rate limit exceeded".to_string(),
            ApiError::Upstream(e) => {
                warn!("TMDB request failed: {:#}", e);
                "Failed to fetch data from TMDB".to_string()
            }
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                "Internal error".to_string()
            }
        };
        (status, Json(json!({"status": "error", "message": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmdb_not_found_maps_to_404() {
        let err = anyhow::Error::new(TmdbStatusError {
            status: 404,
            path: "/movie/1".to_string(),
            body: String::new(),
        });
        let api = ApiError::from_tmdb(err, "Movie");
        assert_eq!(api.status(), StatusCode::NOT_FOUND);

        let err = anyhow::Error::new(TmdbStatusError {
            status: 401,
            path: "/movie/1".to_string(),
            body: String::new(),
        });
        assert_eq!(ApiError::from_tmdb(err, "Movie").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::from_tmdb(anyhow::anyhow!("timeout"), "Movie").status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
