use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Request-time errors. Startup failures use `anyhow` and abort the process
/// instead; the service never runs on partial data.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The bbox query parameter is not four comma-separated numbers in
    /// `minLat,minLng,maxLat,maxLng` order.
    #[error("Expected a comma separated list 'minLat,minLng,maxLat,maxLng', received: {0}")]
    InvalidBbox(String),

    /// The zoom path segment is empty or not a non-negative integer.
    #[error("Invalid zoom")]
    InvalidZoom,

    /// The location parameter is not `lat,lng`.
    #[error("Invalid location")]
    InvalidLocation,

    /// The `ids` query parameter is required but absent or empty.
    #[error("No electorate ID specified")]
    MissingIds,

    /// An id in the request does not name a loaded district.
    #[error("Electorate not found for ID '{0}'")]
    UnknownElectorate(String),

    /// `ids=all` would produce an oversized payload at this level of detail.
    #[error("ids=all isn't allowed at zoom level {0}")]
    ZoomTooHighForAll(u32),

    /// A lookup that the startup sanity checks guarantee cannot miss, missed.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid JSON response")]
    Serialization(#[from] serde_json::Error),
}

impl ResponseError for QueryError {
    fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Internal(_) | QueryError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header((header::CONTENT_TYPE, "text/plain; charset=utf-8"))
            .body(self.to_string())
    }
}
