//! Errors a feed request can end in.
//!
//! Bodies never carry details; the cause is logged instead.

use axum::{
    http::{header::WWW_AUTHENTICATE, StatusCode},
    response::{IntoResponse, Response},
};
use cdc_core::{render::RenderError, store::StoreError};
use thiserror::Error;
use tracing::error;

pub static CHALLENGE: &str = "Basic realm=\"User Visible Realm\"";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("missing or rejected credentials")]
    Unauthorized,
    #[error("rendering the calendar failed: {0}")]
    Render(#[from] RenderError),
    #[error("database failure: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        match self {
            FeedError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, CHALLENGE)]).into_response()
            }
            FeedError::Render(err) => {
                error!(error = %err, "error generating the calendar");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
            FeedError::Store(err) => {
                error!(error = %err, "database error while serving the feed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        http::{header::WWW_AUTHENTICATE, StatusCode},
        response::IntoResponse,
    };
    use cdc_core::{model::CalendarParts, render::RenderError};

    use crate::error::{FeedError, CHALLENGE};

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = FeedError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], CHALLENGE);
    }

    #[test]
    fn test_render_error_is_internal() {
        let parts = CalendarParts {
            year: 2024,
            month: 2,
            day: 30,
            hour: 0,
            minute: 0,
            second: 0,
        };
        let response = FeedError::from(RenderError::CalendarParts(parts)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
