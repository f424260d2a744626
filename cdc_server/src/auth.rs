//! Basic authentication in front of the feed.
//!
//! The credentials are the Campus Dual user id and hash, sent as `Authorization: Basic
//! base64(id:hash)`. Calendar apps prompt for them when they see the challenge.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use cdc_core::{
    gateway::AuthOutcome,
    model::{CredentialPair, RawScheduleRecord},
};
use tracing::{debug, info, warn};

use crate::{error::FeedError, state::AppState};

/// The caller's own schedule, attached to the request once the credentials are accepted.
#[derive(Debug, Clone)]
pub struct AuthorizedSchedule {
    pub identifier: String,
    pub events: Vec<RawScheduleRecord>,
}

/// Middleware for [`axum::middleware::from_fn_with_state`] guarding the feed.
pub async fn require_credentials(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, FeedError> {
    let Some(provided) = basic_credentials(request.headers()) else {
        debug!("request without usable credentials");
        return Err(FeedError::Unauthorized);
    };
    info!(identifier = %provided.identifier, "received credentials");
    match state.gateway.authenticate(&provided).await? {
        AuthOutcome::Authorized {
            identifier,
            path,
            events,
        } => {
            info!(%identifier, ?path, events = events.len(), "authentication complete");
            request
                .extensions_mut()
                .insert(AuthorizedSchedule { identifier, events });
            Ok(next.run(request).await)
        }
        AuthOutcome::Unauthorized(rejection) => {
            warn!(identifier = %provided.identifier, reason = %rejection, "invalid credentials");
            Err(FeedError::Unauthorized)
        }
    }
}

/// Decode the Basic credentials, `None` if absent or unusable.
fn basic_credentials(headers: &HeaderMap) -> Option<CredentialPair> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (identifier, secret) = decoded.split_once(':')?;
    if identifier.is_empty() || secret.is_empty() {
        return None;
    }
    Some(CredentialPair::new(identifier, secret))
}
