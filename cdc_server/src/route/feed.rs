use axum::{
    extract::{OriginalUri, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, HOST},
        HeaderMap, Uri,
    },
    response::{IntoResponse, Response},
    Extension,
};
use cdc_core::{
    ical::generator::Emitter,
    model::{merge, normalize_all},
    render::{render, RenderError},
};
use tracing::debug;

use crate::{auth::AuthorizedSchedule, error::FeedError, state::AppState};

/// Render the caller's schedule together with the shared baseline.
pub async fn handle(
    state: &AppState,
    schedule: AuthorizedSchedule,
    feed_url: &str,
) -> Result<Response, FeedError> {
    let own = normalize_all(schedule.events).map_err(RenderError::from)?;
    let baseline = state.events.list_all().await?;
    let events = merge(own, baseline);
    let calendar = render(&events, &state.metadata, feed_url)?;
    debug!(identifier = %schedule.identifier, events = events.len(), "serving feed");
    let response = (
        [
            (CONTENT_TYPE, "text/calendar"),
            (CONTENT_DISPOSITION, "attachment; filename=calendar.ics"),
        ],
        calendar.generate(),
    )
        .into_response();
    Ok(response)
}

/// Handle feed requests.
///
/// The credentials have already been checked by [`crate::auth::require_credentials`].
pub async fn handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Extension(schedule): Extension<AuthorizedSchedule>,
) -> Result<Response, FeedError> {
    handle(&state, schedule, &feed_url(&headers, &uri)).await
}

fn feed_url(headers: &HeaderMap, uri: &Uri) -> String {
    match headers.get(HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => format!("https://{host}{}", uri.path()),
        None => uri.path().to_string(),
    }
}
