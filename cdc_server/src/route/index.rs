use axum::{
    http::{header::HOST, HeaderMap},
    response::Html,
};
use cdc_core::render::TITLE;

/// Handle requests for the landing page, which explains how to subscribe.
pub async fn handler(headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .filter(|host| is_plain_host(host))
        .unwrap_or("localhost");
    Html(page(&format!("webcal://{host}/feed")))
}

/// The host is echoed into the page, so only host names and ports are accepted.
fn is_plain_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

fn page(calendar_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>{TITLE}</title>
  </head>
  <body>
    <h1>{TITLE}</h1>
    <p>Click the link below to add the calendar feed to your calendar application:</p>
    <a href="{calendar_url}">Add to Calendar</a>
    <p>If the calendar app does not open automatically, add the calendar manually:</p>
    <ul>
      <li>Open the Calendar app.</li>
      <li>Go to "File" &gt; "New Calendar Subscription".</li>
      <li>Enter the following URL: <code>{calendar_url}</code></li>
    </ul>
    <p>To use this service, you need your Campus Dual user id and hash:</p>
    <ul>
      <li>Your user id resembles the numbers in your student ID.</li>
      <li>The hash can be found in the timetable requests of the Campus Dual self service.</li>
    </ul>
    <p>Your calendar app asks for them once, with the user id as user name and the hash as password.</p>
  </body>
</html>
"#
    )
}
