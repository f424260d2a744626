pub mod feed;
pub mod index;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{auth, state::AppState};

pub fn router(state: AppState) -> Router {
    let feed = Router::new()
        .route("/feed", get(feed::handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_credentials,
        ));
    Router::new()
        .route("/", get(index::handler))
        .merge(feed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{
            header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, HOST, WWW_AUTHENTICATE},
            Request, StatusCode,
        },
        response::Response,
    };
    use cdc_core::{
        campus_client::{FetchError, ScheduleSource},
        gateway::Gateway,
        model::{normalize_all, CredentialPair, RawScheduleRecord},
        render::FeedMetadata,
        store::Database,
    };
    use tower::ServiceExt;

    use crate::{error::CHALLENGE, route::router, state::AppState};

    /// "12345:abc"
    static VALID: &str = "Basic MTIzNDU6YWJj";
    /// "12345:wrong"
    static WRONG_SECRET: &str = "Basic MTIzNDU6d3Jvbmc=";

    #[derive(Default)]
    struct FakeCampusDual {
        users: HashMap<String, (String, Vec<RawScheduleRecord>)>,
        calls: Mutex<Vec<CredentialPair>>,
    }

    #[async_trait]
    impl ScheduleSource for FakeCampusDual {
        async fn fetch(
            &self,
            identifier: &str,
            secret: &str,
        ) -> Result<Vec<RawScheduleRecord>, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push(CredentialPair::new(identifier, secret));
            Ok(match self.users.get(identifier) {
                Some((expected, records)) if expected == secret => records.clone(),
                _ => vec![],
            })
        }
    }

    fn algorithms() -> RawScheduleRecord {
        RawScheduleRecord {
            title: String::from("Algorithms"),
            description: String::from("Lecture"),
            room: String::from("A1"),
            instructor: String::from("Dr. X"),
            start: 1719180000,
            end: 1719183600,
        }
    }

    fn campus_dual_with_student() -> Arc<FakeCampusDual> {
        let mut source = FakeCampusDual::default();
        source
            .users
            .insert(String::from("12345"), (String::from("abc"), vec![algorithms()]));
        Arc::new(source)
    }

    fn state(source: Arc<FakeCampusDual>, database: &Database) -> AppState {
        AppState {
            gateway: Arc::new(Gateway::new(source, database.credentials())),
            events: database.events(),
            metadata: Arc::new(FeedMetadata::default()),
        }
    }

    async fn get(state: AppState, authorization: Option<&str>) -> Response {
        let mut request = Request::builder().uri("/feed").header(HOST, "localhost:3003");
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_feed_without_credentials() {
        let database = Database::open_in_memory().unwrap();
        let source = campus_dual_with_student();
        let response = get(state(source.clone(), &database), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], CHALLENGE);
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_first_request() {
        let database = Database::open_in_memory().unwrap();
        let response = get(state(campus_dual_with_student(), &database), Some(VALID)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/calendar");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=calendar.ics"
        );
        let ics = body(response).await;
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(ics.contains("SUMMARY:Algorithms - Dr. X"));
        assert!(ics.contains("DTSTART:20240623T220000Z"));
        assert!(ics.contains("DTEND:20240623T230000Z"));
        assert_eq!(ics.matches("BEGIN:VALARM").count(), 1);
        assert!(ics.contains("TRIGGER:-PT5M"));

        let stored = database.credentials().find("12345").await.unwrap();
        assert_eq!(stored, Some(CredentialPair::new("12345", "abc")));
    }

    #[tokio::test]
    async fn test_feed_empty_schedule_for_unknown_identifier() {
        let database = Database::open_in_memory().unwrap();
        let source = Arc::new(FakeCampusDual::default());
        let response = get(state(source, &database), Some(VALID)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], CHALLENGE);
        assert!(body(response).await.is_empty());
        assert_eq!(database.credentials().find("12345").await.unwrap(), None);
    }

    /// A stored pair is confirmed with the stored secret, the provided one is ignored.
    #[tokio::test]
    async fn test_feed_stored_pair_wins() {
        let database = Database::open_in_memory().unwrap();
        let source = campus_dual_with_student();
        let response = get(state(source.clone(), &database), Some(VALID)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(state(source.clone(), &database), Some(WRONG_SECRET)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![
                CredentialPair::new("12345", "abc"),
                CredentialPair::new("12345", "abc"),
            ]
        );
    }

    #[tokio::test]
    async fn test_feed_wrong_secret_for_unknown_identifier() {
        let database = Database::open_in_memory().unwrap();
        let response = get(
            state(campus_dual_with_student(), &database),
            Some(WRONG_SECRET),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(database.credentials().find("12345").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_feed_includes_baseline() {
        let database = Database::open_in_memory().unwrap();
        let mut databases = algorithms();
        databases.title = String::from("Databases");
        databases.start += 7200;
        databases.end += 7200;
        let baseline = normalize_all(vec![algorithms(), databases]).unwrap();
        database.events().upsert_all(baseline, 1).await.unwrap();

        let response = get(state(campus_dual_with_student(), &database), Some(VALID)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let ics = body(response).await;
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("SUMMARY:Databases - Dr. X"));
    }

    #[tokio::test]
    async fn test_feed_bad_timestamp_is_internal_error() {
        let database = Database::open_in_memory().unwrap();
        let mut broken = algorithms();
        broken.end = i64::MAX;
        let mut source = FakeCampusDual::default();
        source
            .users
            .insert(String::from("12345"), (String::from("abc"), vec![broken]));
        let response = get(state(Arc::new(source), &database), Some(VALID)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn test_index() {
        let database = Database::open_in_memory().unwrap();
        let request = Request::builder()
            .uri("/")
            .header(HOST, "stundenplan.example.org")
            .body(Body::empty())
            .unwrap();
        let response = router(state(campus_dual_with_student(), &database))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("webcal://stundenplan.example.org/feed"));
    }
}
