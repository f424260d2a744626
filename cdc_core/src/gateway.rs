//! Decides whether a credential pair may read a feed.
//!
//! A pair that was never seen is tested against Campus Dual and remembered when it works.
//! For a known identifier the *stored* secret is confirmed instead; the secret sent with the
//! request is not looked at. Campus Dual answers wrong credentials with an empty list, so an
//! empty schedule always counts as a rejection.

use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    campus_client::{FetchError, ScheduleSource},
    model::{CredentialPair, RawScheduleRecord},
    store::{CredentialStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPath {
    /// The identifier was stored, its stored secret was confirmed.
    ConfirmKnown,
    /// The identifier was new, the provided secret was tested and saved.
    TestNew,
}

#[derive(Debug)]
pub enum Rejection {
    EmptySchedule,
    Fetch(FetchError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptySchedule => write!(f, "upstream returned an empty schedule"),
            Rejection::Fetch(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug)]
pub enum AuthOutcome {
    Authorized {
        identifier: String,
        path: AuthPath,
        events: Vec<RawScheduleRecord>,
    },
    Unauthorized(Rejection),
}

pub struct Gateway {
    source: Arc<dyn ScheduleSource>,
    credentials: CredentialStore,
}

impl Gateway {
    pub fn new(source: Arc<dyn ScheduleSource>, credentials: CredentialStore) -> Self {
        Self {
            source,
            credentials,
        }
    }

    /// Run the lookup / confirm / test sequence for `provided`.
    ///
    /// Only store failures are errors; every upstream problem ends in [`AuthOutcome::Unauthorized`].
    pub async fn authenticate(&self, provided: &CredentialPair) -> Result<AuthOutcome, StoreError> {
        let identifier = provided.identifier.clone();
        match self.credentials.find(&provided.identifier).await? {
            Some(stored) => {
                debug!(%identifier, "known identifier, confirming stored credentials");
                let outcome = match self.fetch(&stored).await {
                    Ok(events) => AuthOutcome::Authorized {
                        identifier,
                        path: AuthPath::ConfirmKnown,
                        events,
                    },
                    Err(rejection) => AuthOutcome::Unauthorized(rejection),
                };
                Ok(outcome)
            }
            None => {
                debug!(%identifier, "unknown identifier, testing provided credentials");
                let events = match self.fetch(provided).await {
                    Ok(events) => events,
                    Err(rejection) => return Ok(AuthOutcome::Unauthorized(rejection)),
                };
                self.credentials.save(provided).await?;
                Ok(AuthOutcome::Authorized {
                    identifier,
                    path: AuthPath::TestNew,
                    events,
                })
            }
        }
    }

    async fn fetch(&self, pair: &CredentialPair) -> Result<Vec<RawScheduleRecord>, Rejection> {
        let events = self
            .source
            .fetch(&pair.identifier, &pair.secret)
            .await
            .map_err(Rejection::Fetch)?;
        if events.is_empty() {
            return Err(Rejection::EmptySchedule);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::gateway::{AuthOutcome, AuthPath, Gateway, Rejection};
    use crate::model::CredentialPair;
    use crate::store::Database;
    use crate::testing::{record, FakeSource};

    fn gateway(source: &Arc<FakeSource>, database: &Database) -> Gateway {
        Gateway::new(source.clone(), database.credentials())
    }

    #[tokio::test]
    async fn test_new_credentials_are_tested_and_saved() {
        let database = Database::open_in_memory().unwrap();
        let source = Arc::new(FakeSource::new().with_user(
            "12345",
            "abc",
            vec![record("Algorithms", 1719180000, 1719183600)],
        ));
        let outcome = gateway(&source, &database)
            .authenticate(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        match outcome {
            AuthOutcome::Authorized { path, events, .. } => {
                assert_eq!(path, AuthPath::TestNew);
                assert_eq!(events.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let stored = database.credentials().find("12345").await.unwrap();
        assert_eq!(stored, Some(CredentialPair::new("12345", "abc")));
    }

    #[tokio::test]
    async fn test_known_credentials_are_confirmed() {
        let database = Database::open_in_memory().unwrap();
        database
            .credentials()
            .save(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        let source = Arc::new(FakeSource::new().with_user(
            "12345",
            "abc",
            vec![record("Algorithms", 1719180000, 1719183600)],
        ));
        let outcome = gateway(&source, &database)
            .authenticate(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Authorized {
                path: AuthPath::ConfirmKnown,
                ..
            }
        ));
        assert_eq!(source.calls(), vec![CredentialPair::new("12345", "abc")]);
    }

    /// A stored pair wins over whatever secret the request brings along.
    #[tokio::test]
    async fn test_stored_secret_wins_over_provided() {
        let database = Database::open_in_memory().unwrap();
        database
            .credentials()
            .save(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        let source = Arc::new(FakeSource::new().with_user(
            "12345",
            "abc",
            vec![record("Algorithms", 1719180000, 1719183600)],
        ));
        let outcome = gateway(&source, &database)
            .authenticate(&CredentialPair::new("12345", "wrong"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Authorized {
                path: AuthPath::ConfirmKnown,
                ..
            }
        ));
        assert_eq!(source.calls(), vec![CredentialPair::new("12345", "abc")]);
    }

    #[tokio::test]
    async fn test_empty_schedule_is_rejected_and_not_saved() {
        let database = Database::open_in_memory().unwrap();
        let source = Arc::new(FakeSource::new());
        let outcome = gateway(&source, &database)
            .authenticate(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Unauthorized(Rejection::EmptySchedule)
        ));
        assert_eq!(database.credentials().find("12345").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_rejected() {
        let database = Database::open_in_memory().unwrap();
        database
            .credentials()
            .save(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        let source = Arc::new(FakeSource::new().unreachable());
        let outcome = gateway(&source, &database)
            .authenticate(&CredentialPair::new("12345", "abc"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Unauthorized(Rejection::Fetch(_))
        ));
        // the stored pair stays, the next request may succeed again
        assert!(database.credentials().find("12345").await.unwrap().is_some());
    }
}
