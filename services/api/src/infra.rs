use metrics_exporter_prometheus::PrometheusHandle;
use quote_intake::workflows::quote_requests::{
    Actor, ApplicationId, IdentityProvider, NotificationError, Notifier, QuoteEvent,
    QuoteRequestFilter, QuoteRequestRecord, QuoteRequestRepository, RepositoryError, Role,
    UserId,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryQuoteRepository {
    records: Arc<Mutex<HashMap<ApplicationId, QuoteRequestRecord>>>,
}

impl QuoteRequestRepository for InMemoryQuoteRepository {
    fn insert(&self, record: QuoteRequestRecord) -> Result<QuoteRequestRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        record: QuoteRequestRecord,
        expected_revision: u64,
    ) -> Result<QuoteRequestRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let found = match guard.get(record.id()) {
            Some(stored) => stored.application.revision,
            None => return Err(RepositoryError::NotFound),
        };
        if found != expected_revision {
            return Err(RepositoryError::StaleRevision {
                expected: expected_revision,
                found,
            });
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<QuoteRequestRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self, filter: &QuoteRequestFilter) -> Result<Vec<QuoteRequestRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}

/// Fixed user directory standing in for the portal's session store.
#[derive(Default, Clone)]
pub(crate) struct InMemoryIdentityProvider {
    actors: Arc<HashMap<UserId, Actor>>,
}

impl InMemoryIdentityProvider {
    pub(crate) fn with_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        let actors = actors
            .into_iter()
            .map(|actor| (actor.id.clone(), actor))
            .collect();
        Self {
            actors: Arc::new(actors),
        }
    }

    pub(crate) fn seeded() -> Self {
        Self::with_actors([
            Actor::client("client-1"),
            Actor::client("client-2"),
            Actor::staff("admin-1", Role::Admin),
            Actor::staff("super-admin-1", Role::SuperAdmin),
        ])
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn resolve(&self, user_id: &UserId) -> Option<Actor> {
        self.actors.get(user_id).cloned()
    }
}

/// Writes quote events to the log; stands in for the e-mail transport.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogNotifier {
    recipients: Vec<String>,
}

impl LogNotifier {
    pub(crate) fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, event: &QuoteEvent) -> Result<(), NotificationError> {
        info!(
            application_id = %event.application_id.0,
            owner_id = %event.owner_id.0,
            kind = ?event.kind,
            recipients = ?self.recipients,
            summary = %event.summary,
            "quote request notification"
        );
        Ok(())
    }
}
