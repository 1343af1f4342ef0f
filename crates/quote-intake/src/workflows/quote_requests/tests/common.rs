use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::config::{NotificationConfig, UploadLimits};
use crate::workflows::quote_requests::domain::{
    Actor, ApplicationId, ApplicationType, DefaultDocuments, Emirate, MaritalStatus,
    Relationship, Role, UserId,
};
use crate::workflows::quote_requests::intake::{
    DependentInput, PrincipalInput, QuoteRequestPayload,
};
use crate::workflows::quote_requests::repository::{
    IdentityProvider, NotificationError, Notifier, QuoteEvent, QuoteRequestFilter,
    QuoteRequestRecord, QuoteRequestRepository, RepositoryError,
};
use crate::workflows::quote_requests::service::QuoteRequestService;
use crate::workflows::quote_requests::storage::{
    FileStore, MemoryFileStore, StorageError, Upload,
};

pub(super) const CLIENT_ID: &str = "client-1";
pub(super) const OTHER_CLIENT_ID: &str = "client-2";
pub(super) const ADMIN_ID: &str = "admin-1";
pub(super) const SUPER_ADMIN_ID: &str = "root-1";

pub(super) fn client() -> Actor {
    Actor::client(CLIENT_ID)
}

pub(super) fn other_client() -> Actor {
    Actor::client(OTHER_CLIENT_ID)
}

pub(super) fn admin() -> Actor {
    Actor::staff(ADMIN_ID, Role::Admin)
}

pub(super) fn super_admin() -> Actor {
    Actor::staff(SUPER_ADMIN_ID, Role::SuperAdmin)
}

/// Client whose account already holds a profile picture and an identity document.
pub(super) fn client_with_defaults(files: &MemoryFileStore) -> Actor {
    files.put("users/profile-pictures/default.png", png_bytes());
    files.put("users/eid-files/default.pdf", pdf_bytes());
    client().with_defaults(DefaultDocuments {
        profile_picture: Some("users/profile-pictures/default.png".to_string()),
        eid_file: Some("users/eid-files/default.pdf".to_string()),
    })
}

pub(super) fn png_bytes() -> Vec<u8> {
    b"\x89PNG\r\n\x1a\nfixture".to_vec()
}

pub(super) fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.7 fixture".to_vec()
}

pub(super) fn png(name: &str) -> Upload {
    Upload::new(format!("{name}.png"), png_bytes())
}

pub(super) fn pdf(name: &str) -> Upload {
    Upload::new(format!("{name}.pdf"), pdf_bytes())
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn principal_input() -> PrincipalInput {
    PrincipalInput {
        name: Some("Layla Haddad".to_string()),
        phone: Some("+971500000001".to_string()),
        eid_number: Some("784-1990-1234567-1".to_string()),
        date_of_birth: Some(date(1990, 4, 12)),
        residency: Some(Emirate::Dubai),
        profile_picture: Some(png("principal")),
        eid_file: Some(pdf("principal-eid")),
    }
}

pub(super) fn dependent_input(first_name: &str) -> DependentInput {
    DependentInput {
        id: None,
        first_name: Some(first_name.to_string()),
        middle_name: None,
        last_name: Some("Haddad".to_string()),
        uid_number: None,
        eid_number: None,
        marital_status: Some(MaritalStatus::Single),
        date_of_birth: Some(date(2015, 6, 1)),
        relationship: Some(Relationship::Child),
        residency: Some(Emirate::Dubai),
        profile_picture: Some(png(first_name)),
        eid_file: Some(pdf(first_name)),
    }
}

pub(super) fn self_payload() -> QuoteRequestPayload {
    QuoteRequestPayload {
        application_type: Some(ApplicationType::SelfOnly),
        principal: principal_input(),
        dependents: Vec::new(),
    }
}

pub(super) fn dependents_payload(names: &[&str]) -> QuoteRequestPayload {
    QuoteRequestPayload {
        application_type: Some(ApplicationType::Dependents),
        principal: PrincipalInput::default(),
        dependents: names.iter().map(|name| dependent_input(name)).collect(),
    }
}

pub(super) fn family_payload(names: &[&str]) -> QuoteRequestPayload {
    QuoteRequestPayload {
        application_type: Some(ApplicationType::SelfAndDependents),
        principal: principal_input(),
        dependents: names.iter().map(|name| dependent_input(name)).collect(),
    }
}

pub(super) fn notification_config() -> NotificationConfig {
    NotificationConfig {
        timeout: Duration::from_millis(200),
        recipients: vec!["quotes@example.com".to_string()],
    }
}

pub(super) type TestService = QuoteRequestService<MemoryRepository, MemoryFileStore, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) files: Arc<MemoryFileStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

pub(super) fn harness() -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let files = Arc::new(MemoryFileStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = QuoteRequestService::new(
        repository.clone(),
        files.clone(),
        notifier.clone(),
        UploadLimits::default(),
        &notification_config(),
    );
    Harness {
        service,
        repository,
        files,
        notifier,
    }
}

pub(super) fn service_with<R, F, N>(
    repository: Arc<R>,
    files: Arc<F>,
    notifier: Arc<N>,
) -> QuoteRequestService<R, F, N>
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
{
    QuoteRequestService::new(
        repository,
        files,
        notifier,
        UploadLimits::default(),
        &notification_config(),
    )
}

/// Create a request and move it to `quote_sent`.
pub(super) fn quoted_request(harness: &Harness) -> QuoteRequestRecord {
    use crate::workflows::quote_requests::fulfillment::QuoteSubmission;

    let record = harness
        .service
        .create(&client(), self_payload())
        .expect("request created");
    harness
        .service
        .send_quote(
            &record.application.id,
            &admin(),
            QuoteSubmission {
                files: vec![pdf("quote")],
                payment_link: None,
                note: None,
            },
        )
        .expect("quote sent")
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, QuoteRequestRecord>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &ApplicationId) -> QuoteRequestRecord {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("record stored")
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }
}

impl QuoteRequestRepository for MemoryRepository {
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
        let stored = guard.get(record.id()).ok_or(RepositoryError::NotFound)?;
        if stored.application.revision != expected_revision {
            return Err(RepositoryError::StaleRevision {
                expected: expected_revision,
                found: stored.application.revision,
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

/// Accepts inserts, but every update loses the race against another writer.
#[derive(Default)]
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
}

impl QuoteRequestRepository for RacingRepository {
    fn insert(&self, record: QuoteRequestRecord) -> Result<QuoteRequestRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(
        &self,
        _record: QuoteRequestRecord,
        expected_revision: u64,
    ) -> Result<QuoteRequestRecord, RepositoryError> {
        Err(RepositoryError::StaleRevision {
            expected: expected_revision,
            found: expected_revision + 1,
        })
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<QuoteRequestRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self, filter: &QuoteRequestFilter) -> Result<Vec<QuoteRequestRecord>, RepositoryError> {
        self.inner.list(filter)
    }
}

pub(super) struct UnavailableRepository;

impl QuoteRequestRepository for UnavailableRepository {
    fn insert(&self, _record: QuoteRequestRecord) -> Result<QuoteRequestRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _record: QuoteRequestRecord,
        _expected_revision: u64,
    ) -> Result<QuoteRequestRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<QuoteRequestRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &QuoteRequestFilter) -> Result<Vec<QuoteRequestRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<QuoteEvent>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<QuoteEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &QuoteEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _event: &QuoteEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay refused".to_string()))
    }
}

pub(super) struct PanickingNotifier;

impl Notifier for PanickingNotifier {
    fn notify(&self, _event: &QuoteEvent) -> Result<(), NotificationError> {
        panic!("mail template missing");
    }
}

pub(super) struct SlowNotifier(pub(super) Duration);

impl Notifier for SlowNotifier {
    fn notify(&self, _event: &QuoteEvent) -> Result<(), NotificationError> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

/// Memory store that refuses writes once `remaining_writes` is used up.
pub(super) struct FlakyFileStore {
    pub(super) inner: MemoryFileStore,
    remaining_writes: AtomicUsize,
}

impl FlakyFileStore {
    pub(super) fn allowing(writes: usize) -> Self {
        Self {
            inner: MemoryFileStore::default(),
            remaining_writes: AtomicUsize::new(writes),
        }
    }
}

impl FileStore for FlakyFileStore {
    fn store(
        &self,
        prefix: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let allowed = self
            .remaining_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StorageError::Write {
                path: prefix.to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.inner.store(prefix, extension, bytes)
    }

    fn delete(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.delete(path)
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(path)
    }

    fn copy(&self, source: &str, destination: &str) -> Result<bool, StorageError> {
        self.inner.copy(source, destination)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read(path)
    }
}

#[derive(Default)]
pub(super) struct StaticIdentity {
    actors: HashMap<UserId, Actor>,
}

impl StaticIdentity {
    pub(super) fn with(actors: impl IntoIterator<Item = Actor>) -> Self {
        Self {
            actors: actors
                .into_iter()
                .map(|actor| (actor.id.clone(), actor))
                .collect(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve(&self, user_id: &UserId) -> Option<Actor> {
        self.actors.get(user_id).cloned()
    }
}

pub(super) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
