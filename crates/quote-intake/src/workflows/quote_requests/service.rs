use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use mime::Mime;
use tracing::{info, warn};

use crate::config::{NotificationConfig, UploadLimits};

use super::attachments::{AttachmentManager, AttachmentSource, StagedFiles};
use super::dependents;
use super::domain::{
    Actor, Application, ApplicationId, Dependent, Principal, QuoteStatus, Role,
};
use super::intake::{
    IntakeContext, IntakeGuard, PrincipalPlan, QuoteRequestPayload, ValidationErrors,
};
use super::lifecycle::StateTransitionError;
use super::notes::NotesLedger;
use super::notify::NotificationDispatcher;
use super::repository::{
    Notifier, QuoteDashboard, QuoteEvent, QuoteEventKind, QuoteRequestFilter,
    QuoteRequestRecord, QuoteRequestRepository, RepositoryError,
};
use super::storage::{DocumentKind, FileStore, StorageError, UploadPolicy};

/// Transaction coordinator for quote requests.
///
/// Every mutating operation validates first, stages file writes in a [`StagedFiles`]
/// batch, and commits the record with a single repository call. Replaced files are only
/// deleted after that call succeeds; anything written for a failed call is removed.
pub struct QuoteRequestService<R, F, N> {
    repository: Arc<R>,
    pub(super) attachments: AttachmentManager<F>,
    pub(super) guard: IntakeGuard,
    dispatcher: NotificationDispatcher<N>,
}

/// A stored attachment handed back to an authorized reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub media_type: Mime,
    pub bytes: Vec<u8>,
}

impl<R, F, N> QuoteRequestService<R, F, N>
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        files: Arc<F>,
        notifier: Arc<N>,
        limits: UploadLimits,
        notifications: &NotificationConfig,
    ) -> Self {
        Self {
            repository,
            attachments: AttachmentManager::new(files),
            guard: IntakeGuard::new(UploadPolicy::new(limits)),
            dispatcher: NotificationDispatcher::new(notifier, notifications.timeout),
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        self.guard.uploads().limits()
    }

    /// Submit a new quote request owned by `actor`. The status always starts at pending.
    pub fn create(
        &self,
        actor: &Actor,
        payload: QuoteRequestPayload,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        let now = Utc::now();
        let plan = self.guard.validate(
            payload,
            IntakeContext {
                actor,
                existing_principal: None,
                today: now.date_naive(),
            },
        )?;

        let id = ApplicationId::generate();
        let record = self.within_batch(|staged| {
            let principal = plan
                .principal
                .map(|plan| self.materialize_principal(staged, plan, None))
                .transpose()?;

            let roster = if plan.application_type.includes_dependents() {
                dependents::reconcile(
                    &id,
                    Vec::new(),
                    plan.dependents,
                    &self.attachments,
                    staged,
                    now,
                )?
            } else {
                Vec::new()
            };

            let application = Application {
                id: id.clone(),
                owner_id: actor.id.clone(),
                application_type: plan.application_type,
                principal,
                status: QuoteStatus::Pending,
                fulfillment: Default::default(),
                notes: NotesLedger::new(),
                revision: 0,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };

            let stored = self.repository.insert(QuoteRequestRecord {
                application,
                dependents: roster,
            })?;
            Ok(stored)
        })?;

        info!(
            application_id = %record.application.id,
            owner = %record.application.owner_id,
            application_type = record.application.application_type.label(),
            dependents = record.dependents.len(),
            "quote request submitted"
        );
        self.announce(QuoteEventKind::Submitted, &record);
        Ok(record)
    }

    /// Edit an owned request. The type may change; fields outside the new type are cleared.
    pub fn update(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        payload: QuoteRequestPayload,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        let now = Utc::now();
        let record = self.load(id)?;
        if record.application.owner_id != actor.id {
            return Err(QuoteRequestError::Forbidden);
        }

        let plan = self.guard.validate(
            payload,
            IntakeContext {
                actor,
                existing_principal: record.application.principal.as_ref(),
                today: now.date_naive(),
            },
        )?;

        let expected = record.application.revision;
        let QuoteRequestRecord {
            mut application,
            dependents: current,
        } = record;

        let saved = self.within_batch(|staged| {
            let principal = match plan.principal {
                Some(plan) => Some(self.materialize_principal(
                    staged,
                    plan,
                    application.principal.as_ref(),
                )?),
                None => {
                    if let Some(old) = application.principal.take() {
                        self.attachments.retire(staged, &old.profile_picture);
                        self.attachments.retire(staged, &old.eid_file);
                    }
                    None
                }
            };

            let roster = if plan.application_type.includes_dependents() {
                dependents::reconcile(
                    &application.id,
                    current,
                    plan.dependents,
                    &self.attachments,
                    staged,
                    now,
                )?
            } else {
                dependents::remove_all(current, &self.attachments, staged);
                Vec::new()
            };

            application.application_type = plan.application_type;
            application.principal = principal;
            self.commit_update(application, roster, expected, now)
        })?;

        info!(
            application_id = %saved.application.id,
            revision = saved.application.revision,
            dependents = saved.dependents.len(),
            "quote request updated"
        );
        Ok(saved)
    }

    /// Fetch a request visible to `actor`.
    pub fn get(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        let record = self.load(id)?;
        if !can_view(actor, &record) {
            return Err(QuoteRequestError::Forbidden);
        }
        Ok(record)
    }

    /// Clients only ever see their own requests. Newest first.
    pub fn list(
        &self,
        actor: &Actor,
        filter: QuoteRequestFilter,
    ) -> Result<Vec<QuoteRequestRecord>, QuoteRequestError> {
        let filter = scoped_filter(actor, filter);
        let mut records = self.repository.list(&filter)?;
        records.sort_by(|left, right| {
            right
                .application
                .created_at
                .cmp(&left.application.created_at)
        });
        Ok(records)
    }

    pub fn dashboard(&self, actor: &Actor) -> Result<QuoteDashboard, QuoteRequestError> {
        let filter = scoped_filter(actor, QuoteRequestFilter::default());
        let records = self.repository.list(&filter)?;
        Ok(QuoteDashboard::tally(&records))
    }

    /// Soft-delete a request and its dependents. Stored files are kept.
    pub fn delete(&self, id: &ApplicationId, actor: &Actor) -> Result<(), QuoteRequestError> {
        let now = Utc::now();
        let record = self.load(id)?;
        let is_owner = record.application.owner_id == actor.id;
        if !is_owner && actor.role != Role::SuperAdmin {
            return Err(QuoteRequestError::Forbidden);
        }

        let expected = record.application.revision;
        let QuoteRequestRecord {
            mut application,
            dependents: mut roster,
        } = record;
        application.deleted_at = Some(now);
        for dependent in &mut roster {
            dependent.deleted_at = Some(now);
        }
        self.commit_update(application, roster, expected, now)?;

        info!(application_id = %id, actor = %actor.id, "quote request deleted");
        Ok(())
    }

    /// Read one of the request's attachments. Paths not referenced by the request are
    /// reported as not found.
    pub fn read_attachment(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        path: &str,
    ) -> Result<StoredFile, QuoteRequestError> {
        let record = self.get(id, actor)?;
        if !record.references(path) {
            return Err(QuoteRequestError::NotFound);
        }

        let bytes = match self.attachments.store().read(path) {
            Ok(bytes) => bytes,
            Err(StorageError::Missing(_)) => return Err(QuoteRequestError::NotFound),
            Err(err) => return Err(err.into()),
        };
        let media_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(StoredFile {
            path: path.to_string(),
            media_type,
            bytes,
        })
    }

    /// Load a live record; soft-deleted records count as missing.
    pub(super) fn load(&self, id: &ApplicationId) -> Result<QuoteRequestRecord, QuoteRequestError> {
        match self.repository.fetch(id)? {
            Some(record) if !record.application.is_deleted() => Ok(record),
            _ => Err(QuoteRequestError::NotFound),
        }
    }

    /// Run `work` inside a file batch, committing or rolling back its staged files.
    pub(super) fn within_batch<T>(
        &self,
        work: impl FnOnce(&mut StagedFiles) -> Result<T, QuoteRequestError>,
    ) -> Result<T, QuoteRequestError> {
        let mut staged = StagedFiles::new();
        match work(&mut staged) {
            Ok(value) => {
                self.attachments.commit(staged);
                Ok(value)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    written = staged.written().len(),
                    "quote request operation failed; rolling back staged files"
                );
                self.attachments.rollback(staged);
                Err(err)
            }
        }
    }

    pub(super) fn commit_update(
        &self,
        mut application: Application,
        roster: Vec<Dependent>,
        expected_revision: u64,
        now: DateTime<Utc>,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        application.revision = expected_revision + 1;
        application.updated_at = now;
        let stored = self.repository.update(
            QuoteRequestRecord {
                application,
                dependents: roster,
            },
            expected_revision,
        )?;
        Ok(stored)
    }

    /// Hand an event to the notifier. Failures never reach the caller.
    pub(super) fn announce(&self, kind: QuoteEventKind, record: &QuoteRequestRecord) {
        let event = QuoteEvent {
            application_id: record.application.id.clone(),
            owner_id: record.application.owner_id.clone(),
            kind,
            summary: record.application.summary(),
        };
        if let Err(err) = self.dispatcher.dispatch(event) {
            warn!(
                application_id = %record.application.id,
                ?kind,
                error = %err,
                "notification failed"
            );
        }
    }

    fn materialize_principal(
        &self,
        staged: &mut StagedFiles,
        plan: PrincipalPlan,
        existing: Option<&Principal>,
    ) -> Result<Principal, QuoteRequestError> {
        let profile_picture = self.materialize(
            staged,
            "principal.profile_picture",
            plan.profile_picture,
            existing.map(|principal| principal.profile_picture.as_str()),
            DocumentKind::PrincipalPicture,
        )?;
        let eid_file = self.materialize(
            staged,
            "principal.eid_file",
            plan.eid_file,
            existing.map(|principal| principal.eid_file.as_str()),
            DocumentKind::PrincipalEid,
        )?;

        Ok(Principal {
            name: plan.name,
            phone: plan.phone,
            eid_number: plan.eid_number,
            date_of_birth: plan.date_of_birth,
            residency: plan.residency,
            profile_picture,
            eid_file,
        })
    }

    fn materialize(
        &self,
        staged: &mut StagedFiles,
        field: &str,
        source: AttachmentSource,
        existing: Option<&str>,
        kind: DocumentKind,
    ) -> Result<String, QuoteRequestError> {
        self.attachments
            .apply(staged, source, existing, kind.prefix())?
            .ok_or_else(|| {
                ValidationErrors::single(field, "is required and the default document is unavailable")
                    .into()
            })
    }
}

pub(super) fn require_staff(actor: &Actor) -> Result<(), QuoteRequestError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(QuoteRequestError::Forbidden)
    }
}

fn can_view(actor: &Actor, record: &QuoteRequestRecord) -> bool {
    actor.role.is_staff() || record.application.owner_id == actor.id
}

fn scoped_filter(actor: &Actor, mut filter: QuoteRequestFilter) -> QuoteRequestFilter {
    if !actor.role.is_staff() {
        filter.owner = Some(actor.id.clone());
    }
    filter
}

/// Error raised by the quote request service.
#[derive(Debug, thiserror::Error)]
pub enum QuoteRequestError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("not permitted to access this quote request")]
    Forbidden,
    #[error("quote request not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for QuoteRequestError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

impl QuoteRequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QuoteRequestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QuoteRequestError::Forbidden => StatusCode::FORBIDDEN,
            QuoteRequestError::NotFound => StatusCode::NOT_FOUND,
            QuoteRequestError::StateTransition(_) => StatusCode::CONFLICT,
            QuoteRequestError::Repository(
                RepositoryError::Conflict | RepositoryError::StaleRevision { .. },
            ) => StatusCode::CONFLICT,
            QuoteRequestError::Storage(_) | QuoteRequestError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            QuoteRequestError::Storage(_) => {
                "the documents could not be stored, please try again later".to_string()
            }
            QuoteRequestError::Repository(RepositoryError::Unavailable(_)) => {
                "the quote request could not be saved, please try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}
