use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, Application, ApplicationId, ApplicationType, Dependent, Fulfillment, Principal,
    QuoteStatus, UserId,
};

/// Repository record: the application row together with the dependents it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequestRecord {
    pub application: Application,
    pub dependents: Vec<Dependent>,
}

impl QuoteRequestRecord {
    pub fn id(&self) -> &ApplicationId {
        &self.application.id
    }

    /// Every stored path referenced by this request.
    pub fn attachment_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        if let Some(principal) = &self.application.principal {
            paths.push(principal.profile_picture.as_str());
            paths.push(principal.eid_file.as_str());
        }
        for dependent in &self.dependents {
            paths.extend(dependent.attachment_paths());
        }
        let fulfillment = &self.application.fulfillment;
        paths.extend(fulfillment.quote_files.iter().map(String::as_str));
        paths.extend(fulfillment.policy_files.iter().map(String::as_str));
        paths
    }

    pub fn references(&self, path: &str) -> bool {
        self.attachment_paths().contains(&path)
    }

    pub fn summary(&self) -> QuoteRequestSummary {
        QuoteRequestSummary {
            id: self.application.id.clone(),
            owner_id: self.application.owner_id.clone(),
            application_type: self.application.application_type,
            status: self.application.status.label(),
            principal_name: self
                .application
                .principal
                .as_ref()
                .map(|principal| principal.name.clone()),
            dependent_count: self.dependents.len(),
            created_at: self.application.created_at,
            updated_at: self.application.updated_at,
        }
    }

    pub fn view(&self) -> QuoteRequestView {
        let application = &self.application;
        QuoteRequestView {
            id: application.id.clone(),
            owner_id: application.owner_id.clone(),
            application_type: application.application_type,
            status: application.status.label(),
            principal: application.principal.clone(),
            dependents: self.dependents.clone(),
            fulfillment: application.fulfillment.clone(),
            notes: application
                .notes
                .entries()
                .iter()
                .map(|note| NoteView {
                    text: note.text.clone(),
                    action: note.action.label(),
                    actor: note.actor.clone(),
                    created_at: note.created_at,
                })
                .collect(),
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

/// Selection criteria for listings. Soft-deleted records are never returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteRequestFilter {
    pub owner: Option<UserId>,
    pub status: Option<QuoteStatus>,
}

impl QuoteRequestFilter {
    pub fn matches(&self, record: &QuoteRequestRecord) -> bool {
        let application = &record.application;
        !application.is_deleted()
            && self
                .owner
                .as_ref()
                .map_or(true, |owner| &application.owner_id == owner)
            && self.status.map_or(true, |status| application.status == status)
    }
}

/// Storage abstraction so the service can be exercised in isolation.
///
/// A record and its dependents are written as one unit. `update` succeeds only when the
/// stored revision equals `expected_revision`.
pub trait QuoteRequestRepository: Send + Sync {
    fn insert(&self, record: QuoteRequestRecord) -> Result<QuoteRequestRecord, RepositoryError>;
    fn update(
        &self,
        record: QuoteRequestRecord,
        expected_revision: u64,
    ) -> Result<QuoteRequestRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<QuoteRequestRecord>, RepositoryError>;
    fn list(&self, filter: &QuoteRequestFilter) -> Result<Vec<QuoteRequestRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record was modified concurrently (expected revision {expected}, found {found})")]
    StaleRevision { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (e-mail or chat adapters live behind it).
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &QuoteEvent) -> Result<(), NotificationError>;
}

/// Resolves the authenticated caller. Session handling lives outside this crate.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, user_id: &UserId) -> Option<Actor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteEventKind {
    Submitted,
    QuoteSent,
    PolicyIssued,
    StatusChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEvent {
    pub application_id: ApplicationId,
    pub owner_id: UserId,
    pub kind: QuoteEventKind,
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification timed out")]
    TimedOut,
    #[error("notification queue is full")]
    Backlogged,
    #[error("notifier stopped before reporting a result")]
    Aborted,
}

/// Listing row for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequestSummary {
    pub id: ApplicationId,
    pub owner_id: UserId,
    pub application_type: ApplicationType,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_name: Option<String>,
    pub dependent_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub action: String,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

/// Full detail view returned to owners and staff.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequestView {
    pub id: ApplicationId,
    pub owner_id: UserId,
    pub application_type: ApplicationType,
    pub status: &'static str,
    pub principal: Option<Principal>,
    pub dependents: Vec<Dependent>,
    pub fulfillment: Fulfillment,
    pub notes: Vec<NoteView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-status counts over the requests visible to an actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuoteDashboard {
    pub total: usize,
    pub pending: usize,
    pub quote_sent: usize,
    pub completed: usize,
    pub rejected: usize,
}

impl QuoteDashboard {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a QuoteRequestRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut dashboard, record| {
                dashboard.total += 1;
                match record.application.status {
                    QuoteStatus::Pending => dashboard.pending += 1,
                    QuoteStatus::QuoteSent => dashboard.quote_sent += 1,
                    QuoteStatus::Completed => dashboard.completed += 1,
                    QuoteStatus::Rejected => dashboard.rejected += 1,
                }
                dashboard
            })
    }
}
