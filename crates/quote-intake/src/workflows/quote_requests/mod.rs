//! Health-insurance quote requests: client intake, staff fulfillment, and the documents
//! attached along the way.
//!
//! A request is committed as one record (application plus dependents) with an optimistic
//! revision. File writes are staged around that commit so a failed operation neither leaves
//! new blobs behind nor loses the ones already on file.

pub mod attachments;
pub mod dependents;
pub mod domain;
pub mod fulfillment;
pub mod intake;
pub mod lifecycle;
pub mod notes;
pub(crate) mod notify;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;

#[cfg(test)]
mod tests;

pub use attachments::{
    resolve_attachment, AttachmentManager, AttachmentSource, MissingAttachment, StagedFiles,
};
pub use domain::{
    Actor, Application, ApplicationId, ApplicationType, DefaultDocuments, Dependent, DependentId,
    Emirate, Fulfillment, MaritalStatus, Principal, QuoteStatus, Relationship, Role, UserId,
};
pub use fulfillment::{PolicySubmission, QuoteSubmission, StatusUpdate, MAX_POLICY_FILES};
pub use intake::{
    DependentInput, FieldError, IntakeGuard, PrincipalInput, QuoteRequestPayload,
    ValidationErrors,
};
pub use lifecycle::{FulfillmentAction, StateTransitionError};
pub use notes::{Note, NoteAction, NotesLedger};
pub use repository::{
    IdentityProvider, NotificationError, Notifier, QuoteDashboard, QuoteEvent, QuoteEventKind,
    QuoteRequestFilter, QuoteRequestRecord, QuoteRequestRepository, QuoteRequestSummary,
    QuoteRequestView, RepositoryError,
};
pub use router::{error_response, quote_request_router, request_body_limit, USER_HEADER};
pub use service::{QuoteRequestError, QuoteRequestService, StoredFile};
pub use storage::{
    DocumentKind, FileStore, LocalFileStore, MemoryFileStore, StorageError, Upload, UploadPolicy,
};
