//! Staff-side operations: quotes, policies, and status overrides.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::domain::{Actor, ApplicationId, QuoteStatus};
use super::intake::{FieldError, ValidationErrors};
use super::lifecycle;
use super::notes::{Note, NoteAction};
use super::repository::{Notifier, QuoteEventKind, QuoteRequestRecord, QuoteRequestRepository};
use super::service::{require_staff, QuoteRequestError, QuoteRequestService};
use super::storage::{DocumentKind, FileStore, Upload};

pub const MAX_POLICY_FILES: usize = 10;
const MAX_LINK_LEN: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct QuoteSubmission {
    pub files: Vec<Upload>,
    pub payment_link: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicySubmission {
    pub files: Vec<Upload>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: QuoteStatus,
    #[serde(default)]
    pub note: Option<String>,
}

impl<R, F, N> QuoteRequestService<R, F, N>
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
{
    /// Attach a quote, replacing any earlier quote files.
    ///
    /// Pending requests move to quote sent. A rejected request may be re-quoted and stays
    /// rejected.
    pub fn send_quote(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        submission: QuoteSubmission,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        require_staff(actor)?;
        let now = Utc::now();
        let record = self.load(id)?;
        let next = lifecycle::after_quote(record.application.status)?;

        let mut errors = self.check_files(DocumentKind::Quote, &submission.files);
        let payment_link = match payment_link(submission.payment_link) {
            Ok(link) => link,
            Err(error) => {
                errors.push(error);
                None
            }
        };
        if !errors.is_empty() {
            return Err(ValidationErrors(errors).into());
        }

        let expected = record.application.revision;
        let QuoteRequestRecord {
            mut application,
            dependents,
        } = record;

        let saved = self.within_batch(|staged| {
            let mut quote_files = Vec::with_capacity(submission.files.len());
            for upload in &submission.files {
                quote_files.push(self.attachments.put(
                    staged,
                    upload,
                    DocumentKind::Quote.prefix(),
                )?);
            }
            for old in &application.fulfillment.quote_files {
                self.attachments.retire(staged, old);
            }

            application.fulfillment.quote_files = quote_files;
            if payment_link.is_some() {
                application.fulfillment.payment_link = payment_link;
            }
            application.status = next;
            application.notes = application.notes.with_appended_note(Note::new(
                NoteAction::QuoteSubmitted,
                submission.note,
                actor.id.clone(),
                now,
            ));
            self.commit_update(application, dependents, expected, now)
        })?;

        info!(
            application_id = %saved.application.id,
            files = saved.application.fulfillment.quote_files.len(),
            status = saved.application.status.label(),
            "quote sent"
        );
        self.announce(QuoteEventKind::QuoteSent, &saved);
        Ok(saved)
    }

    /// Append policy documents. Quoted requests complete; rejected requests keep their
    /// status.
    pub fn send_policy(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        submission: PolicySubmission,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        require_staff(actor)?;
        let now = Utc::now();
        let record = self.load(id)?;
        let next = lifecycle::after_policy(record.application.status)?;

        let mut errors = self.check_files(DocumentKind::Policy, &submission.files);
        if submission.files.len() > MAX_POLICY_FILES {
            errors.push(FieldError::new(
                "files",
                format!("may not include more than {MAX_POLICY_FILES} files"),
            ));
        }
        if !errors.is_empty() {
            return Err(ValidationErrors(errors).into());
        }

        let expected = record.application.revision;
        let QuoteRequestRecord {
            mut application,
            dependents,
        } = record;

        let saved = self.within_batch(|staged| {
            for upload in &submission.files {
                let path = self
                    .attachments
                    .put(staged, upload, DocumentKind::Policy.prefix())?;
                application.fulfillment.policy_files.push(path);
            }
            application.status = next;
            application.notes = application.notes.with_appended_note(Note::new(
                NoteAction::PolicySubmitted,
                submission.note,
                actor.id.clone(),
                now,
            ));
            self.commit_update(application, dependents, expected, now)
        })?;

        info!(
            application_id = %saved.application.id,
            files = saved.application.fulfillment.policy_files.len(),
            "policy sent"
        );
        self.announce(QuoteEventKind::PolicyIssued, &saved);
        Ok(saved)
    }

    /// Administrative override. Always records a note, even when the status is unchanged.
    pub fn set_status(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        update: StatusUpdate,
    ) -> Result<QuoteRequestRecord, QuoteRequestError> {
        require_staff(actor)?;
        let now = Utc::now();
        let record = self.load(id)?;

        let expected = record.application.revision;
        let previous = record.application.status;
        let QuoteRequestRecord {
            mut application,
            dependents,
        } = record;

        application.status = update.status;
        application.notes = application.notes.with_appended_note(Note::new(
            NoteAction::StatusUpdated(update.status),
            update.note,
            actor.id.clone(),
            now,
        ));
        let saved = self.commit_update(application, dependents, expected, now)?;

        info!(
            application_id = %saved.application.id,
            from = previous.label(),
            to = saved.application.status.label(),
            "status updated"
        );
        self.announce(QuoteEventKind::StatusChanged, &saved);
        Ok(saved)
    }

    fn check_files(&self, kind: DocumentKind, files: &[Upload]) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if files.is_empty() {
            errors.push(FieldError::new("files", "must include at least one file"));
        }
        for (index, upload) in files.iter().enumerate() {
            if let Err(reason) = self.guard.uploads().check(kind, upload) {
                errors.push(FieldError::new(format!("files.{index}"), reason));
            }
        }
        errors
    }
}

/// Blank links count as absent; anything else must be an absolute http(s) URL.
fn payment_link(raw: Option<String>) -> Result<Option<String>, FieldError> {
    let Some(link) = raw
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    let lower = link.to_ascii_lowercase();
    let has_scheme = ["https://", "http://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len());
    if !has_scheme || link.chars().any(char::is_whitespace) {
        return Err(FieldError::new("payment_link", "must be an http or https URL"));
    }
    if link.len() > MAX_LINK_LEN {
        return Err(FieldError::new(
            "payment_link",
            format!("may not be longer than {MAX_LINK_LEN} characters"),
        ));
    }
    Ok(Some(link))
}
