//! Shape validation for client payloads.
//!
//! Everything here is pure: the guard turns a payload into an [`IntakePlan`] or a list of
//! field errors, and never touches storage. File writes happen only after a plan exists.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::attachments::{resolve_attachment, AttachmentSource};
use super::domain::{
    Actor, ApplicationType, DependentId, Emirate, MaritalStatus, Principal, Relationship,
};
use super::storage::{DocumentKind, Upload, UploadPolicy};

const MAX_TEXT_LEN: usize = 255;

/// Client-supplied create/edit payload.
#[derive(Debug, Clone, Default)]
pub struct QuoteRequestPayload {
    pub application_type: Option<ApplicationType>,
    pub principal: PrincipalInput,
    pub dependents: Vec<DependentInput>,
}

#[derive(Debug, Clone, Default)]
pub struct PrincipalInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub eid_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub residency: Option<Emirate>,
    pub profile_picture: Option<Upload>,
    pub eid_file: Option<Upload>,
}

#[derive(Debug, Clone, Default)]
pub struct DependentInput {
    pub id: Option<DependentId>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub uid_number: Option<String>,
    pub eid_number: Option<String>,
    pub marital_status: Option<MaritalStatus>,
    pub date_of_birth: Option<NaiveDate>,
    pub relationship: Option<Relationship>,
    pub residency: Option<Emirate>,
    pub profile_picture: Option<Upload>,
    pub eid_file: Option<Upload>,
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Field-level validation failures, reported together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid input: {}", join_errors(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validated principal fields and the decided source of each attachment.
#[derive(Debug, Clone)]
pub struct PrincipalPlan {
    pub name: String,
    pub phone: String,
    pub eid_number: String,
    pub date_of_birth: NaiveDate,
    pub residency: Emirate,
    pub profile_picture: AttachmentSource,
    pub eid_file: AttachmentSource,
}

/// Scalar dependent fields after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentFields {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub uid_number: Option<String>,
    pub eid_number: Option<String>,
    pub marital_status: MaritalStatus,
    pub date_of_birth: NaiveDate,
    pub relationship: Relationship,
    pub residency: Option<Emirate>,
}

/// An incoming dependent entry. Entries without an id always carry both documents.
#[derive(Debug, Clone)]
pub enum DependentPlan {
    Existing {
        id: DependentId,
        fields: DependentFields,
        profile_picture: Option<Upload>,
        eid_file: Option<Upload>,
    },
    New {
        fields: DependentFields,
        profile_picture: Upload,
        eid_file: Upload,
    },
}

#[derive(Debug, Clone)]
pub struct IntakePlan {
    pub application_type: ApplicationType,
    pub principal: Option<PrincipalPlan>,
    pub dependents: Vec<DependentPlan>,
}

/// What the guard may consult besides the payload.
#[derive(Debug, Clone, Copy)]
pub struct IntakeContext<'a> {
    pub actor: &'a Actor,
    pub existing_principal: Option<&'a Principal>,
    pub today: NaiveDate,
}

/// Turns payloads into plans, enforcing the type-dependent requiredness rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntakeGuard {
    uploads: UploadPolicy,
}

impl IntakeGuard {
    pub fn new(uploads: UploadPolicy) -> Self {
        Self { uploads }
    }

    pub fn uploads(&self) -> &UploadPolicy {
        &self.uploads
    }

    pub fn validate(
        &self,
        payload: QuoteRequestPayload,
        context: IntakeContext<'_>,
    ) -> Result<IntakePlan, ValidationErrors> {
        let mut errors = Vec::new();

        let Some(application_type) = payload.application_type else {
            return Err(ValidationErrors::single("application_type", "is required"));
        };

        let principal = if application_type.includes_principal() {
            self.principal_plan(payload.principal, &context, &mut errors)
        } else {
            None
        };

        let mut dependents = Vec::new();
        if application_type.includes_dependents() {
            if payload.dependents.is_empty() {
                errors.push(FieldError::new(
                    "dependents",
                    "must include at least one dependent",
                ));
            }
            for (index, input) in payload.dependents.into_iter().enumerate() {
                if let Some(plan) = self.dependent_plan(index, input, &context, &mut errors) {
                    dependents.push(plan);
                }
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        Ok(IntakePlan {
            application_type,
            principal,
            dependents,
        })
    }

    fn principal_plan(
        &self,
        input: PrincipalInput,
        context: &IntakeContext<'_>,
        errors: &mut Vec<FieldError>,
    ) -> Option<PrincipalPlan> {
        let name = required_text("principal.name", input.name, errors);
        let phone = required_text("principal.phone", input.phone, errors);
        let eid_number = required_text("principal.eid_number", input.eid_number, errors);
        let date_of_birth = past_date(
            "principal.date_of_birth",
            input.date_of_birth,
            context.today,
            errors,
        );
        let residency = required("principal.residency", input.residency, errors);

        let existing = context.existing_principal;
        let profile_picture = self.principal_attachment(
            "principal.profile_picture",
            DocumentKind::PrincipalPicture,
            input.profile_picture,
            existing.map(|principal| principal.profile_picture.as_str()),
            context.actor.defaults.profile_picture.as_deref(),
            errors,
        );
        let eid_file = self.principal_attachment(
            "principal.eid_file",
            DocumentKind::PrincipalEid,
            input.eid_file,
            existing.map(|principal| principal.eid_file.as_str()),
            context.actor.defaults.eid_file.as_deref(),
            errors,
        );

        Some(PrincipalPlan {
            name: name?,
            phone: phone?,
            eid_number: eid_number?,
            date_of_birth: date_of_birth?,
            residency: residency?,
            profile_picture: profile_picture?,
            eid_file: eid_file?,
        })
    }

    fn principal_attachment(
        &self,
        field: &str,
        kind: DocumentKind,
        upload: Option<Upload>,
        existing: Option<&str>,
        owner_default: Option<&str>,
        errors: &mut Vec<FieldError>,
    ) -> Option<AttachmentSource> {
        let upload = self.checked_upload(field, kind, upload, errors)?;
        match resolve_attachment(upload, existing, owner_default, true) {
            Ok(source) => Some(source),
            Err(missing) => {
                errors.push(FieldError::new(field, missing.to_string()));
                None
            }
        }
    }

    fn dependent_plan(
        &self,
        index: usize,
        input: DependentInput,
        context: &IntakeContext<'_>,
        errors: &mut Vec<FieldError>,
    ) -> Option<DependentPlan> {
        let field = |name: &str| format!("dependents.{index}.{name}");

        let first_name = required_text(&field("first_name"), input.first_name, errors);
        let last_name = required_text(&field("last_name"), input.last_name, errors);
        let middle_name = optional_text(&field("middle_name"), input.middle_name, errors);
        let uid_number = optional_text(&field("uid_number"), input.uid_number, errors);
        let eid_number = optional_text(&field("eid_number"), input.eid_number, errors);
        let marital_status = required(&field("marital_status"), input.marital_status, errors);
        let date_of_birth = past_date(
            &field("date_of_birth"),
            input.date_of_birth,
            context.today,
            errors,
        );
        let relationship = required(&field("relationship"), input.relationship, errors);

        // New dependents bring their own documents; existing ones keep what is on file.
        let files_required = input.id.is_none();
        let profile_picture = self.dependent_upload(
            &field("profile_picture"),
            DocumentKind::DependentPicture,
            input.profile_picture,
            files_required,
            errors,
        );
        let eid_file = self.dependent_upload(
            &field("eid_file"),
            DocumentKind::DependentEid,
            input.eid_file,
            files_required,
            errors,
        );

        let fields = DependentFields {
            first_name: first_name?,
            middle_name: middle_name?,
            last_name: last_name?,
            uid_number: uid_number?,
            eid_number: eid_number?,
            marital_status: marital_status?,
            date_of_birth: date_of_birth?,
            relationship: relationship?,
            residency: input.residency,
        };
        let (profile_picture, eid_file) = (profile_picture?, eid_file?);

        match input.id {
            Some(id) => Some(DependentPlan::Existing {
                id,
                fields,
                profile_picture,
                eid_file,
            }),
            None => Some(DependentPlan::New {
                fields,
                profile_picture: profile_picture?,
                eid_file: eid_file?,
            }),
        }
    }

    fn dependent_upload(
        &self,
        field: &str,
        kind: DocumentKind,
        upload: Option<Upload>,
        required: bool,
        errors: &mut Vec<FieldError>,
    ) -> Option<Option<Upload>> {
        let upload = self.checked_upload(field, kind, upload, errors)?;
        if required && upload.is_none() {
            errors.push(FieldError::new(field, "is required"));
            return None;
        }
        Some(upload)
    }

    /// `None` means the upload was rejected; `Some(None)` means nothing was uploaded.
    fn checked_upload(
        &self,
        field: &str,
        kind: DocumentKind,
        upload: Option<Upload>,
        errors: &mut Vec<FieldError>,
    ) -> Option<Option<Upload>> {
        match upload {
            Some(upload) => match self.uploads.check(kind, &upload) {
                Ok(()) => Some(Some(upload)),
                Err(reason) => {
                    errors.push(FieldError::new(field, reason));
                    None
                }
            },
            None => Some(None),
        }
    }
}

fn required<T>(field: &str, value: Option<T>, errors: &mut Vec<FieldError>) -> Option<T> {
    if value.is_none() {
        errors.push(FieldError::new(field, "is required"));
    }
    value
}

fn required_text(
    field: &str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match optional_text(field, value, errors) {
        Some(Some(text)) => Some(text),
        Some(None) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        None => None,
    }
}

/// Blank text counts as absent. `None` signals a length violation.
fn optional_text(
    field: &str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<Option<String>> {
    let trimmed = value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    match trimmed {
        Some(text) if text.chars().count() > MAX_TEXT_LEN => {
            errors.push(FieldError::new(
                field,
                format!("may not be longer than {MAX_TEXT_LEN} characters"),
            ));
            None
        }
        other => Some(other),
    }
}

fn past_date(
    field: &str,
    value: Option<NaiveDate>,
    today: NaiveDate,
    errors: &mut Vec<FieldError>,
) -> Option<NaiveDate> {
    let date = required(field, value, errors)?;
    if date >= today {
        errors.push(FieldError::new(field, "must be a date before today"));
        return None;
    }
    Some(date)
}
