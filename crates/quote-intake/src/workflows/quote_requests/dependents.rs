use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::attachments::{AttachmentManager, StagedFiles};
use super::domain::{ApplicationId, Dependent, DependentId};
use super::intake::{DependentFields, DependentPlan};
use super::storage::{DocumentKind, FileStore, StorageError, Upload};

/// Diff the persisted dependents of one application against an incoming list.
///
/// Matched ids are updated in place, entries without an id are created, and persisted
/// dependents missing from the list are dropped with their documents retired. An id that
/// does not belong to `current` is ignored entirely. The result follows the incoming order.
pub fn reconcile<F>(
    application_id: &ApplicationId,
    current: Vec<Dependent>,
    incoming: Vec<DependentPlan>,
    attachments: &AttachmentManager<F>,
    staged: &mut StagedFiles,
    now: DateTime<Utc>,
) -> Result<Vec<Dependent>, StorageError>
where
    F: FileStore,
{
    let mut existing: BTreeMap<DependentId, Dependent> = current
        .into_iter()
        .map(|dependent| (dependent.id.clone(), dependent))
        .collect();
    let mut keep = BTreeSet::new();
    let mut roster = Vec::with_capacity(incoming.len());

    for plan in incoming {
        match plan {
            DependentPlan::Existing {
                id,
                fields,
                profile_picture,
                eid_file,
            } => {
                if keep.contains(&id) {
                    warn!(%application_id, dependent_id = %id, "duplicate dependent id ignored");
                    continue;
                }
                let Some(mut dependent) = existing.remove(&id) else {
                    warn!(%application_id, dependent_id = %id, "unknown dependent id skipped");
                    continue;
                };

                apply_fields(&mut dependent, fields);
                if let Some(upload) = profile_picture {
                    dependent.profile_picture = attachments.replace(
                        staged,
                        Some(&dependent.profile_picture),
                        &upload,
                        DocumentKind::DependentPicture.prefix(),
                    )?;
                }
                if let Some(upload) = eid_file {
                    dependent.eid_file = attachments.replace(
                        staged,
                        Some(&dependent.eid_file),
                        &upload,
                        DocumentKind::DependentEid.prefix(),
                    )?;
                }
                dependent.updated_at = now;

                keep.insert(dependent.id.clone());
                roster.push(dependent);
            }
            DependentPlan::New {
                fields,
                profile_picture,
                eid_file,
            } => {
                let dependent = create(
                    application_id,
                    fields,
                    &profile_picture,
                    &eid_file,
                    attachments,
                    staged,
                    now,
                )?;
                debug!(%application_id, dependent_id = %dependent.id, "dependent created");
                keep.insert(dependent.id.clone());
                roster.push(dependent);
            }
        }
    }

    for removed in existing.into_values() {
        debug!(%application_id, dependent_id = %removed.id, "dependent removed");
        retire_documents(&removed, attachments, staged);
    }

    Ok(roster)
}

/// Build a new dependent, storing both documents.
pub fn create<F>(
    application_id: &ApplicationId,
    fields: DependentFields,
    profile_picture: &Upload,
    eid_file: &Upload,
    attachments: &AttachmentManager<F>,
    staged: &mut StagedFiles,
    now: DateTime<Utc>,
) -> Result<Dependent, StorageError>
where
    F: FileStore,
{
    let profile_picture = attachments.put(
        staged,
        profile_picture,
        DocumentKind::DependentPicture.prefix(),
    )?;
    let eid_file = attachments.put(staged, eid_file, DocumentKind::DependentEid.prefix())?;

    let DependentFields {
        first_name,
        middle_name,
        last_name,
        uid_number,
        eid_number,
        marital_status,
        date_of_birth,
        relationship,
        residency,
    } = fields;

    Ok(Dependent {
        id: DependentId::generate(),
        application_id: application_id.clone(),
        first_name,
        middle_name,
        last_name,
        uid_number,
        eid_number,
        marital_status,
        date_of_birth,
        relationship,
        residency,
        profile_picture,
        eid_file,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Drop every dependent, e.g. when an edit removes dependents from the application type.
pub fn remove_all<F>(
    current: Vec<Dependent>,
    attachments: &AttachmentManager<F>,
    staged: &mut StagedFiles,
) where
    F: FileStore,
{
    for dependent in &current {
        retire_documents(dependent, attachments, staged);
    }
}

fn retire_documents<F>(
    dependent: &Dependent,
    attachments: &AttachmentManager<F>,
    staged: &mut StagedFiles,
) where
    F: FileStore,
{
    for path in dependent.attachment_paths() {
        attachments.retire(staged, path);
    }
}

fn apply_fields(dependent: &mut Dependent, fields: DependentFields) {
    dependent.first_name = fields.first_name;
    dependent.middle_name = fields.middle_name;
    dependent.last_name = fields.last_name;
    dependent.uid_number = fields.uid_number;
    dependent.eid_number = fields.eid_number;
    dependent.marital_status = fields.marital_status;
    dependent.date_of_birth = fields.date_of_birth;
    dependent.relationship = fields.relationship;
    dependent.residency = fields.residency;
}
