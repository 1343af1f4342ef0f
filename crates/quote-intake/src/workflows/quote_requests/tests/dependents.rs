use super::common::*;
use std::sync::Arc;

use chrono::Utc;

use crate::workflows::quote_requests::attachments::{AttachmentManager, StagedFiles};
use crate::workflows::quote_requests::dependents::{create, reconcile, remove_all};
use crate::workflows::quote_requests::domain::{
    ApplicationId, Dependent, DependentId, MaritalStatus, Relationship,
};
use crate::workflows::quote_requests::intake::{DependentFields, DependentPlan};
use crate::workflows::quote_requests::storage::{FileStore, MemoryFileStore};

fn fields(first_name: &str) -> DependentFields {
    DependentFields {
        first_name: first_name.to_string(),
        middle_name: None,
        last_name: "Haddad".to_string(),
        uid_number: None,
        eid_number: None,
        marital_status: MaritalStatus::Single,
        date_of_birth: date(2016, 2, 2),
        relationship: Relationship::Child,
        residency: None,
    }
}

fn new_plan(first_name: &str) -> DependentPlan {
    DependentPlan::New {
        fields: fields(first_name),
        profile_picture: png(first_name),
        eid_file: pdf(first_name),
    }
}

fn keep_plan(dependent: &Dependent, first_name: &str) -> DependentPlan {
    DependentPlan::Existing {
        id: dependent.id.clone(),
        fields: fields(first_name),
        profile_picture: None,
        eid_file: None,
    }
}

struct Roster {
    application_id: ApplicationId,
    manager: AttachmentManager<MemoryFileStore>,
    files: Arc<MemoryFileStore>,
    dependents: Vec<Dependent>,
}

fn roster(names: &[&str]) -> Roster {
    let files = Arc::new(MemoryFileStore::default());
    let manager = AttachmentManager::new(files.clone());
    let application_id = ApplicationId("app-under-test".to_string());
    let mut staged = StagedFiles::new();
    let dependents = names
        .iter()
        .map(|name| {
            create(
                &application_id,
                fields(name),
                &png(name),
                &pdf(name),
                &manager,
                &mut staged,
                Utc::now(),
            )
            .expect("dependent created")
        })
        .collect();
    manager.commit(staged);
    Roster {
        application_id,
        manager,
        files,
        dependents,
    }
}

#[test]
fn reconcile_keeps_matched_creates_new_and_drops_the_rest() {
    let Roster {
        application_id,
        manager,
        files,
        dependents,
    } = roster(&["Adam", "Badr", "Celine"]);
    let (a, b, c) = (
        dependents[0].clone(),
        dependents[1].clone(),
        dependents[2].clone(),
    );
    let mut staged = StagedFiles::new();

    let result = reconcile(
        &application_id,
        dependents,
        vec![keep_plan(&b, "Bader"), new_plan("Dana")],
        &manager,
        &mut staged,
        Utc::now(),
    )
    .expect("reconciled");
    manager.commit(staged);

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].id, b.id);
    assert_eq!(result[0].first_name, "Bader");
    assert_eq!(result[0].profile_picture, b.profile_picture);
    assert_ne!(result[1].id, a.id);
    assert_ne!(result[1].id, c.id);
    assert_eq!(result[1].first_name, "Dana");
    assert_eq!(result[1].application_id, application_id);

    for removed in [&a, &c] {
        for path in removed.attachment_paths() {
            assert!(!files.exists(path).expect("exists"), "{path} should be deleted");
        }
    }
    for kept in result.iter().flat_map(|dependent| dependent.attachment_paths()) {
        assert!(files.exists(kept).expect("exists"));
    }
}

#[test]
fn reconcile_skips_ids_from_other_applications() {
    let Roster {
        application_id,
        manager,
        files,
        dependents,
    } = roster(&["Adam"]);
    let adam = dependents[0].clone();
    let before = files.len();
    let mut staged = StagedFiles::new();

    let forged = DependentPlan::Existing {
        id: DependentId("belongs-elsewhere".to_string()),
        fields: fields("Mallory"),
        profile_picture: Some(png("mallory")),
        eid_file: None,
    };
    let result = reconcile(
        &application_id,
        dependents,
        vec![keep_plan(&adam, "Adam"), forged],
        &manager,
        &mut staged,
        Utc::now(),
    )
    .expect("reconciled");
    manager.commit(staged);

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].id, adam.id);
    assert!(result.iter().all(|dependent| dependent.first_name != "Mallory"));
    assert_eq!(files.len(), before, "no file written for the forged entry");
}

#[test]
fn reconcile_replaces_supplied_documents_after_commit() {
    let Roster {
        application_id,
        manager,
        files,
        dependents,
    } = roster(&["Adam"]);
    let adam = dependents[0].clone();
    let mut staged = StagedFiles::new();

    let plan = DependentPlan::Existing {
        id: adam.id.clone(),
        fields: fields("Adam"),
        profile_picture: Some(png("adam-new")),
        eid_file: None,
    };
    let result = reconcile(
        &application_id,
        dependents,
        vec![plan],
        &manager,
        &mut staged,
        Utc::now(),
    )
    .expect("reconciled");

    let updated = &result[0];
    assert_ne!(updated.profile_picture, adam.profile_picture);
    assert_eq!(updated.eid_file, adam.eid_file);
    assert!(
        files.exists(&adam.profile_picture).expect("exists"),
        "old picture kept until commit"
    );

    manager.commit(staged);
    assert!(!files.exists(&adam.profile_picture).expect("exists"));
    assert!(files.exists(&updated.profile_picture).expect("exists"));
}

#[test]
fn reconcile_ignores_repeated_ids() {
    let Roster {
        application_id,
        manager,
        dependents,
        ..
    } = roster(&["Adam"]);
    let adam = dependents[0].clone();
    let mut staged = StagedFiles::new();

    let result = reconcile(
        &application_id,
        dependents,
        vec![keep_plan(&adam, "First"), keep_plan(&adam, "Second")],
        &manager,
        &mut staged,
        Utc::now(),
    )
    .expect("reconciled");

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].first_name, "First");
}

#[test]
fn remove_all_retires_every_document() {
    let Roster {
        manager,
        files,
        dependents,
        ..
    } = roster(&["Adam", "Badr"]);
    let mut staged = StagedFiles::new();

    remove_all(dependents, &manager, &mut staged);
    assert_eq!(staged.retired().len(), 4);

    manager.commit(staged);
    assert!(files.is_empty());
}

#[test]
fn full_name_skips_a_blank_middle_name() {
    let Roster { mut dependents, .. } = roster(&["Adam"]);
    let mut adam = dependents.remove(0);
    assert_eq!(adam.full_name(), "Adam Haddad");

    adam.middle_name = Some(String::new());
    assert_eq!(adam.full_name(), "Adam Haddad");

    adam.middle_name = Some("Omar".to_string());
    assert_eq!(adam.full_name(), "Adam Omar Haddad");
}
