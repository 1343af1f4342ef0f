use super::common::*;
use std::sync::Arc;

use crate::config::UploadLimits;
use crate::workflows::quote_requests::attachments::{
    resolve_attachment, AttachmentManager, AttachmentSource, MissingAttachment, StagedFiles,
};
use crate::workflows::quote_requests::storage::{
    DocumentKind, FileStore, MemoryFileStore, Upload, UploadPolicy,
};

fn manager() -> (AttachmentManager<MemoryFileStore>, Arc<MemoryFileStore>) {
    let files = Arc::new(MemoryFileStore::default());
    (AttachmentManager::new(files.clone()), files)
}

#[test]
fn resolve_prefers_upload_then_existing_then_default() {
    let upload = png("fresh");

    assert_eq!(
        resolve_attachment(Some(upload.clone()), Some("old.png"), Some("default.png"), true),
        Ok(AttachmentSource::Upload(upload))
    );
    assert_eq!(
        resolve_attachment(None, Some("old.png"), Some("default.png"), true),
        Ok(AttachmentSource::Keep("old.png".to_string()))
    );
    assert_eq!(
        resolve_attachment(None, None, Some("default.png"), true),
        Ok(AttachmentSource::CopyDefault("default.png".to_string()))
    );
}

#[test]
fn resolve_reports_missing_only_when_required() {
    assert_eq!(
        resolve_attachment(None, None, None, true),
        Err(MissingAttachment)
    );
    assert_eq!(
        resolve_attachment(None, None, None, false),
        Ok(AttachmentSource::Absent)
    );
}

#[test]
fn replace_keeps_extension_and_defers_old_deletion() {
    let (manager, files) = manager();
    files.put("quote-requests/quotes/old.pdf", pdf_bytes());
    let mut staged = StagedFiles::new();

    let path = manager
        .replace(
            &mut staged,
            Some("quote-requests/quotes/old.pdf"),
            &Upload::new("New Quote.PDF", pdf_bytes()),
            DocumentKind::Quote.prefix(),
        )
        .expect("stored");

    assert!(path.starts_with("quote-requests/quotes/"));
    assert!(path.ends_with(".pdf"));
    assert_ne!(path, "quote-requests/quotes/old.pdf");
    assert!(
        files.exists("quote-requests/quotes/old.pdf").expect("exists"),
        "old file must survive until commit"
    );
    assert_eq!(staged.retired(), ["quote-requests/quotes/old.pdf".to_string()]);

    manager.commit(staged);
    assert!(!files.exists("quote-requests/quotes/old.pdf").expect("exists"));
    assert!(files.exists(&path).expect("exists"));
}

#[test]
fn rollback_removes_written_files_and_keeps_retired_ones() {
    let (manager, files) = manager();
    files.put("dependents/eid-files/kept.pdf", pdf_bytes());
    let mut staged = StagedFiles::new();

    let written = manager
        .replace(
            &mut staged,
            Some("dependents/eid-files/kept.pdf"),
            &pdf("replacement"),
            DocumentKind::DependentEid.prefix(),
        )
        .expect("stored");
    manager.rollback(staged);

    assert!(!files.exists(&written).expect("exists"));
    assert!(files.exists("dependents/eid-files/kept.pdf").expect("exists"));
    assert_eq!(files.len(), 1);
}

#[test]
fn copy_from_default_duplicates_bytes_under_new_name() {
    let (manager, files) = manager();
    files.put("users/profile-pictures/me.jpg", b"jpeg-bytes".to_vec());
    let mut staged = StagedFiles::new();

    let copied = manager
        .copy_from_default(
            &mut staged,
            "users/profile-pictures/me.jpg",
            DocumentKind::PrincipalPicture.prefix(),
        )
        .expect("copy runs")
        .expect("source exists");

    assert!(copied.starts_with("quote-requests/profile-pictures/"));
    assert!(copied.ends_with(".jpg"));
    assert_eq!(files.read(&copied).expect("read"), b"jpeg-bytes".to_vec());
    assert_eq!(staged.written(), [copied.clone()]);
}

#[test]
fn copy_from_default_returns_none_for_missing_source() {
    let (manager, files) = manager();
    let mut staged = StagedFiles::new();

    let copied = manager
        .copy_from_default(
            &mut staged,
            "users/profile-pictures/gone.png",
            DocumentKind::PrincipalPicture.prefix(),
        )
        .expect("copy runs");

    assert_eq!(copied, None);
    assert!(files.is_empty());
    assert!(staged.written().is_empty());
}

#[test]
fn retire_ignores_duplicates() {
    let (manager, _) = manager();
    let mut staged = StagedFiles::new();

    manager.retire(&mut staged, "a.pdf");
    manager.retire(&mut staged, "a.pdf");

    assert_eq!(staged.retired().len(), 1);
}

#[test]
fn apply_absent_retires_existing_file() {
    let (manager, _) = manager();
    let mut staged = StagedFiles::new();

    let outcome = manager
        .apply(
            &mut staged,
            AttachmentSource::Absent,
            Some("quote-requests/eid-files/old.pdf"),
            DocumentKind::PrincipalEid.prefix(),
        )
        .expect("applied");

    assert_eq!(outcome, None);
    assert_eq!(staged.retired(), ["quote-requests/eid-files/old.pdf".to_string()]);
}

#[test]
fn upload_policy_rejects_wrong_types_and_oversized_files() {
    let policy = UploadPolicy::new(UploadLimits {
        max_image_bytes: 8,
        max_document_bytes: 64,
    });

    assert_eq!(
        policy.check(DocumentKind::PrincipalPicture, &pdf("scan")),
        Err("file must be one of: jpeg, png".to_string())
    );
    assert!(policy
        .check(DocumentKind::PrincipalPicture, &png("face"))
        .expect_err("too large")
        .contains("larger than"));
    assert_eq!(policy.check(DocumentKind::Quote, &pdf("quote")), Ok(()));
    assert_eq!(
        policy.check(DocumentKind::Policy, &Upload::new("empty.pdf", Vec::new())),
        Err("file is empty".to_string())
    );
    assert!(policy
        .check(DocumentKind::Quote, &Upload::new("notes.txt", b"hello".to_vec()))
        .is_err());
}
