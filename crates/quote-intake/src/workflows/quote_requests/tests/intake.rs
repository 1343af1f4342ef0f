use super::common::*;

use crate::workflows::quote_requests::attachments::AttachmentSource;
use crate::workflows::quote_requests::domain::{
    Actor, ApplicationType, DefaultDocuments, Emirate, Principal,
};
use crate::workflows::quote_requests::intake::{
    DependentPlan, IntakeContext, IntakeGuard, QuoteRequestPayload,
};
use crate::workflows::quote_requests::storage::Upload;

fn context(actor: &Actor) -> IntakeContext<'_> {
    IntakeContext {
        actor,
        existing_principal: None,
        today: today(),
    }
}

#[test]
fn missing_application_type_is_reported_alone() {
    let actor = client();
    let payload = QuoteRequestPayload {
        application_type: None,
        ..self_payload()
    };

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("type required");

    assert_eq!(errors.fields().len(), 1);
    assert!(errors.contains("application_type"));
}

#[test]
fn self_requests_require_every_principal_field() {
    let actor = client();
    let mut payload = self_payload();
    payload.principal.name = Some("   ".to_string());
    payload.principal.phone = None;
    payload.principal.residency = None;

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("principal incomplete");

    assert!(errors.contains("principal.name"));
    assert!(errors.contains("principal.phone"));
    assert!(errors.contains("principal.residency"));
    assert!(!errors.contains("principal.eid_number"));
}

#[test]
fn principal_files_fall_back_to_actor_defaults() {
    let actor = client().with_defaults(DefaultDocuments {
        profile_picture: Some("users/me.png".to_string()),
        eid_file: Some("users/me.pdf".to_string()),
    });
    let mut payload = self_payload();
    payload.principal.profile_picture = None;
    payload.principal.eid_file = None;

    let plan = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect("defaults satisfy the requirement");
    let principal = plan.principal.expect("principal planned");

    assert_eq!(
        principal.profile_picture,
        AttachmentSource::CopyDefault("users/me.png".to_string())
    );
    assert_eq!(
        principal.eid_file,
        AttachmentSource::CopyDefault("users/me.pdf".to_string())
    );
}

#[test]
fn principal_without_upload_or_default_is_rejected() {
    let actor = client();
    let mut payload = self_payload();
    payload.principal.eid_file = None;

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("identity document required");

    assert!(errors.contains("principal.eid_file"));
}

#[test]
fn existing_principal_files_are_kept_on_edit() {
    let actor = client();
    let existing = Principal {
        name: "Layla Haddad".to_string(),
        phone: "+971500000001".to_string(),
        eid_number: "784".to_string(),
        date_of_birth: date(1990, 4, 12),
        residency: Emirate::Dubai,
        profile_picture: "quote-requests/profile-pictures/a.png".to_string(),
        eid_file: "quote-requests/eid-files/a.pdf".to_string(),
    };
    let mut payload = self_payload();
    payload.principal.profile_picture = None;
    payload.principal.eid_file = None;

    let plan = IntakeGuard::default()
        .validate(
            payload,
            IntakeContext {
                actor: &actor,
                existing_principal: Some(&existing),
                today: today(),
            },
        )
        .expect("existing files satisfy the requirement");
    let principal = plan.principal.expect("principal planned");

    assert_eq!(
        principal.eid_file,
        AttachmentSource::Keep("quote-requests/eid-files/a.pdf".to_string())
    );
}

#[test]
fn dependents_type_ignores_principal_and_requires_a_dependent() {
    let actor = client();
    let mut payload = dependents_payload(&[]);
    payload.principal = principal_input();

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("no dependents");
    assert!(errors.contains("dependents"));

    let plan = IntakeGuard::default()
        .validate(dependents_payload(&["Omar"]), context(&actor))
        .expect("valid dependents payload");
    assert_eq!(plan.application_type, ApplicationType::Dependents);
    assert!(plan.principal.is_none());
    assert!(matches!(plan.dependents[0], DependentPlan::New { .. }));
}

#[test]
fn new_dependents_need_both_documents() {
    let actor = client();
    let mut payload = family_payload(&["Omar", "Sara"]);
    payload.dependents[1].eid_file = None;
    payload.dependents[1].last_name = None;

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("second dependent incomplete");

    assert!(errors.contains("dependents.1.eid_file"));
    assert!(errors.contains("dependents.1.last_name"));
    assert!(!errors.contains("dependents.0.eid_file"));
}

#[test]
fn dates_of_birth_must_be_in_the_past() {
    let actor = client();
    let mut payload = family_payload(&["Omar"]);
    payload.principal.date_of_birth = Some(today());

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("future birth date");

    assert_eq!(
        errors
            .fields()
            .iter()
            .find(|error| error.field == "principal.date_of_birth")
            .map(|error| error.message.as_str()),
        Some("must be a date before today")
    );
}

#[test]
fn invalid_upload_types_are_field_errors() {
    let actor = client();
    let mut payload = family_payload(&["Omar"]);
    payload.dependents[0].profile_picture = Some(Upload::new("face.gif", b"GIF89a".to_vec()));

    let errors = IntakeGuard::default()
        .validate(payload, context(&actor))
        .expect_err("gif rejected");

    assert!(errors.contains("dependents.0.profile_picture"));
}
