use crate::infra::{InMemoryQuoteRepository, LogNotifier};
use chrono::NaiveDate;
use clap::Args;
use quote_intake::config::{NotificationConfig, UploadLimits};
use quote_intake::error::AppError;
use quote_intake::workflows::quote_requests::{
    Actor, ApplicationType, DependentInput, Emirate, FileStore, LocalFileStore, MaritalStatus,
    MemoryFileStore, PolicySubmission, PrincipalInput, QuoteRequestPayload, QuoteRequestRecord,
    QuoteRequestService, QuoteSubmission, Relationship, Role, Upload,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Write demo documents under this directory instead of keeping them in memory.
    #[arg(long)]
    pub(crate) storage_root: Option<PathBuf>,
    /// Print the final request as JSON instead of a readable summary.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct DemoStep {
    step: &'static str,
    status: &'static str,
    documents: usize,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    match args.storage_root {
        Some(root) => {
            std::fs::create_dir_all(&root)?;
            walk_through(Arc::new(LocalFileStore::new(root)), args.json)
        }
        None => walk_through(Arc::new(MemoryFileStore::default()), args.json),
    }
}

fn walk_through<F>(files: Arc<F>, as_json: bool) -> Result<(), AppError>
where
    F: FileStore + 'static,
{
    let service = QuoteRequestService::new(
        Arc::new(InMemoryQuoteRepository::default()),
        files,
        Arc::new(LogNotifier::default()),
        UploadLimits::default(),
        &NotificationConfig::default(),
    );
    let client = Actor::client("client-1");
    let admin = Actor::staff("admin-1", Role::Admin);

    let mut steps = Vec::new();
    let record = service.create(&client, demo_payload())?;
    steps.push(step("intake", &record));
    let id = record.application.id.clone();

    let record = service.send_quote(
        &id,
        &admin,
        QuoteSubmission {
            files: vec![document("gold-plan-quote")],
            payment_link: Some("https://pay.example.com/checkout/demo".to_string()),
            note: Some("Gold plan, annual premium".to_string()),
        },
    )?;
    steps.push(step("quote", &record));

    let record = service.send_policy(
        &id,
        &admin,
        PolicySubmission {
            files: vec![document("policy-certificate"), document("member-cards")],
            note: None,
        },
    )?;
    steps.push(step("policy", &record));

    if as_json {
        let output = serde_json::json!({
            "steps": steps,
            "quote_request": record.view(),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    println!("Quote request demo ({})", id.0);
    for entry in &steps {
        println!(
            "- {:<7} -> {} ({} documents on file)",
            entry.step, entry.status, entry.documents
        );
    }
    println!("Covered dependents:");
    for dependent in &record.dependents {
        println!("  - {} ({:?})", dependent.full_name(), dependent.relationship);
    }
    println!("Audit notes:");
    for note in record.application.notes.entries() {
        println!(
            "  - {} by {}{}",
            note.action.label(),
            note.actor.0,
            note.text
                .as_deref()
                .map(|text| format!(": {text}"))
                .unwrap_or_default()
        );
    }

    Ok(())
}

fn step(step: &'static str, record: &QuoteRequestRecord) -> DemoStep {
    DemoStep {
        step,
        status: record.application.status.label(),
        documents: record.attachment_paths().len(),
    }
}

fn picture(name: &str) -> Upload {
    Upload::new(format!("{name}.png"), b"\x89PNG\r\n\x1a\ndemo".to_vec())
}

fn document(name: &str) -> Upload {
    Upload::new(format!("{name}.pdf"), b"%PDF-1.4 demo".to_vec())
}

fn demo_payload() -> QuoteRequestPayload {
    QuoteRequestPayload {
        application_type: Some(ApplicationType::SelfAndDependents),
        principal: PrincipalInput {
            name: Some("Layla Haddad".to_string()),
            phone: Some("+971500000001".to_string()),
            eid_number: Some("784-1990-1234567-1".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12),
            residency: Some(Emirate::Dubai),
            profile_picture: Some(picture("layla")),
            eid_file: Some(document("layla-eid")),
        },
        dependents: vec![DependentInput {
            first_name: Some("Omar".to_string()),
            last_name: Some("Haddad".to_string()),
            marital_status: Some(MaritalStatus::Single),
            date_of_birth: NaiveDate::from_ymd_opt(2016, 9, 3),
            relationship: Some(Relationship::Child),
            residency: Some(Emirate::Dubai),
            profile_picture: Some(picture("omar")),
            eid_file: Some(document("omar-eid")),
            ..DependentInput::default()
        }],
    }
}
