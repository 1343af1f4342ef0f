use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::config::UploadLimits;

use super::domain::{
    Actor, ApplicationId, ApplicationType, DependentId, Emirate, MaritalStatus, QuoteStatus,
    Relationship, UserId,
};
use super::fulfillment::{PolicySubmission, QuoteSubmission, StatusUpdate, MAX_POLICY_FILES};
use super::intake::{
    DependentInput, FieldError, PrincipalInput, QuoteRequestPayload, ValidationErrors,
};
use super::repository::{
    IdentityProvider, Notifier, QuoteRequestFilter, QuoteRequestRepository, QuoteRequestSummary,
};
use super::service::{QuoteRequestError, QuoteRequestService};
use super::storage::{FileStore, Upload};

/// Header carrying the authenticated user id, set by the upstream session layer.
pub const USER_HEADER: &str = "x-user-id";

const MIN_BODY_BYTES: u64 = 64 * 1024 * 1024;
const BODY_HEADROOM_BYTES: u64 = 1024 * 1024;

/// Largest request body the routes accept: a full policy batch of the biggest allowed
/// file plus room for the form fields, never below 64 MiB so family intakes fit.
pub fn request_body_limit(limits: &UploadLimits) -> usize {
    let largest = limits.max_image_bytes.max(limits.max_document_bytes);
    let batch = largest
        .saturating_mul(MAX_POLICY_FILES as u64)
        .saturating_add(BODY_HEADROOM_BYTES);
    usize::try_from(batch.max(MIN_BODY_BYTES)).unwrap_or(usize::MAX)
}

/// Shared handler state: the service plus the identity provider used to resolve callers.
pub struct QuoteRequestApi<R, F, N, I> {
    service: Arc<QuoteRequestService<R, F, N>>,
    identity: Arc<I>,
}

impl<R, F, N, I> Clone for QuoteRequestApi<R, F, N, I> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            identity: Arc::clone(&self.identity),
        }
    }
}

/// Router builder exposing intake, fulfillment, and document endpoints.
pub fn quote_request_router<R, F, N, I>(
    service: Arc<QuoteRequestService<R, F, N>>,
    identity: Arc<I>,
) -> Router
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let body_limit = request_body_limit(&service.upload_limits());
    Router::new()
        .route(
            "/api/v1/quote-requests",
            post(create_handler::<R, F, N, I>).get(list_handler::<R, F, N, I>),
        )
        .route(
            "/api/v1/quote-requests/:application_id",
            get(detail_handler::<R, F, N, I>)
                .put(update_handler::<R, F, N, I>)
                .delete(delete_handler::<R, F, N, I>),
        )
        .route(
            "/api/v1/quote-requests/:application_id/quote",
            post(quote_handler::<R, F, N, I>),
        )
        .route(
            "/api/v1/quote-requests/:application_id/policy",
            post(policy_handler::<R, F, N, I>),
        )
        .route(
            "/api/v1/quote-requests/:application_id/status",
            post(status_handler::<R, F, N, I>),
        )
        .route(
            "/api/v1/quote-requests/:application_id/files",
            get(file_handler::<R, F, N, I>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<R, F, N, I>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(QuoteRequestApi { service, identity })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<QuoteStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileQuery {
    path: String,
}

pub(crate) async fn create_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let payload = match read_payload(multipart).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let service = Arc::clone(&api.service);
    match run_blocking(move || service.create(&actor, payload)).await {
        Ok(record) => (StatusCode::CREATED, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn update_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let payload = match read_payload(multipart).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.update(&id, &actor, payload)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let filter = QuoteRequestFilter {
        owner: None,
        status: query.status,
    };
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.list(&actor, filter)).await {
        Ok(records) => {
            let summaries: Vec<QuoteRequestSummary> =
                records.iter().map(|record| record.summary()).collect();
            (StatusCode::OK, Json(json!({ "quote_requests": summaries }))).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn detail_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.get(&id, &actor)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn delete_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.delete(&id, &actor)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn quote_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let form = match read_fulfillment_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let submission = QuoteSubmission {
        files: form.files,
        payment_link: form.payment_link,
        note: form.note,
    };

    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.send_quote(&id, &actor, submission)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn policy_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let form = match read_fulfillment_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let submission = PolicySubmission {
        files: form.files,
        note: form.note,
    };

    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.send_policy(&id, &actor, submission)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn status_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.set_status(&id, &actor, update)).await {
        Ok(record) => (StatusCode::OK, Json(record.view())).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn file_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let id = ApplicationId(application_id);
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.read_attachment(&id, &actor, &query.path)).await {
        Ok(file) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, file.media_type.to_string())],
            file.bytes,
        )
            .into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn dashboard_handler<R, F, N, I>(
    State(api): State<QuoteRequestApi<R, F, N, I>>,
    headers: HeaderMap,
) -> Response
where
    R: QuoteRequestRepository + 'static,
    F: FileStore + 'static,
    N: Notifier + 'static,
    I: IdentityProvider + 'static,
{
    let actor = match resolve_actor(api.identity.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let service = Arc::clone(&api.service);
    match run_blocking(move || service.dashboard(&actor)).await {
        Ok(dashboard) => (StatusCode::OK, Json(dashboard)).into_response(),
        Err(response) => response,
    }
}

/// Map a service error to its HTTP response.
pub fn error_response(err: QuoteRequestError) -> Response {
    let status = err.status_code();
    let payload = match &err {
        QuoteRequestError::Validation(errors) => json!({
            "error": "validation failed",
            "fields": errors.fields(),
        }),
        other => json!({ "error": other.public_message() }),
    };
    if status.is_server_error() {
        error!(error = %err, "quote request operation failed");
    }
    (status, Json(payload)).into_response()
}

fn resolve_actor<I>(identity: &I, headers: &HeaderMap) -> Result<Actor, Response>
where
    I: IdentityProvider,
{
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()));

    user_id
        .and_then(|id| identity.resolve(&id))
        .ok_or_else(|| {
            let payload = json!({ "error": "authentication required" });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

/// Service calls touch the file store and wait on the notifier, so they run off the
/// async workers.
async fn run_blocking<T, W>(work: W) -> Result<T, Response>
where
    W: FnOnce() -> Result<T, QuoteRequestError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "quote request worker failed");
            let payload = json!({ "error": "internal error" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response())
        }
    }
}

/// JSON part of a create/edit form. File fields name the multipart part holding the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PayloadDocument {
    application_type: Option<ApplicationType>,
    principal: PrincipalDocument,
    dependents: Vec<DependentDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrincipalDocument {
    name: Option<String>,
    phone: Option<String>,
    eid_number: Option<String>,
    date_of_birth: Option<NaiveDate>,
    residency: Option<Emirate>,
    profile_picture: Option<String>,
    eid_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DependentDocument {
    id: Option<DependentId>,
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
    uid_number: Option<String>,
    eid_number: Option<String>,
    marital_status: Option<MaritalStatus>,
    date_of_birth: Option<NaiveDate>,
    relationship: Option<Relationship>,
    residency: Option<Emirate>,
    profile_picture: Option<String>,
    eid_file: Option<String>,
}

struct FileParts(HashMap<String, Upload>);

impl FileParts {
    fn take(
        &self,
        field: String,
        reference: Option<String>,
        errors: &mut Vec<FieldError>,
    ) -> Option<Upload> {
        let reference = reference?;
        match self.0.get(&reference) {
            Some(upload) => Some(upload.clone()),
            None => {
                errors.push(FieldError::new(
                    field,
                    format!("references missing file part `{reference}`"),
                ));
                None
            }
        }
    }
}

async fn read_payload(mut multipart: Multipart) -> Result<QuoteRequestPayload, Response> {
    let mut document = None;
    let mut parts = HashMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(err.into_response()),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if name == "payload" && file_name.is_none() {
            let text = field.text().await.map_err(IntoResponse::into_response)?;
            let parsed: PayloadDocument = serde_json::from_str(&text).map_err(|err| {
                let payload = json!({ "error": format!("payload is not valid JSON: {err}") });
                (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
            })?;
            document = Some(parsed);
            continue;
        }

        let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
        if let Some(file_name) = file_name {
            parts.insert(
                name,
                Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                },
            );
        }
    }

    let document = document.unwrap_or_default();
    let parts = FileParts(parts);
    let mut errors = Vec::new();

    let principal = document.principal;
    let principal = PrincipalInput {
        name: principal.name,
        phone: principal.phone,
        eid_number: principal.eid_number,
        date_of_birth: principal.date_of_birth,
        residency: principal.residency,
        profile_picture: parts.take(
            "principal.profile_picture".to_string(),
            principal.profile_picture,
            &mut errors,
        ),
        eid_file: parts.take(
            "principal.eid_file".to_string(),
            principal.eid_file,
            &mut errors,
        ),
    };

    let dependents: Vec<DependentInput> = document
        .dependents
        .into_iter()
        .enumerate()
        .map(|(index, dependent)| DependentInput {
            id: dependent.id,
            first_name: dependent.first_name,
            middle_name: dependent.middle_name,
            last_name: dependent.last_name,
            uid_number: dependent.uid_number,
            eid_number: dependent.eid_number,
            marital_status: dependent.marital_status,
            date_of_birth: dependent.date_of_birth,
            relationship: dependent.relationship,
            residency: dependent.residency,
            profile_picture: parts.take(
                format!("dependents.{index}.profile_picture"),
                dependent.profile_picture,
                &mut errors,
            ),
            eid_file: parts.take(
                format!("dependents.{index}.eid_file"),
                dependent.eid_file,
                &mut errors,
            ),
        })
        .collect();

    if !errors.is_empty() {
        let err = QuoteRequestError::Validation(ValidationErrors(errors));
        return Err(error_response(err));
    }

    Ok(QuoteRequestPayload {
        application_type: document.application_type,
        principal,
        dependents,
    })
}

#[derive(Debug, Default)]
struct FulfillmentForm {
    files: Vec<Upload>,
    payment_link: Option<String>,
    note: Option<String>,
}

async fn read_fulfillment_form(mut multipart: Multipart) -> Result<FulfillmentForm, Response> {
    let mut form = FulfillmentForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(err.into_response()),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        match (name.as_str(), file_name) {
            ("files" | "files[]", Some(file_name)) => {
                let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
                form.files.push(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            ("payment_link", None) => {
                form.payment_link =
                    Some(field.text().await.map_err(IntoResponse::into_response)?);
            }
            ("note", None) => {
                form.note = Some(field.text().await.map_err(IntoResponse::into_response)?);
            }
            _ => {}
        }
    }

    Ok(form)
}
