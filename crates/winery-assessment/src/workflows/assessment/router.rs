use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::catalog::CatalogProvider;
use super::domain::{AnswerId, AnswerSubmission, AssessmentId, OrganizationId, SegmentId};
use super::repository::{AssessmentStore, BlobStore};
use super::service::{AssessmentError, AssessmentService};

const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub(crate) struct CreateAssessmentRequest {
    pub(crate) organization_id: OrganizationId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectSegmentRequest {
    pub(crate) segment_id: SegmentId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitAnswersRequest {
    pub(crate) answers: Vec<AnswerSubmission>,
}

/// HTTP endpoints for the assessment lifecycle, evidence, and results.
pub fn assessment_router<C, S, B>(service: Arc<AssessmentService<C, S, B>>) -> Router
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    let upload_limit = service.evidence().max_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/api/v1/assessments", post(create_handler::<C, S, B>))
        .route("/api/v1/segments", get(segments_handler::<C, S, B>))
        .route(
            "/api/v1/assessments/:assessment_id/segment",
            put(select_segment_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/structure",
            get(structure_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/answers",
            post(submit_answers_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/complete",
            post(complete_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/cancel",
            post(cancel_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/evidence",
            get(list_evidence_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/evidence/archive",
            get(archive_handler::<C, S, B>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/answers/:answer_id/evidence",
            post(attach_evidence_handler::<C, S, B>)
                .put(replace_evidence_handler::<C, S, B>)
                .delete(remove_evidence_handler::<C, S, B>)
                .get(download_evidence_handler::<C, S, B>)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/assessments/:assessment_id/results",
            get(detail_handler::<C, S, B>),
        )
        .route(
            "/api/v1/organizations/:organization_id/assessments",
            get(history_handler::<C, S, B>),
        )
        .route(
            "/api/v1/organizations/:organization_id/results",
            get(latest_result_handler::<C, S, B>),
        )
        .with_state(service)
}

type ServiceState<C, S, B> = State<Arc<AssessmentService<C, S, B>>>;

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, AssessmentError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Json(request): Json<CreateAssessmentRequest>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    match service.get_or_create(request.organization_id) {
        Ok(outcome) => {
            let status = if outcome.is_new {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn segments_handler<C, S, B>(State(service): ServiceState<C, S, B>) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.list_segments())
}

pub(crate) async fn select_segment_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
    Json(request): Json<SelectSegmentRequest>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(
        StatusCode::OK,
        service.select_segment(assessment_id, request.segment_id),
    )
}

pub(crate) async fn structure_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.structure(assessment_id))
}

pub(crate) async fn submit_answers_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
    Json(request): Json<SubmitAnswersRequest>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(
        StatusCode::OK,
        service
            .submit_answers(assessment_id, &request.answers)
            .map(|answers| json!({ "answers": answers })),
    )
}

pub(crate) async fn complete_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.complete(assessment_id))
}

pub(crate) async fn cancel_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.cancel(assessment_id))
}

pub(crate) async fn list_evidence_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.evidence().list(assessment_id))
}

pub(crate) async fn archive_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    match service.evidence().archive(assessment_id) {
        Ok(bytes) => {
            let disposition =
                format!("attachment; filename=\"assessment_{assessment_id}_evidence.zip\"");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn attach_evidence_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path((assessment_id, answer_id)): Path<(AssessmentId, AnswerId)>,
    multipart: Multipart,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    let result = match read_upload(multipart).await {
        Ok((file_name, bytes)) => {
            service
                .evidence()
                .attach(assessment_id, answer_id, &file_name, &bytes)
        }
        Err(err) => Err(err),
    };
    json_response(StatusCode::CREATED, result)
}

pub(crate) async fn replace_evidence_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path((assessment_id, answer_id)): Path<(AssessmentId, AnswerId)>,
    multipart: Multipart,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    let result = match read_upload(multipart).await {
        Ok((file_name, bytes)) => {
            service
                .evidence()
                .replace(assessment_id, answer_id, &file_name, &bytes)
        }
        Err(err) => Err(err),
    };
    json_response(StatusCode::OK, result)
}

pub(crate) async fn remove_evidence_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path((assessment_id, answer_id)): Path<(AssessmentId, AnswerId)>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    match service.evidence().remove(assessment_id, answer_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn download_evidence_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path((assessment_id, answer_id)): Path<(AssessmentId, AnswerId)>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    match service.evidence().download(assessment_id, answer_id) {
        Ok((evidence, bytes)) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                evidence.display_name.replace('"', "")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn detail_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(assessment_id): Path<AssessmentId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.reports().detail(assessment_id))
}

pub(crate) async fn history_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(organization_id): Path<OrganizationId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(StatusCode::OK, service.reports().history(organization_id))
}

pub(crate) async fn latest_result_handler<C, S, B>(
    State(service): ServiceState<C, S, B>,
    Path(organization_id): Path<OrganizationId>,
) -> Response
where
    C: CatalogProvider + 'static,
    S: AssessmentStore + 'static,
    B: BlobStore + 'static,
{
    json_response(
        StatusCode::OK,
        service.reports().latest_result(organization_id),
    )
}

async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), AssessmentError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AssessmentError::Validation(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AssessmentError::Validation("upload has no file name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AssessmentError::Validation(err.body_text()))?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(AssessmentError::Validation(format!(
        "multipart field `{UPLOAD_FIELD}` is required"
    )))
}

impl IntoResponse for AssessmentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AssessmentError::NotFound { .. } => StatusCode::NOT_FOUND,
            AssessmentError::InvalidState(_) | AssessmentError::Conflict(_) => StatusCode::CONFLICT,
            AssessmentError::Incomplete { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AssessmentError::Validation(_) => StatusCode::BAD_REQUEST,
            AssessmentError::Repository(_)
            | AssessmentError::Blob(_)
            | AssessmentError::Archive(_) => {
                tracing::error!(error = %self, "assessment request failed");
                let payload = json!({ "error": "internal server error" });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response();
            }
        };

        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(payload)).into_response()
    }
}
