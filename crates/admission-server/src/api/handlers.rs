use std::sync::Arc;

use admission_runtime::admission_request::{AdmissionRequest, GroupVersionResource};
use admission_runtime::admission_response::AdmissionResponse;
use admission_runtime::webhook::AdmissionHook;
use axum::{
    Json,
    extract::{self, FromRequest},
    http::StatusCode,
};
use tokio::task;
use tracing::{Span, debug, error};

use crate::api::{
    admission_review::{AdmissionReviewRequest, AdmissionReviewResponse},
    api_error::ApiError,
    state::ApiServerState,
};

// create an extractor that internally uses `axum::Json` but has a custom rejection
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub(crate) struct JsonExtractor<T>(T);

/// Admit a request with the hook served under an API group.
pub(crate) async fn admission_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    extract::Path((group, version, resource)): extract::Path<(String, String, String)>,
    JsonExtractor(admission_review): JsonExtractor<AdmissionReviewRequest>,
) -> Result<Json<AdmissionReviewResponse>, (StatusCode, ApiError)> {
    review(
        state,
        GroupVersionResource::new(group, version, resource),
        admission_review,
    )
    .await
}

/// Admit a request with a hook served under the core API group.
pub(crate) async fn core_admission_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    extract::Path((version, resource)): extract::Path<(String, String)>,
    JsonExtractor(admission_review): JsonExtractor<AdmissionReviewRequest>,
) -> Result<Json<AdmissionReviewResponse>, (StatusCode, ApiError)> {
    review(
        state,
        GroupVersionResource::new("", version, resource),
        admission_review,
    )
    .await
}

pub(crate) async fn readiness_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
) -> StatusCode {
    if state.hooks.all_initialized() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[tracing::instrument(
    name = "admission",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        webhook=tracing::field::Empty,
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        subresource=tracing::field::Empty,
        kind_group=tracing::field::Empty,
        kind_version=tracing::field::Empty,
        kind=tracing::field::Empty,
        resource_group=tracing::field::Empty,
        resource_version=tracing::field::Empty,
        resource=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_code=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
async fn review(
    state: Arc<ApiServerState>,
    webhook: GroupVersionResource,
    admission_review: AdmissionReviewRequest,
) -> Result<Json<AdmissionReviewResponse>, (StatusCode, ApiError)> {
    Span::current().record("webhook", webhook.to_string().as_str());
    debug!(
        admission_review = %serde_json::to_string(&admission_review).unwrap_or_default().as_str()
    );

    let hook = state
        .hooks
        .get(&webhook)
        .ok_or_else(|| handle_unknown_webhook(&webhook))?;

    populate_span_with_admission_request_data(&admission_review.request);

    let response = acquire_semaphore_and_admit(state, hook, admission_review.request).await?;

    populate_span_with_admission_results(&response);

    Ok(Json(AdmissionReviewResponse::new(response)))
}

async fn acquire_semaphore_and_admit(
    state: Arc<ApiServerState>,
    hook: Arc<dyn AdmissionHook>,
    request: AdmissionRequest,
) -> Result<AdmissionResponse, (StatusCode, ApiError)> {
    let _permit = state
        .semaphore
        .acquire()
        .await
        .map_err(|e| handle_internal_error(&e))?;

    let span = Span::current();
    let response = task::spawn_blocking(move || {
        let _enter = span.enter();
        hook.admit(&request)
    })
    .await
    .map_err(|e| handle_internal_error(&e))?;

    debug!(response =? &response, "admission request evaluated");

    Ok(response)
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    Span::current().record("kind", adm_req.kind.kind.as_str());
    Span::current().record("kind_group", adm_req.kind.group.as_str());
    Span::current().record("kind_version", adm_req.kind.version.as_str());
    Span::current().record("name", adm_req.name.clone().unwrap_or_default().as_str());
    Span::current().record(
        "namespace",
        adm_req.namespace.clone().unwrap_or_default().as_str(),
    );
    Span::current().record("operation", adm_req.operation.to_string().as_str());
    Span::current().record("request_uid", adm_req.uid.as_str());
    Span::current().record("resource", adm_req.resource.resource.as_str());
    Span::current().record("resource_group", adm_req.resource.group.as_str());
    Span::current().record("resource_version", adm_req.resource.version.as_str());
    Span::current().record(
        "subresource",
        adm_req.sub_resource.clone().unwrap_or_default().as_str(),
    );
}

fn populate_span_with_admission_results(response: &AdmissionResponse) {
    Span::current().record("allowed", response.allowed);
    Span::current().record("mutated", response.patch.is_some());
    if let Some(code) = response.code() {
        Span::current().record("response_code", code);
    }
    if let Some(message) = response.message() {
        Span::current().record("response_message", message);
    }
}

fn handle_unknown_webhook(webhook: &GroupVersionResource) -> (StatusCode, ApiError) {
    (
        StatusCode::NOT_FOUND,
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no webhook is served at {webhook}"),
        ),
    )
}

fn handle_internal_error(error: &dyn std::error::Error) -> (StatusCode, ApiError) {
    error!("Admission error: {}", error);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"),
    )
}
