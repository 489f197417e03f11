mod common;

use admission_server::api::admission_review::AdmissionReviewResponse;
use assert_json_diff::assert_json_include;
use axum::{
    body::Body,
    http::{self, Request, header},
};
use http_body_util::BodyExt;
use rstest::*;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{GROUP, app, default_test_config};

fn review_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

async fn admission_review(request: Request<Body>) -> AdmissionReviewResponse {
    let app = app(default_test_config()).await;
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Apply the patch of `review` to the object sent in `request_body`
fn patched_object(request_body: &str, review: &AdmissionReviewResponse) -> Value {
    let request: Value = serde_json::from_str(request_body).unwrap();
    let mut object = request["request"]["object"].clone();
    let patch = review
        .response
        .json_patch()
        .unwrap()
        .expect("the response should carry a patch");
    json_patch::patch(&mut object, &patch.0).unwrap();
    object
}

#[tokio::test]
async fn test_workload_overlay_is_patched() {
    let body = include_str!("data/deployment_create.json");
    let review =
        admission_review(review_request(&format!("/apis/{GROUP}/v1/deployments"), body)).await;

    assert_eq!(review.api_version.as_deref(), Some("admission.k8s.io/v1"));
    assert_eq!(review.kind.as_deref(), Some("AdmissionReview"));
    assert_eq!(review.response.uid, "1299d386-525b-4032-98ae-1949f69f9cfc");
    assert!(review.response.allowed);

    let patched = patched_object(body, &review);
    assert_json_include!(
        actual: patched,
        expected: json!({
            "metadata": { "labels": { "app": "nginx", "team": "payments" } },
            "spec": {
                "replicas": 2,
                "template": {
                    "metadata": {
                        "creationTimestamp": null,
                        "labels": { "app": "nginx", "sidecar": "enabled" }
                    },
                    "spec": {
                        "containers": [
                            { "name": "nginx", "image": "nginx:1.27", "ports": [{ "containerPort": 80 }] }
                        ]
                    }
                }
            }
        })
    );
}

#[tokio::test]
async fn test_generic_overlay_is_patched() {
    let body = include_str!("data/configmap_create.json");
    let review =
        admission_review(review_request(&format!("/apis/{GROUP}/v1/configmaps"), body)).await;

    assert!(review.response.allowed);
    let patched = patched_object(body, &review);
    assert_eq!(
        patched["metadata"]["annotations"],
        json!({ "example.com/owner": "payments" })
    );
    assert_eq!(patched["data"], json!({ "log-level": "debug" }));
    assert_eq!(
        patched["metadata"].get("creationTimestamp"),
        Some(&Value::Null)
    );
}

#[rstest]
#[case::overlay_already_applied("deployments", include_str!("data/deployment_with_overlay.json"))]
#[case::kind_not_handled_by_the_hook("deployments", include_str!("data/statefulset_create.json"))]
#[tokio::test]
async fn test_allowed_without_patch(#[case] resource: &str, #[case] body: &'static str) {
    let review =
        admission_review(review_request(&format!("/apis/{GROUP}/v1/{resource}"), body)).await;

    assert!(review.response.allowed);
    assert!(review.response.patch.is_none());
    assert!(review.response.status.is_none());
}

#[tokio::test]
async fn test_core_group_hook_allows_delete_without_lookup() {
    let review = admission_review(review_request(
        "/api/v1/pods",
        include_str!("data/pod_delete.json"),
    ))
    .await;

    assert_eq!(review.response.uid, "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d");
    assert!(review.response.allowed);
    assert!(review.response.patch.is_none());
}

#[tokio::test]
async fn test_malformed_object_is_a_bad_request() {
    let review = admission_review(review_request(
        "/api/v1/pods",
        include_str!("data/pod_malformed.json"),
    ))
    .await;

    assert_eq!(review.response.uid, "3c2b1a09-8f7e-4d6c-b5a4-932817061544");
    assert!(!review.response.allowed);
    assert_eq!(review.response.code(), Some(400));
}

#[tokio::test]
async fn test_unknown_webhook() {
    let app = app(default_test_config()).await;
    let request = review_request(
        &format!("/apis/{GROUP}/v1/secrets"),
        include_str!("data/configmap_create.json"),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 404);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["status"], 404);
    assert_eq!(
        error["message"],
        format!("no webhook is served at {GROUP}/v1/secrets")
    );
}

#[rstest]
#[case::not_json("this is not json", 400)]
#[case::not_an_admission_review(r#"{"apiVersion": "admission.k8s.io/v1"}"#, 422)]
#[tokio::test]
async fn test_invalid_admission_review(#[case] body: &'static str, #[case] status: u16) {
    let app = app(default_test_config()).await;
    let request = review_request(&format!("/apis/{GROUP}/v1/deployments"), body);

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), status);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["status"], status);
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn test_readiness() {
    let app = app(default_test_config()).await;

    let request = Request::builder()
        .uri("/readiness")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);
}
