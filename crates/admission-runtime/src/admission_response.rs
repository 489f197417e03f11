use crate::errors::ResponseError;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// The type of Patch. Currently we only allow "JSONPatch".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// The patch body. Currently we only support "JSONPatch" which implements RFC 6902.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Status contains extra details into why an admission request was denied.
    /// This field IS NOT consulted in any way if "Allowed" is "true".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,

    /// AuditAnnotations is an unstructured key value map set by remote admission controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_annotations: Option<HashMap<String, String>>,

    /// warnings is a list of warning messages to return to the requesting API client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// PatchType is the type of patch being used to represent the mutated object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

/// Values that Status.Status of an AdmissionResponse can have
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum AdmissionResponseStatusValue {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    /// Status of the operation.
    /// One of: "Success" or "Failure".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatusValue>,

    /// A human-readable description of the status of this operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// A machine-readable description of why this operation is in the
    /// "Failure" status. A Reason clarifies an HTTP status code but does
    /// not override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StatusReason>,

    /// Suggested HTTP return code for this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// StatusReason is an enumeration of possible failure causes.
/// Only the reasons produced by the admission hooks are modeled.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum StatusReason {
    /// The request itself was invalid.
    /// Status code 400.
    BadRequest,

    /// The server understood the request but refuses to take any further action.
    /// Status code 403.
    Forbidden,

    /// An internal error occurred.
    /// Status code 500.
    InternalError,
}

impl StatusReason {
    pub fn code(&self) -> u16 {
        match self {
            StatusReason::BadRequest => 400,
            StatusReason::Forbidden => 403,
            StatusReason::InternalError => 500,
        }
    }
}

impl AdmissionResponse {
    /// Allow the request without modifying it.
    pub fn allow() -> AdmissionResponse {
        AdmissionResponse {
            allowed: true,
            ..Default::default()
        }
    }

    /// Allow the request and attach an already base64-encoded JSON patch.
    pub fn with_patch(patch: String) -> AdmissionResponse {
        AdmissionResponse {
            allowed: true,
            patch_type: Some(PatchType::JSONPatch),
            patch: Some(patch),
            ..Default::default()
        }
    }

    pub fn reject(reason: StatusReason, message: impl Into<String>) -> AdmissionResponse {
        AdmissionResponse {
            allowed: false,
            status: Some(AdmissionResponseStatus {
                status: Some(AdmissionResponseStatusValue::Failure),
                message: Some(message.into()),
                reason: Some(reason),
                code: Some(reason.code()),
            }),
            ..Default::default()
        }
    }

    pub fn bad_request(message: impl Into<String>) -> AdmissionResponse {
        AdmissionResponse::reject(StatusReason::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> AdmissionResponse {
        AdmissionResponse::reject(StatusReason::Forbidden, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> AdmissionResponse {
        AdmissionResponse::reject(StatusReason::InternalError, message)
    }

    /// Returned by hooks that received a request before being initialized.
    pub fn uninitialized() -> AdmissionResponse {
        AdmissionResponse::internal_server_error("not initialized")
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> AdmissionResponse {
        self.uid = uid.into();
        self
    }

    /// Decode the patch carried by the response, if any.
    pub fn json_patch(&self) -> Result<Option<json_patch::Patch>, ResponseError> {
        let Some(patch) = &self.patch else {
            return Ok(None);
        };
        let decoded = general_purpose::STANDARD.decode(patch)?;
        let patch = serde_json::from_slice(&decoded).map_err(ResponseError::Deserialize)?;
        Ok(Some(patch))
    }

    pub fn code(&self) -> Option<u16> {
        self.status.as_ref().and_then(|status| status.code)
    }

    pub fn message(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.message.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::bad_request(AdmissionResponse::bad_request("boom"), StatusReason::BadRequest, 400)]
    #[case::forbidden(AdmissionResponse::forbidden("boom"), StatusReason::Forbidden, 403)]
    #[case::internal(
        AdmissionResponse::internal_server_error("boom"),
        StatusReason::InternalError,
        500
    )]
    fn create_reject_response(
        #[case] response: AdmissionResponse,
        #[case] reason: StatusReason,
        #[case] code: u16,
    ) {
        assert!(!response.allowed);
        assert_eq!(response.patch, None);
        assert_eq!(response.patch_type, None);

        let status = response.status.unwrap();
        assert_eq!(status.code, Some(code));
        assert_eq!(status.reason, Some(reason));
        assert_eq!(status.message.as_deref(), Some("boom"));
        assert_eq!(status.status, Some(AdmissionResponseStatusValue::Failure));
    }

    #[test]
    fn uninitialized_is_an_internal_error() {
        let response = AdmissionResponse::uninitialized().with_uid("UID");

        assert_eq!(response.uid, "UID");
        assert!(!response.allowed);
        assert_eq!(response.code(), Some(500));
        assert_eq!(response.message(), Some("not initialized"));
    }

    #[test]
    fn allow_serializes_without_optional_fields() {
        let response = AdmissionResponse::allow().with_uid("UID");

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"uid": "UID", "allowed": true})
        );
        assert!(response.json_patch().unwrap().is_none());
    }

    #[test]
    fn decode_patch() {
        let patch = json!([{"op": "add", "path": "/ciao", "value": "mondo"}]);
        let encoded = general_purpose::STANDARD.encode(patch.to_string());

        let response = AdmissionResponse::with_patch(encoded);

        assert_eq!(response.patch_type, Some(PatchType::JSONPatch));
        let decoded = response.json_patch().unwrap().unwrap();
        assert_eq!(serde_json::to_value(decoded).unwrap(), patch);
    }

    #[test]
    fn decode_invalid_patch() {
        let response = AdmissionResponse::with_patch("not base64!".to_owned());

        assert!(matches!(response.json_patch(), Err(ResponseError::Base64(_))));
    }
}
