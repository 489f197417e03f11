use base64::{Engine as _, engine::general_purpose};
use serde_json::Value;
use tracing::{debug, trace};

use crate::admission_response::AdmissionResponse;

/// RFC 6902 operations turning `original` into `modified`, `None` when the
/// two documents are equal.
///
/// Keys that are `null` in `original` and absent from `modified` are not
/// removed: typed objects drop them when they are encoded again, and
/// `null` means unset in both documents.
pub fn create_patch(original: &Value, modified: &Value) -> Option<json_patch::Patch> {
    let mut modified = modified.clone();
    restore_null_fields(original, &mut modified);

    let diff = json_patch::diff(original, &modified);
    if diff.0.is_empty() { None } else { Some(diff) }
}

fn restore_null_fields(original: &Value, modified: &mut Value) {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            for (key, value) in original {
                match modified.get_mut(key) {
                    Some(modified_value) => restore_null_fields(value, modified_value),
                    None if value.is_null() => {
                        modified.insert(key.clone(), Value::Null);
                    }
                    None => {}
                }
            }
        }
        (Value::Array(original), Value::Array(modified)) if original.len() == modified.len() => {
            for (value, modified_value) in original.iter().zip(modified.iter_mut()) {
                restore_null_fields(value, modified_value);
            }
        }
        _ => {}
    }
}

/// Allow the request, patching `original` into `modified` when they differ.
pub fn patch_response(original: &Value, modified: &Value) -> AdmissionResponse {
    let Some(patch) = create_patch(original, modified) else {
        debug!("object not modified");
        return AdmissionResponse::allow();
    };

    match serde_json::to_string(&patch) {
        Ok(patch) => {
            trace!(patch = patch.as_str(), "computed patch");
            AdmissionResponse::with_patch(general_purpose::STANDARD.encode(patch))
        }
        Err(e) => AdmissionResponse::internal_server_error(format!("cannot serialize patch: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_response::PatchType;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_patch() {
        let doc = json!({"metadata": {"name": "nginx"}});

        assert!(create_patch(&doc, &doc).is_none());

        let response = patch_response(&doc, &doc);
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
        assert!(response.status.is_none());
    }

    #[test]
    fn modified_document_is_patched() {
        let original = json!({"metadata": {"name": "nginx"}});
        let modified = json!({"metadata": {"name": "nginx", "labels": {"app": "nginx"}}});
        let expected = json_patch::diff(&original, &modified);

        let response = patch_response(&original, &modified);

        assert!(response.allowed);
        assert_eq!(response.patch_type, Some(PatchType::JSONPatch));
        assert_eq!(response.json_patch().unwrap(), Some(expected));
    }

    #[rstest]
    #[case::top_level(
        json!({"metadata": {"name": "nginx", "creationTimestamp": null}}),
        json!({"metadata": {"name": "nginx"}}),
        None
    )]
    #[case::nested_in_array(
        json!({"spec": {"containers": [{"name": "nginx", "resources": null}]}}),
        json!({"spec": {"containers": [{"name": "nginx"}]}}),
        None
    )]
    #[case::alongside_a_change(
        json!({"metadata": {"name": "nginx", "creationTimestamp": null}}),
        json!({"metadata": {"name": "nginx", "labels": {"app": "nginx"}}}),
        Some(json!([{"op": "add", "path": "/metadata/labels", "value": {"app": "nginx"}}]))
    )]
    fn dropped_null_fields_are_not_removed(
        #[case] original: Value,
        #[case] modified: Value,
        #[case] expected: Option<Value>,
    ) {
        let patch = create_patch(&original, &modified);

        assert_eq!(
            patch.map(|p| serde_json::to_value(p).unwrap()),
            expected
        );
    }

    #[test]
    fn null_replacing_a_value_is_kept() {
        let original = json!({"spec": {"paused": true}});
        let modified = json!({"spec": {"paused": null}});

        let patch = create_patch(&original, &modified).unwrap();

        assert_eq!(
            serde_json::to_value(patch).unwrap(),
            json!([{"op": "replace", "path": "/spec/paused", "value": null}])
        );
    }

    #[test]
    fn patch_applies_onto_original() {
        let mut original = json!({"spec": {"replicas": 1, "paused": true}});
        let modified = json!({"spec": {"replicas": 3}});

        let patch = create_patch(&original, &modified).unwrap();
        json_patch::patch(&mut original, &patch.0).unwrap();

        assert_eq!(original, modified);
    }
}
