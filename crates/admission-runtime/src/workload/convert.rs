use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::DynamicObject;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::{SelectorField, Workload, WorkloadKind, WorkloadSpec};
use crate::admission_request::GroupVersionKind;
use crate::errors::WorkloadError;

/// Build the workload view of `obj`.
pub fn convert_to_workload(obj: &DynamicObject) -> Result<Workload, WorkloadError> {
    let types = obj
        .types
        .clone()
        .filter(|types| !types.kind.is_empty())
        .ok_or(WorkloadError::MissingTypeMeta)?;
    let kind = WorkloadKind::for_gvk(&GroupVersionKind::from_type_meta(&types))?;

    let template = match kind.template_path() {
        None => PodTemplateSpec {
            metadata: Some(obj.metadata.clone()),
            spec: read_field::<PodSpec>(&obj.data, &["spec"])?,
        },
        Some(path) => read_field::<PodTemplateSpec>(&obj.data, path)?.unwrap_or_default(),
    };

    let selector = match kind.selector_field() {
        SelectorField::None => None,
        SelectorField::LabelSelector(path) => read_field::<LabelSelector>(&obj.data, path)?,
        SelectorField::LabelMap(path) => read_field::<BTreeMap<String, String>>(&obj.data, path)?
            .map(|labels| LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            }),
    };

    Ok(Workload {
        types,
        metadata: obj.metadata.clone(),
        spec: WorkloadSpec { selector, template },
        object: Some(obj.clone()),
    })
}

/// Copy the metadata and the pod template of `workload` onto `obj`.
///
/// Only the parts of the template that differ from what `obj` currently
/// holds are rewritten, so fields unknown to the typed pod template survive.
/// An absent template is left absent unless the workload filled it in.
pub fn apply_workload(obj: &mut DynamicObject, workload: &Workload) -> Result<(), WorkloadError> {
    let gvk = obj
        .types
        .as_ref()
        .map(GroupVersionKind::from_type_meta)
        .ok_or(WorkloadError::MissingTypeMeta)?;
    let kind = WorkloadKind::for_gvk(&gvk)?;

    obj.metadata = workload.metadata.clone();

    match kind.template_path() {
        None => {
            let current = read_field::<PodSpec>(&obj.data, &["spec"])?;
            match (&current, &workload.spec.template.spec) {
                (_, None) => {
                    if let Value::Object(map) = &mut obj.data {
                        map.remove("spec");
                    }
                }
                (None, Some(desired)) => write_field(&mut obj.data, &["spec"], desired)?,
                (Some(current), Some(desired)) => {
                    patch_field(&mut obj.data, &["spec"], current, desired)?
                }
            }
        }
        Some(path) => {
            let desired = &workload.spec.template;
            match read_field::<PodTemplateSpec>(&obj.data, path)? {
                None if *desired == PodTemplateSpec::default() => {}
                None => write_field(&mut obj.data, path, desired)?,
                Some(current) => patch_field(&mut obj.data, path, &current, desired)?,
            }
        }
    }
    Ok(())
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |value, key| value.get(*key))
        .filter(|value| !value.is_null())
}

fn lookup_mut<'a>(root: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |value, key| value.get_mut(*key))
}

fn read_field<T: DeserializeOwned>(root: &Value, path: &[&str]) -> Result<Option<T>, WorkloadError> {
    lookup(root, path)
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|source| WorkloadError::Malformed {
                path: path.join("."),
                source,
            })
        })
        .transpose()
}

/// Store `value` at `path`, creating the intermediate objects.
fn write_field<T: Serialize>(root: &mut Value, path: &[&str], value: &T) -> Result<(), WorkloadError> {
    let value = serde_json::to_value(value).map_err(WorkloadError::Serialize)?;
    let mut current = root;
    for (depth, key) in path.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Default::default());
        }
        let map = current
            .as_object_mut()
            .ok_or_else(|| WorkloadError::NotAnObject(path[..depth].join(".")))?;
        current = map.entry(*key).or_insert(Value::Null);
    }
    *current = value;
    Ok(())
}

/// Rewrite the field at `path` from `current` to `desired` by applying
/// their difference onto the raw value.
fn patch_field<T: Serialize + PartialEq>(
    root: &mut Value,
    path: &[&str],
    current: &T,
    desired: &T,
) -> Result<(), WorkloadError> {
    if current == desired {
        return Ok(());
    }
    let current_value = serde_json::to_value(current).map_err(WorkloadError::Serialize)?;
    let desired_value = serde_json::to_value(desired).map_err(WorkloadError::Serialize)?;
    let diff = json_patch::diff(&current_value, &desired_value);

    let Some(target) = lookup_mut(root, path) else {
        return write_field(root, path, desired);
    };
    if json_patch::patch(target, &diff.0).is_err() {
        *target = desired_value;
    }
    Ok(())
}
