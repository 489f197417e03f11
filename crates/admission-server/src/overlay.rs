use std::collections::BTreeMap;

use admission_runtime::handler::{HandlerResult, ResourceHandler};
use admission_runtime::workload::{Workload, WorkloadKind};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::Deserialize;
use tracing::{debug, info};

/// Labels and annotations merged into the objects admitted by a webhook.
/// Workload webhooks also merge the `template*` entries into the metadata
/// of the pod template.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverlay {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub template_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub template_annotations: BTreeMap<String, String>,
}

/// Returns whether `target` changed
fn merge(target: &mut Option<BTreeMap<String, String>>, entries: &BTreeMap<String, String>) -> bool {
    if entries.is_empty() {
        return false;
    }
    let target = target.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (key, value) in entries {
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

impl TemplateOverlay {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
            && self.annotations.is_empty()
            && self.template_labels.is_empty()
            && self.template_annotations.is_empty()
    }

    fn overlay_metadata(&self, metadata: &mut ObjectMeta) -> bool {
        merge(&mut metadata.labels, &self.labels) | merge(&mut metadata.annotations, &self.annotations)
    }

    fn overlay_template_metadata(&self, metadata: &mut ObjectMeta) -> bool {
        merge(&mut metadata.labels, &self.template_labels)
            | merge(&mut metadata.annotations, &self.template_annotations)
    }

    fn overlay_workload(&self, mut workload: Workload) -> HandlerResult<Option<Workload>> {
        let mut changed = self.overlay_metadata(&mut workload.metadata);

        // a pod is its own template
        if matches!(workload.kind(), Ok(WorkloadKind::Pod)) {
            changed |= self.overlay_template_metadata(&mut workload.metadata);
        } else if !self.template_labels.is_empty() || !self.template_annotations.is_empty() {
            let template_metadata = workload
                .spec
                .template
                .metadata
                .get_or_insert_with(ObjectMeta::default);
            changed |= self.overlay_template_metadata(template_metadata);
        }

        if !changed {
            debug!(kind = %workload.gvk(), name = workload.name(), "workload already carries the overlay");
            return Ok(None);
        }
        if workload.object.is_some() {
            workload.apply_to_object()?;
        }
        Ok(Some(workload))
    }

    fn overlay_object(&self, mut obj: DynamicObject) -> HandlerResult<Option<DynamicObject>> {
        if self.overlay_metadata(&mut obj.metadata) {
            Ok(Some(obj))
        } else {
            Ok(None)
        }
    }
}

impl ResourceHandler<Workload> for TemplateOverlay {
    fn on_create(&self, obj: Workload) -> HandlerResult<Option<Workload>> {
        self.overlay_workload(obj)
    }

    fn on_update(&self, _old_obj: Workload, new_obj: Workload) -> HandlerResult<Option<Workload>> {
        self.overlay_workload(new_obj)
    }

    fn on_delete(&self, obj: Workload) -> HandlerResult<()> {
        info!(
            kind = %obj.gvk(),
            namespace = obj.namespace(),
            name = obj.name(),
            "workload deleted"
        );
        Ok(())
    }
}

impl ResourceHandler<DynamicObject> for TemplateOverlay {
    fn on_create(&self, obj: DynamicObject) -> HandlerResult<Option<DynamicObject>> {
        self.overlay_object(obj)
    }

    fn on_update(
        &self,
        _old_obj: DynamicObject,
        new_obj: DynamicObject,
    ) -> HandlerResult<Option<DynamicObject>> {
        self.overlay_object(new_obj)
    }

    fn on_delete(&self, obj: DynamicObject) -> HandlerResult<()> {
        info!(
            kind = obj.types.as_ref().map(|types| types.kind.as_str()),
            namespace = obj.metadata.namespace.as_deref(),
            name = obj.metadata.name.as_deref(),
            "object deleted"
        );
        Ok(())
    }
}
