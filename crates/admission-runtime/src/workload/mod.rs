//! Uniform view over every Kubernetes kind that carries a pod template.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use serde_json::Value;

use crate::admission_request::{GroupVersion, GroupVersionKind};
use crate::errors::WorkloadError;

mod convert;

pub use convert::{apply_workload, convert_to_workload};

/// A pod-template-bearing object, reduced to the parts handlers care about.
#[derive(Clone, Debug)]
pub struct Workload {
    pub types: TypeMeta,
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
    /// The object this workload was built from
    pub object: Option<DynamicObject>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadSpec {
    pub selector: Option<LabelSelector>,
    pub template: PodTemplateSpec,
}

impl Workload {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_type_meta(&self.types)
    }

    pub fn kind(&self) -> Result<WorkloadKind, WorkloadError> {
        WorkloadKind::for_gvk(&self.gvk())
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// Write the metadata and the pod template of this workload back onto
    /// the object it was built from.
    pub fn apply_to_object(&mut self) -> Result<(), WorkloadError> {
        let mut obj = self.object.take().ok_or(WorkloadError::MissingObject)?;
        let result = apply_workload(&mut obj, self);
        self.object = Some(obj);
        result
    }
}

/// Where the selector of a kind lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SelectorField {
    None,
    LabelSelector(&'static [&'static str]),
    LabelMap(&'static [&'static str]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    ReplicationController,
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    DeploymentConfig,
}

const SPEC_TEMPLATE: &[&str] = &["spec", "template"];
const SPEC_SELECTOR: &[&str] = &["spec", "selector"];
const JOB_TEMPLATE: &[&str] = &["spec", "jobTemplate", "spec", "template"];
const JOB_SELECTOR: &[&str] = &["spec", "jobTemplate", "spec", "selector"];

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 9] = [
        WorkloadKind::Pod,
        WorkloadKind::ReplicationController,
        WorkloadKind::Deployment,
        WorkloadKind::ReplicaSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
        WorkloadKind::DeploymentConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::ReplicationController => "ReplicationController",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
            WorkloadKind::DeploymentConfig => "DeploymentConfig",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "pods",
            WorkloadKind::ReplicationController => "replicationcontrollers",
            WorkloadKind::Deployment => "deployments",
            WorkloadKind::ReplicaSet => "replicasets",
            WorkloadKind::StatefulSet => "statefulsets",
            WorkloadKind::DaemonSet => "daemonsets",
            WorkloadKind::Job => "jobs",
            WorkloadKind::CronJob => "cronjobs",
            WorkloadKind::DeploymentConfig => "deploymentconfigs",
        }
    }

    /// The group/versions in which the kind is understood
    pub fn group_versions(&self) -> Vec<GroupVersion> {
        let pairs: &[(&str, &str)] = match self {
            WorkloadKind::Pod | WorkloadKind::ReplicationController => &[("", "v1")],
            WorkloadKind::Deployment => &[
                ("extensions", "v1beta1"),
                ("apps", "v1beta1"),
                ("apps", "v1beta2"),
                ("apps", "v1"),
            ],
            WorkloadKind::DaemonSet | WorkloadKind::ReplicaSet => &[
                ("extensions", "v1beta1"),
                ("apps", "v1beta2"),
                ("apps", "v1"),
            ],
            WorkloadKind::StatefulSet => {
                &[("apps", "v1beta1"), ("apps", "v1beta2"), ("apps", "v1")]
            }
            WorkloadKind::Job => &[("batch", "v1")],
            WorkloadKind::CronJob => &[("batch", "v1beta1"), ("batch", "v1")],
            WorkloadKind::DeploymentConfig => &[("apps.openshift.io", "v1")],
        };
        pairs
            .iter()
            .map(|(group, version)| GroupVersion::new(*group, *version))
            .collect()
    }

    /// The group/version currently served by the API server for this kind
    pub fn preferred_group_version(&self) -> GroupVersion {
        match self {
            WorkloadKind::Pod | WorkloadKind::ReplicationController => GroupVersion::new("", "v1"),
            WorkloadKind::Deployment
            | WorkloadKind::ReplicaSet
            | WorkloadKind::StatefulSet
            | WorkloadKind::DaemonSet => GroupVersion::new("apps", "v1"),
            WorkloadKind::Job | WorkloadKind::CronJob => GroupVersion::new("batch", "v1"),
            WorkloadKind::DeploymentConfig => GroupVersion::new("apps.openshift.io", "v1"),
        }
    }

    /// Resolve a group/version/kind to a workload kind. Kinds served in a
    /// version that does not carry a pod template are refused.
    pub fn for_gvk(gvk: &GroupVersionKind) -> Result<WorkloadKind, WorkloadError> {
        let kind = WorkloadKind::from_str(&gvk.kind)
            .map_err(|_| WorkloadError::UnsupportedKind(gvk.clone()))?;
        if kind.group_versions().contains(&gvk.group_version()) {
            Ok(kind)
        } else {
            Err(WorkloadError::UnsupportedKind(gvk.clone()))
        }
    }

    pub fn api_resource(&self, group_version: &GroupVersion) -> ApiResource {
        let gvk = kube::core::GroupVersionKind::gvk(
            &group_version.group,
            &group_version.version,
            self.as_str(),
        );
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }

    /// Location of the pod template. Pods are their own template.
    pub(crate) fn template_path(&self) -> Option<&'static [&'static str]> {
        match self {
            WorkloadKind::Pod => None,
            WorkloadKind::CronJob => Some(JOB_TEMPLATE),
            _ => Some(SPEC_TEMPLATE),
        }
    }

    pub(crate) fn selector_field(&self) -> SelectorField {
        match self {
            WorkloadKind::Pod => SelectorField::None,
            WorkloadKind::ReplicationController | WorkloadKind::DeploymentConfig => {
                SelectorField::LabelMap(SPEC_SELECTOR)
            }
            WorkloadKind::CronJob => SelectorField::LabelSelector(JOB_SELECTOR),
            _ => SelectorField::LabelSelector(SPEC_SELECTOR),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WorkloadError::UnknownKind(s.to_owned()))
    }
}

/// Build an empty object of `kind`, in the version currently served for it.
pub fn new_object_for_kind(kind: WorkloadKind, name: &str, namespace: &str) -> DynamicObject {
    let gvk = kind.preferred_group_version().with_kind(kind.as_str());
    DynamicObject {
        types: Some(gvk.type_meta()),
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        },
        data: Value::Object(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pod("", "v1", "Pod", Some(WorkloadKind::Pod))]
    #[case::rc("", "v1", "ReplicationController", Some(WorkloadKind::ReplicationController))]
    #[case::deployment_ext("extensions", "v1beta1", "Deployment", Some(WorkloadKind::Deployment))]
    #[case::deployment_beta1("apps", "v1beta1", "Deployment", Some(WorkloadKind::Deployment))]
    #[case::daemonset_beta1("apps", "v1beta1", "DaemonSet", None)]
    #[case::replicaset_beta1("apps", "v1beta1", "ReplicaSet", None)]
    #[case::statefulset_ext("extensions", "v1beta1", "StatefulSet", None)]
    #[case::statefulset("apps", "v1", "StatefulSet", Some(WorkloadKind::StatefulSet))]
    #[case::job("batch", "v1", "Job", Some(WorkloadKind::Job))]
    #[case::cronjob_beta1("batch", "v1beta1", "CronJob", Some(WorkloadKind::CronJob))]
    #[case::cronjob("batch", "v1", "CronJob", Some(WorkloadKind::CronJob))]
    #[case::dc("apps.openshift.io", "v1", "DeploymentConfig", Some(WorkloadKind::DeploymentConfig))]
    #[case::configmap("", "v1", "ConfigMap", None)]
    fn resolve_kind(
        #[case] group: &str,
        #[case] version: &str,
        #[case] kind: &str,
        #[case] expected: Option<WorkloadKind>,
    ) {
        let gvk = GroupVersionKind::new(group, version, kind);
        match (WorkloadKind::for_gvk(&gvk), expected) {
            (Ok(found), Some(expected)) => assert_eq!(found, expected),
            (Err(WorkloadError::UnsupportedKind(found)), None) => assert_eq!(found, gvk),
            (result, expected) => panic!("got {result:?}, expected {expected:?}"),
        }
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in WorkloadKind::ALL {
            assert_eq!(kind.as_str().parse::<WorkloadKind>().unwrap(), kind);
        }
        assert!("Widget".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn every_preferred_version_is_supported() {
        for kind in WorkloadKind::ALL {
            assert!(kind.group_versions().contains(&kind.preferred_group_version()));
        }
    }

    #[test]
    fn new_object() {
        let obj = new_object_for_kind(WorkloadKind::Deployment, "nginx", "default");

        assert_eq!(obj.types.unwrap().api_version, "apps/v1");
        assert_eq!(obj.metadata.name.as_deref(), Some("nginx"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn api_resource_uses_plural() {
        let resource = WorkloadKind::DeploymentConfig
            .api_resource(&WorkloadKind::DeploymentConfig.preferred_group_version());

        assert_eq!(resource.plural, "deploymentconfigs");
        assert_eq!(resource.api_version, "apps.openshift.io/v1");
    }
}
