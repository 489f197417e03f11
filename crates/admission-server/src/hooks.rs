use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use admission_runtime::admission_request::{GroupVersion, GroupVersionKind, GroupVersionResource};
use admission_runtime::getter::{GetterFactory, KubeGetterFactory};
use admission_runtime::scheme::Scheme;
use admission_runtime::webhook::{AdmissionHook, GenericWebhook, WorkloadWebhook};
use admission_runtime::workload::{Workload, WorkloadKind};
use kube::core::{ApiResource, DynamicObject};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{HookType, WebhookDefinition};

#[derive(Error, Debug)]
pub enum HookSetupError {
    #[error("webhook {name}: {source}")]
    UnknownWorkloadKind {
        name: String,
        #[source]
        source: admission_runtime::errors::WorkloadError,
    },

    #[error("webhooks {first} and {second} are both served at {resource}")]
    DuplicateResource {
        first: String,
        second: String,
        resource: GroupVersionResource,
    },

    #[error("webhook {name} cannot be initialized: {source}")]
    Initialization {
        name: String,
        #[source]
        source: admission_runtime::errors::WebhookError,
    },
}

struct RegisteredHook {
    name: String,
    hook: Arc<dyn AdmissionHook>,
}

/// The hooks served by the server, indexed by the resource they are
/// served under.
pub struct Hooks {
    hooks: HashMap<GroupVersionResource, RegisteredHook>,
}

impl Hooks {
    pub fn get(&self, resource: &GroupVersionResource) -> Option<Arc<dyn AdmissionHook>> {
        self.hooks.get(resource).map(|registered| registered.hook.clone())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn all_initialized(&self) -> bool {
        self.hooks
            .values()
            .all(|registered| registered.hook.is_initialized())
    }

    /// Initialize every hook. When `tolerate_failures` is set, hooks failing
    /// to initialize are left uninitialized and keep refusing requests.
    pub fn initialize(
        &self,
        config: &kube::Config,
        tolerate_failures: bool,
    ) -> Result<(), HookSetupError> {
        for registered in self.hooks.values() {
            if registered.hook.is_initialized() {
                continue;
            }
            match registered.hook.initialize(config) {
                Ok(()) => info!(webhook = registered.name.as_str(), "webhook initialized"),
                Err(e) if tolerate_failures => warn!(
                    webhook = registered.name.as_str(),
                    error = %e,
                    "webhook not initialized"
                ),
                Err(e) => {
                    return Err(HookSetupError::Initialization {
                        name: registered.name.clone(),
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Builds the hooks described by the webhooks file. Every hook applies its
/// template overlay.
pub fn build_hooks(definitions: &BTreeMap<String, WebhookDefinition>) -> Result<Hooks, HookSetupError> {
    let mut hooks: HashMap<GroupVersionResource, RegisteredHook> = HashMap::new();

    for (name, definition) in definitions {
        let hook = build_hook(name, definition)?;
        let (resource, _singular) = hook.resource();
        if let Some(existing) = hooks.get(&resource) {
            return Err(HookSetupError::DuplicateResource {
                first: existing.name.clone(),
                second: name.clone(),
                resource,
            });
        }
        hooks.insert(
            resource,
            RegisteredHook {
                name: name.clone(),
                hook,
            },
        );
    }

    Ok(Hooks { hooks })
}

fn build_hook(
    name: &str,
    definition: &WebhookDefinition,
) -> Result<Arc<dyn AdmissionHook>, HookSetupError> {
    if definition.overlay.is_empty() {
        info!(
            webhook = name,
            "no overlay configured, objects are admitted unchanged"
        );
    }
    let handler = Arc::new(definition.overlay.clone());

    let hook: Arc<dyn AdmissionHook> = match &definition.hook {
        HookType::Workload { kind } => {
            let kind: WorkloadKind =
                kind.parse()
                    .map_err(|source| HookSetupError::UnknownWorkloadKind {
                        name: name.to_owned(),
                        source,
                    })?;
            let factory: Option<Arc<dyn GetterFactory<Workload>>> = if definition.fetch_on_delete {
                Some(Arc::new(KubeGetterFactory::for_workload(kind)))
            } else {
                None
            };
            Arc::new(WorkloadWebhook::new(
                definition.resource.clone(),
                definition.singular.clone(),
                kind.as_str(),
                Arc::new(Scheme::workloads()),
                factory,
                Some(handler),
            ))
        }
        HookType::Generic {
            target,
            source_groups,
            compatible_versions,
        } => {
            let factory: Option<Arc<dyn GetterFactory<DynamicObject>>> =
                if definition.fetch_on_delete {
                    Some(Arc::new(KubeGetterFactory::new(target_api_resource(target))))
                } else {
                    None
                };
            let source_groups = if source_groups.is_empty() {
                vec![target.group.clone()]
            } else {
                source_groups.clone()
            };
            Arc::new(GenericWebhook::new(
                definition.resource.clone(),
                definition.singular.clone(),
                source_groups,
                target.clone(),
                Arc::new(generic_scheme(target, compatible_versions)),
                factory,
                Some(handler),
            ))
        }
    };

    Ok(hook)
}

/// The target kind, plus the versions sharing its schema
fn generic_scheme(target: &GroupVersionKind, compatible_versions: &[String]) -> Scheme {
    let mut versions = vec![target.group_version()];
    versions.extend(
        compatible_versions
            .iter()
            .map(|api_version| GroupVersion::parse(api_version)),
    );
    Scheme::builder()
        .compatible_versions(&target.kind, &versions)
        .build()
}

fn target_api_resource(target: &GroupVersionKind) -> ApiResource {
    let gvk = kube::core::GroupVersionKind::gvk(&target.group, &target.version, &target.kind);
    ApiResource::from_gvk(&gvk)
}
