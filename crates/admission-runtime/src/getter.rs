//! Look up the current state of an object. Hooks use a getter to retrieve
//! the object being deleted, since DELETE requests do not carry it.

use kube::Api;
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

use crate::errors::{WebhookError, WorkloadError};
use crate::workload::{Workload, WorkloadKind, convert_to_workload};

#[derive(Error, Debug)]
pub enum GetError {
    #[error("{namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("cannot get {namespace}/{name}: {source}")]
    Failed {
        namespace: String,
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

impl GetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GetError::NotFound { .. })
    }
}

pub trait Getter<T>: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<T, GetError>;
}

impl<T, F> Getter<T> for F
where
    F: Fn(&str, &str) -> Result<T, GetError> + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Result<T, GetError> {
        self(namespace, name)
    }
}

/// Builds the getter of a hook when the hook is initialized.
pub trait GetterFactory<T>: Send + Sync {
    fn new_getter(&self, config: &kube::Config) -> Result<Box<dyn Getter<T>>, WebhookError>;
}

/// Getter factory backed by the Kubernetes API server.
///
/// Building a getter creates a TLS capable `kube::Client`, so the process
/// must have installed a default rustls `CryptoProvider` beforehand.
#[derive(Clone, Debug)]
pub struct KubeGetterFactory {
    resource: ApiResource,
}

impl KubeGetterFactory {
    pub fn new(resource: ApiResource) -> Self {
        KubeGetterFactory { resource }
    }

    /// Fetch workloads of `kind` in the version currently served for it.
    pub fn for_workload(kind: WorkloadKind) -> Self {
        KubeGetterFactory::new(kind.api_resource(&kind.preferred_group_version()))
    }

    fn build(&self, config: &kube::Config) -> Result<KubeGetter, WebhookError> {
        // Getters are invoked from blocking threads, they reach the
        // asynchronous client through the runtime active at initialization.
        let handle = Handle::try_current()
            .map_err(|e| WebhookError::Initialization(format!("no tokio runtime: {e}")))?;
        let _guard = handle.enter();
        let client = kube::Client::try_from(config.clone())
            .map_err(|e| WebhookError::Initialization(e.to_string()))?;
        Ok(KubeGetter {
            client,
            resource: self.resource.clone(),
            handle,
        })
    }
}

impl GetterFactory<DynamicObject> for KubeGetterFactory {
    fn new_getter(
        &self,
        config: &kube::Config,
    ) -> Result<Box<dyn Getter<DynamicObject>>, WebhookError> {
        Ok(Box::new(self.build(config)?))
    }
}

impl GetterFactory<Workload> for KubeGetterFactory {
    fn new_getter(&self, config: &kube::Config) -> Result<Box<dyn Getter<Workload>>, WebhookError> {
        let getter = self.build(config)?;
        Ok(Box::new(move |namespace: &str, name: &str| -> Result<Workload, GetError> {
            let obj = getter.get(namespace, name)?;
            Ok(convert_to_workload(&obj)?)
        }))
    }
}

struct KubeGetter {
    client: kube::Client,
    resource: ApiResource,
    handle: Handle,
}

impl Getter<DynamicObject> for KubeGetter {
    fn get(&self, namespace: &str, name: &str) -> Result<DynamicObject, GetError> {
        let api: Api<DynamicObject> = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &self.resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &self.resource)
        };
        debug!(
            namespace,
            name,
            kind = self.resource.kind.as_str(),
            "fetching object"
        );

        match self.handle.block_on(api.get(name)) {
            Ok(mut obj) => {
                if obj.types.is_none() {
                    obj.types = Some(TypeMeta {
                        api_version: self.resource.api_version.clone(),
                        kind: self.resource.kind.clone(),
                    });
                }
                Ok(obj)
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(GetError::NotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            }),
            Err(e) => Err(GetError::Failed {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                source: Box::new(e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_getters() {
        let getter = |namespace: &str, name: &str| -> Result<String, GetError> {
            if name == "missing" {
                Err(GetError::NotFound {
                    namespace: namespace.to_owned(),
                    name: name.to_owned(),
                })
            } else {
                Ok(format!("{namespace}/{name}"))
            }
        };

        assert_eq!(getter.get("default", "nginx").unwrap(), "default/nginx");
        assert!(getter.get("default", "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn factory_requires_a_runtime() {
        let factory = KubeGetterFactory::for_workload(WorkloadKind::Deployment);
        let config = kube::Config::new("http://localhost:8080".parse().unwrap());

        let result: Result<Box<dyn Getter<DynamicObject>>, WebhookError> =
            factory.new_getter(&config);

        assert!(matches!(result, Err(WebhookError::Initialization(_))));
    }

    #[tokio::test]
    async fn factory_builds_getter_inside_runtime() {
        // other tests of this binary may have installed it already
        let _ = rustls::crypto::ring::default_provider().install_default();

        let factory = KubeGetterFactory::for_workload(WorkloadKind::Deployment);
        let config = kube::Config::new("http://localhost:8080".parse().unwrap());

        let result: Result<Box<dyn Getter<Workload>>, WebhookError> = factory.new_getter(&config);

        assert!(result.is_ok());
    }
}
