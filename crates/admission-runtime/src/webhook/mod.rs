//! Admission hooks dispatching requests to [`ResourceHandler`]s.
//!
//! A hook filters the requests it receives, decodes the objects they carry,
//! passes them to its handler and turns the handler's modifications into a
//! JSON patch. Failures never escape a hook: they are reported through the
//! returned [`AdmissionResponse`].

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::admission_request::{AdmissionRequest, GroupVersionResource};
use crate::admission_response::AdmissionResponse;
use crate::errors::{Result, WebhookError};
use crate::getter::{Getter, GetterFactory};
use crate::handler::ResourceHandler;

mod generic;
mod workload;

pub use generic::GenericWebhook;
pub use workload::WorkloadWebhook;

/// API groups serving the kinds that carry a pod template
pub const WORKLOAD_GROUPS: [&str; 5] = ["", "apps", "extensions", "batch", "apps.openshift.io"];

pub trait AdmissionHook: Send + Sync {
    /// The resource under which the hook is served and its singular name
    fn resource(&self) -> (GroupVersionResource, String);

    /// Prepare the hook to serve requests. Must be called exactly once.
    fn initialize(&self, config: &kube::Config) -> Result<()>;

    fn is_initialized(&self) -> bool;

    fn admit(&self, req: &AdmissionRequest) -> AdmissionResponse;
}

/// Builds the getter of a hook once. Until then the hook refuses to serve.
pub(crate) struct InitGate<T> {
    factory: Option<Arc<dyn GetterFactory<T>>>,
    getter: OnceLock<Option<Box<dyn Getter<T>>>>,
}

impl<T> InitGate<T> {
    pub(crate) fn new(factory: Option<Arc<dyn GetterFactory<T>>>) -> Self {
        InitGate {
            factory,
            getter: OnceLock::new(),
        }
    }

    pub(crate) fn initialize(&self, config: &kube::Config) -> Result<()> {
        if self.getter.get().is_some() {
            return Err(WebhookError::AlreadyInitialized);
        }
        let getter = self
            .factory
            .as_ref()
            .map(|factory| factory.new_getter(config))
            .transpose()?;
        self.getter
            .set(getter)
            .map_err(|_| WebhookError::AlreadyInitialized)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.getter.get().is_some()
    }

    /// `None` while the hook is not initialized
    pub(crate) fn getter(&self) -> Option<Option<&dyn Getter<T>>> {
        self.getter.get().map(|getter| getter.as_deref())
    }
}

/// DELETE requests do not carry the object: look it up and hand it to the
/// handler. Objects that are already gone are not reported.
pub(crate) fn observe_delete<T>(
    getter: Option<&dyn Getter<T>>,
    handler: &dyn ResourceHandler<T>,
    req: &AdmissionRequest,
) -> AdmissionResponse {
    let Some(getter) = getter else {
        return AdmissionResponse::allow();
    };
    let namespace = req.namespace.as_deref().unwrap_or_default();
    let name = req.name.as_deref().unwrap_or_default();

    match getter.get(namespace, name) {
        Ok(obj) => match handler.on_delete(obj) {
            Ok(()) => AdmissionResponse::allow(),
            Err(e) => {
                warn!(error = %e, "handler refused deletion");
                AdmissionResponse::bad_request(e.to_string())
            }
        },
        Err(e) if e.is_not_found() => {
            debug!(namespace, name, "deleted object already gone");
            AdmissionResponse::allow()
        }
        Err(e) => {
            warn!(error = %e, "cannot look up deleted object");
            AdmissionResponse::bad_request(e.to_string())
        }
    }
}
