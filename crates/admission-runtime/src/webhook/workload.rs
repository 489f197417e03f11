use std::sync::Arc;

use kube::core::DynamicObject;
use serde_json::Value;
use tracing::warn;

use super::{AdmissionHook, InitGate, WORKLOAD_GROUPS, observe_delete};
use crate::admission_request::{AdmissionRequest, GroupVersionResource, Operation};
use crate::admission_response::AdmissionResponse;
use crate::errors::{Result, WebhookError};
use crate::filter::RequestFilter;
use crate::getter::GetterFactory;
use crate::handler::ResourceHandler;
use crate::patch::patch_response;
use crate::scheme::Scheme;
use crate::workload::{Workload, apply_workload, convert_to_workload};

/// Hook for the kinds carrying a pod template. Objects are handed to the
/// handler as [`Workload`]s, in the version the request was sent in.
pub struct WorkloadWebhook {
    plural: GroupVersionResource,
    singular: String,
    filter: RequestFilter,
    scheme: Arc<Scheme>,
    handler: Option<Arc<dyn ResourceHandler<Workload>>>,
    gate: InitGate<Workload>,
}

impl WorkloadWebhook {
    pub fn new(
        plural: GroupVersionResource,
        singular: impl Into<String>,
        kind: impl Into<String>,
        scheme: Arc<Scheme>,
        factory: Option<Arc<dyn GetterFactory<Workload>>>,
        handler: Option<Arc<dyn ResourceHandler<Workload>>>,
    ) -> Self {
        WorkloadWebhook {
            plural,
            singular: singular.into(),
            filter: RequestFilter::new(handler.is_some(), WORKLOAD_GROUPS, kind),
            scheme,
            handler,
            gate: InitGate::new(factory),
        }
    }

    fn decode(&self, req: &AdmissionRequest, value: &Value) -> Result<(DynamicObject, Workload)> {
        let obj = self.scheme.decode_value(value.clone(), &req.kind)?;
        let workload = convert_to_workload(&obj)?;
        Ok((obj, workload))
    }

    fn mutate(
        &self,
        req: &AdmissionRequest,
        handler: &dyn ResourceHandler<Workload>,
    ) -> AdmissionResponse {
        let Some(original) = req.object.as_ref().map(|raw| &raw.0) else {
            return AdmissionResponse::bad_request("missing object in admission request");
        };
        let (obj, workload) = match self.decode(req, original) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "cannot decode workload");
                return AdmissionResponse::bad_request(e.to_string());
            }
        };

        let result = if req.operation == Operation::Update {
            let old = req
                .old_object
                .as_ref()
                .map(|raw| &raw.0)
                .ok_or(WebhookError::MissingObject("oldObject"))
                .and_then(|old| self.decode(req, old));
            match old {
                Ok((_, old_workload)) => handler.on_update(old_workload, workload),
                Err(e) => {
                    warn!(error = %e, "cannot decode old workload");
                    return AdmissionResponse::bad_request(e.to_string());
                }
            }
        } else {
            handler.on_create(workload)
        };

        match result {
            Ok(None) => AdmissionResponse::allow(),
            Ok(Some(modified)) => self.patch(original, obj, modified),
            Err(e) => {
                warn!(error = %e, "handler rejected workload");
                AdmissionResponse::forbidden(e.to_string())
            }
        }
    }

    /// A workload still attached to its object is taken as is, otherwise it
    /// is applied onto the decoded object.
    fn patch(&self, original: &Value, decoded: DynamicObject, modified: Workload) -> AdmissionResponse {
        let mut obj = match modified.object {
            Some(ref obj) => obj.clone(),
            None => {
                let mut obj = decoded;
                if let Err(e) = apply_workload(&mut obj, &modified) {
                    warn!(error = %e, "cannot apply workload");
                    return AdmissionResponse::forbidden(e.to_string());
                }
                obj
            }
        };
        self.scheme.default_object(&mut obj);

        match self.scheme.encode_value(&obj) {
            Ok(modified) => patch_response(original, &modified),
            Err(e) => {
                warn!(error = %e, "cannot encode modified workload");
                AdmissionResponse::bad_request(e.to_string())
            }
        }
    }
}

impl AdmissionHook for WorkloadWebhook {
    fn resource(&self) -> (GroupVersionResource, String) {
        (self.plural.clone(), self.singular.clone())
    }

    fn initialize(&self, config: &kube::Config) -> Result<()> {
        self.gate.initialize(config)
    }

    fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    fn admit(&self, req: &AdmissionRequest) -> AdmissionResponse {
        let handler = match &self.handler {
            Some(handler) if self.filter.accepts(req) => handler.as_ref(),
            _ => return AdmissionResponse::allow().with_uid(&req.uid),
        };
        let Some(getter) = self.gate.getter() else {
            return AdmissionResponse::uninitialized().with_uid(&req.uid);
        };

        let response = match req.operation {
            Operation::Delete => observe_delete(getter, handler, req),
            Operation::Create | Operation::Update => self.mutate(req, handler),
            Operation::Connect => AdmissionResponse::allow(),
        };
        response.with_uid(&req.uid)
    }
}
