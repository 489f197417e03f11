use std::sync::Arc;

use kube::core::DynamicObject;
use serde_json::Value;
use tracing::warn;

use super::{AdmissionHook, InitGate, observe_delete};
use crate::admission_request::{
    AdmissionRequest, GroupVersionKind, GroupVersionResource, Operation,
};
use crate::admission_response::AdmissionResponse;
use crate::errors::Result;
use crate::filter::RequestFilter;
use crate::getter::GetterFactory;
use crate::handler::ResourceHandler;
use crate::patch::patch_response;
use crate::scheme::{Codec, Scheme};

/// Hook for one kind, decoded into the `target` version whatever version
/// the request was sent in.
pub struct GenericWebhook {
    plural: GroupVersionResource,
    singular: String,
    target: GroupVersionKind,
    filter: RequestFilter,
    scheme: Arc<Scheme>,
    handler: Option<Arc<dyn ResourceHandler<DynamicObject>>>,
    gate: InitGate<DynamicObject>,
}

impl GenericWebhook {
    pub fn new<I, S>(
        plural: GroupVersionResource,
        singular: impl Into<String>,
        src_groups: I,
        target: GroupVersionKind,
        scheme: Arc<Scheme>,
        factory: Option<Arc<dyn GetterFactory<DynamicObject>>>,
        handler: Option<Arc<dyn ResourceHandler<DynamicObject>>>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GenericWebhook {
            plural,
            singular: singular.into(),
            filter: RequestFilter::new(handler.is_some(), src_groups, target.kind.clone()),
            target,
            scheme,
            handler,
            gate: InitGate::new(factory),
        }
    }

    fn decode(&self, codec: &Codec, req: &AdmissionRequest, value: &Value) -> Result<DynamicObject> {
        Ok(codec.decode_value(value.clone(), &req.kind)?)
    }

    fn mutate(
        &self,
        codec: &Codec,
        req: &AdmissionRequest,
        handler: &dyn ResourceHandler<DynamicObject>,
    ) -> AdmissionResponse {
        let Some(original) = req.object.as_ref().map(|raw| &raw.0) else {
            return AdmissionResponse::bad_request("missing object in admission request");
        };
        let obj = match self.decode(codec, req, original) {
            Ok(obj) => obj,
            Err(e) => {
                warn!(error = %e, "cannot decode object");
                return AdmissionResponse::bad_request(e.to_string());
            }
        };

        let result = if req.operation == Operation::Update {
            let Some(old) = req.old_object.as_ref().map(|raw| &raw.0) else {
                return AdmissionResponse::bad_request("missing oldObject in admission request");
            };
            match self.decode(codec, req, old) {
                Ok(old_obj) => handler.on_update(old_obj, obj),
                Err(e) => {
                    warn!(error = %e, "cannot decode old object");
                    return AdmissionResponse::bad_request(e.to_string());
                }
            }
        } else {
            handler.on_create(obj)
        };

        match result {
            Ok(None) => AdmissionResponse::allow(),
            Ok(Some(modified)) => match codec.encode_value(modified) {
                Ok(modified) => patch_response(original, &modified),
                Err(e) => {
                    warn!(error = %e, "cannot encode modified object");
                    AdmissionResponse::bad_request(e.to_string())
                }
            },
            Err(e) => {
                warn!(error = %e, "handler rejected object");
                AdmissionResponse::forbidden(e.to_string())
            }
        }
    }
}

impl AdmissionHook for GenericWebhook {
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

        let codec = Codec::new(
            self.scheme.clone(),
            req.kind.group_version(),
            self.target.group_version(),
        );
        let response = match req.operation {
            Operation::Delete => observe_delete(getter, handler, req),
            Operation::Create | Operation::Update => self.mutate(&codec, req, handler),
            Operation::Connect => AdmissionResponse::allow(),
        };
        response.with_uid(&req.uid)
    }
}
