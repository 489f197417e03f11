//! Registry of the kinds a hook is able to decode, together with their
//! defaulting functions and the conversions between versions.
//!
//! A [`Scheme`] is built explicitly and handed to every hook that needs it.
//! The [`Codec`] binds a scheme to the version the request was sent in and
//! the version a hook works with.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use kube::core::DynamicObject;
use serde_json::Value;

use crate::admission_request::{GroupVersion, GroupVersionKind};
use crate::errors::CodecError;
use crate::workload::WorkloadKind;

pub type Defaulter = Arc<dyn Fn(&mut DynamicObject) + Send + Sync>;
pub type Conversion =
    Arc<dyn Fn(DynamicObject) -> Result<DynamicObject, CodecError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Scheme {
    kinds: HashSet<GroupVersionKind>,
    defaulters: HashMap<GroupVersionKind, Vec<Defaulter>>,
    conversions: HashMap<(GroupVersionKind, GroupVersion), Conversion>,
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.kinds.iter().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("Scheme")
            .field("kinds", &kinds)
            .field("defaulters", &self.defaulters.len())
            .field("conversions", &self.conversions.len())
            .finish()
    }
}

impl Scheme {
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    /// Every supported workload kind, with conversions between the versions
    /// of the same kind.
    pub fn workloads() -> Scheme {
        Scheme::builder().workloads().build()
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.contains(gvk)
    }

    pub fn decode(&self, raw: &[u8], gvk: &GroupVersionKind) -> Result<DynamicObject, CodecError> {
        let value: Value = serde_json::from_slice(raw).map_err(CodecError::Parse)?;
        self.decode_value(value, gvk)
    }

    /// Decode a JSON document as an object of the given kind. The kind must
    /// be registered, and a document declaring another kind is refused.
    /// Missing type information is filled in from `gvk`.
    pub fn decode_value(
        &self,
        mut value: Value,
        gvk: &GroupVersionKind,
    ) -> Result<DynamicObject, CodecError> {
        if !self.recognizes(gvk) {
            return Err(CodecError::UnregisteredKind(gvk.clone()));
        }
        if let Value::Object(map) = &mut value {
            map.entry("metadata")
                .or_insert_with(|| Value::Object(Default::default()));
        }

        let mut obj: DynamicObject = serde_json::from_value(value).map_err(CodecError::Parse)?;
        if let Some(types) = &obj.types {
            let found = GroupVersionKind::from_type_meta(types);
            let partial = types.api_version.is_empty() || types.kind.is_empty();
            if !partial && found != *gvk {
                return Err(CodecError::KindMismatch {
                    expected: gvk.clone(),
                    found,
                });
            }
        }
        obj.types = Some(gvk.type_meta());
        self.default_object(&mut obj);
        Ok(obj)
    }

    pub fn encode(&self, obj: &DynamicObject) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(obj).map_err(CodecError::Serialize)
    }

    pub fn encode_value(&self, obj: &DynamicObject) -> Result<Value, CodecError> {
        serde_json::to_value(obj).map_err(CodecError::Serialize)
    }

    /// Run the defaulting functions registered for the kind of `obj`.
    /// Objects without type information are left untouched.
    pub fn default_object(&self, obj: &mut DynamicObject) {
        let Some(gvk) = gvk_of(obj) else {
            return;
        };
        if let Some(defaulters) = self.defaulters.get(&gvk) {
            for defaulter in defaulters {
                defaulter(obj);
            }
        }
    }

    /// Convert `obj` to the `target` group/version of the same kind.
    pub fn convert(
        &self,
        obj: DynamicObject,
        target: &GroupVersion,
    ) -> Result<DynamicObject, CodecError> {
        let gvk = gvk_of(&obj).ok_or(CodecError::MissingTypeMeta)?;
        if gvk.group_version() == *target {
            return Ok(obj);
        }
        let conversion = self
            .conversions
            .get(&(gvk.clone(), target.clone()))
            .ok_or_else(|| CodecError::NoConversion {
                from: gvk.clone(),
                to: target.clone(),
            })?;

        let mut converted = conversion(obj)?;
        let converted_gvk = target.with_kind(gvk.kind.clone());
        if !self.recognizes(&converted_gvk) {
            return Err(CodecError::UnregisteredKind(converted_gvk));
        }
        converted.types = Some(converted_gvk.type_meta());
        Ok(converted)
    }
}

/// The kind of an object, read from its type information.
pub fn gvk_of(obj: &DynamicObject) -> Option<GroupVersionKind> {
    obj.types
        .as_ref()
        .filter(|types| !types.kind.is_empty() && !types.api_version.is_empty())
        .map(GroupVersionKind::from_type_meta)
}

#[derive(Default)]
pub struct SchemeBuilder {
    scheme: Scheme,
}

impl SchemeBuilder {
    pub fn kind(mut self, gvk: GroupVersionKind) -> Self {
        self.scheme.kinds.insert(gvk);
        self
    }

    pub fn kinds(self, kinds: impl IntoIterator<Item = GroupVersionKind>) -> Self {
        kinds.into_iter().fold(self, SchemeBuilder::kind)
    }

    pub fn defaulter<F>(mut self, gvk: GroupVersionKind, defaulter: F) -> Self
    where
        F: Fn(&mut DynamicObject) + Send + Sync + 'static,
    {
        self.scheme.kinds.insert(gvk.clone());
        self.scheme
            .defaulters
            .entry(gvk)
            .or_default()
            .push(Arc::new(defaulter));
        self
    }

    pub fn conversion<F>(mut self, from: GroupVersionKind, to: GroupVersion, conversion: F) -> Self
    where
        F: Fn(DynamicObject) -> Result<DynamicObject, CodecError> + Send + Sync + 'static,
    {
        self.scheme.kinds.insert(from.clone());
        self.scheme
            .conversions
            .insert((from, to), Arc::new(conversion));
        self
    }

    /// Register `kind` in every group/version listed and allow conversions
    /// among them. The body of the object is kept as is and only the type
    /// information changes.
    pub fn compatible_versions(mut self, kind: &str, versions: &[GroupVersion]) -> Self {
        for from in versions {
            let from_gvk = from.with_kind(kind);
            self.scheme.kinds.insert(from_gvk.clone());
            for to in versions.iter().filter(|to| *to != from) {
                self = self.conversion(from_gvk.clone(), to.clone(), Ok);
            }
        }
        self
    }

    pub fn workloads(self) -> Self {
        WorkloadKind::ALL.iter().fold(self, |builder, kind| {
            builder.compatible_versions(kind.as_str(), &kind.group_versions())
        })
    }

    pub fn build(self) -> Scheme {
        self.scheme
    }
}

/// Decodes objects into the version a hook works with and encodes them back
/// into the version of the request.
#[derive(Clone, Debug)]
pub struct Codec {
    scheme: Arc<Scheme>,
    encode_version: GroupVersion,
    decode_version: GroupVersion,
}

impl Codec {
    pub fn new(
        scheme: Arc<Scheme>,
        encode_version: GroupVersion,
        decode_version: GroupVersion,
    ) -> Self {
        Codec {
            scheme,
            encode_version,
            decode_version,
        }
    }

    pub fn decode(&self, raw: &[u8], gvk: &GroupVersionKind) -> Result<DynamicObject, CodecError> {
        let value: Value = serde_json::from_slice(raw).map_err(CodecError::Parse)?;
        self.decode_value(value, gvk)
    }

    pub fn decode_value(
        &self,
        value: Value,
        gvk: &GroupVersionKind,
    ) -> Result<DynamicObject, CodecError> {
        let obj = self.scheme.decode_value(value, gvk)?;
        let mut obj = self.scheme.convert(obj, &self.decode_version)?;
        self.scheme.default_object(&mut obj);
        Ok(obj)
    }

    pub fn encode_value(&self, obj: DynamicObject) -> Result<Value, CodecError> {
        let mut obj = self.scheme.convert(obj, &self.encode_version)?;
        self.scheme.default_object(&mut obj);
        self.scheme.encode_value(&obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn deployment(api_version: &str) -> Value {
        json!({
            "apiVersion": api_version,
            "kind": "Deployment",
            "metadata": {"name": "nginx", "namespace": "default"},
            "spec": {
                "template": {
                    "metadata": {"labels": {"app": "nginx"}},
                    "spec": {"containers": [{"name": "nginx", "image": "nginx"}]}
                }
            }
        })
    }

    #[test]
    fn decode_registered_kind() {
        let scheme = Scheme::workloads();
        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
        let raw = serde_json::to_vec(&deployment("apps/v1")).unwrap();

        let obj = scheme.decode(&raw, &gvk).unwrap();

        assert_eq!(gvk_of(&obj), Some(gvk));
        assert_eq!(obj.metadata.name.as_deref(), Some("nginx"));
        assert_eq!(obj.data["spec"]["template"]["metadata"]["labels"]["app"], "nginx");
    }

    #[test]
    fn decode_fills_in_missing_type_information() {
        let scheme = Scheme::workloads();
        let gvk = GroupVersionKind::new("", "v1", "Pod");

        let obj = scheme
            .decode_value(json!({"spec": {"containers": []}}), &gvk)
            .unwrap();

        assert_eq!(gvk_of(&obj), Some(gvk));
        assert_eq!(obj.metadata, Default::default());
    }

    #[rstest]
    #[case::unregistered(
        GroupVersionKind::new("example.com", "v1", "Widget"),
        deployment("example.com/v1")
    )]
    #[case::mismatch(GroupVersionKind::new("apps", "v1", "Deployment"), deployment("apps/v1beta2"))]
    #[case::not_an_object(GroupVersionKind::new("apps", "v1", "Deployment"), json!([1, 2, 3]))]
    fn decode_failures(#[case] gvk: GroupVersionKind, #[case] value: Value) {
        let scheme = Scheme::workloads();

        assert!(scheme.decode_value(value, &gvk).is_err());
    }

    #[test]
    fn decode_malformed_bytes() {
        let scheme = Scheme::workloads();
        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");

        assert!(matches!(
            scheme.decode(b"{not json", &gvk),
            Err(CodecError::Parse(_))
        ));
    }

    #[test]
    fn defaulters_run_on_decode() {
        let gvk = GroupVersionKind::new("example.com", "v1", "Widget");
        let scheme = Scheme::builder()
            .defaulter(gvk.clone(), |obj| {
                if obj.data.get("spec").is_none() {
                    obj.data["spec"] = json!({"size": 1});
                }
            })
            .build();

        let obj = scheme
            .decode_value(json!({"metadata": {"name": "w"}}), &gvk)
            .unwrap();

        assert_eq!(obj.data["spec"]["size"], 1);
    }

    #[test]
    fn convert_between_compatible_versions() {
        let scheme = Scheme::workloads();
        let gvk = GroupVersionKind::new("extensions", "v1beta1", "Deployment");
        let obj = scheme
            .decode_value(deployment("extensions/v1beta1"), &gvk)
            .unwrap();

        let converted = scheme
            .convert(obj.clone(), &GroupVersion::new("apps", "v1"))
            .unwrap();

        assert_eq!(
            gvk_of(&converted),
            Some(GroupVersionKind::new("apps", "v1", "Deployment"))
        );
        assert_eq!(converted.data, obj.data);
        assert_eq!(converted.metadata, obj.metadata);
    }

    #[test]
    fn convert_without_registered_conversion() {
        let scheme = Scheme::workloads();
        let gvk = GroupVersionKind::new("batch", "v1", "Job");
        let obj = scheme
            .decode_value(json!({"metadata": {"name": "job"}}), &gvk)
            .unwrap();

        let result = scheme.convert(obj, &GroupVersion::new("batch", "v2"));

        assert!(matches!(result, Err(CodecError::NoConversion { .. })));
    }

    #[test]
    fn codec_round_trip_through_target_version() {
        let scheme = Arc::new(Scheme::workloads());
        let codec = Codec::new(
            scheme,
            GroupVersion::new("apps", "v1beta2"),
            GroupVersion::new("apps", "v1"),
        );
        let gvk = GroupVersionKind::new("apps", "v1beta2", "Deployment");
        let original = deployment("apps/v1beta2");
        let raw = serde_json::to_vec(&original).unwrap();

        let decoded = codec.decode(&raw, &gvk).unwrap();
        assert_eq!(
            gvk_of(&decoded),
            Some(GroupVersionKind::new("apps", "v1", "Deployment"))
        );

        let encoded = codec.encode_value(decoded).unwrap();
        assert_eq!(encoded, original);
    }
}
