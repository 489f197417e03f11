use thiserror::Error;

use crate::admission_request::{GroupVersion, GroupVersionKind};

pub type Result<T> = std::result::Result<T, WebhookError>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("cannot parse object: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("no kind {0} is registered in the scheme")]
    UnregisteredKind(GroupVersionKind),

    #[error("object has kind {found}, expected {expected}")]
    KindMismatch {
        expected: GroupVersionKind,
        found: GroupVersionKind,
    },

    #[error("object does not declare its apiVersion and kind")]
    MissingTypeMeta,

    #[error("no conversion registered from {from} to {to}")]
    NoConversion {
        from: GroupVersionKind,
        to: GroupVersion,
    },

    #[error("cannot convert {from} to {to}: {message}")]
    Conversion {
        from: GroupVersionKind,
        to: GroupVersion,
        message: String,
    },

    #[error("cannot serialize object: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("the object is not a pod or does not have a pod template: {0}")]
    UnsupportedKind(GroupVersionKind),

    #[error("unknown workload kind {0}")]
    UnknownKind(String),

    #[error("object does not declare its apiVersion and kind")]
    MissingTypeMeta,

    #[error("workload is not attached to an object")]
    MissingObject,

    #[error("malformed field {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("field {0} is not an object")]
    NotAnObject(String),

    #[error("cannot serialize workload: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook is already initialized")]
    AlreadyInitialized,

    #[error("cannot initialize webhook: {0}")]
    Initialization(String),

    #[error("missing {0} in admission request")]
    MissingObject(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("cannot decode patch: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cannot deserialize patch: {0}")]
    Deserialize(#[source] serde_json::Error),
}
