//! Runtime for Kubernetes admission webhooks.
//!
//! Hooks implementing [`webhook::AdmissionHook`] receive admission requests,
//! decode the objects they carry through an injected [`scheme::Scheme`] and
//! hand them to a [`handler::ResourceHandler`]. Modifications made by the
//! handler are returned to the API server as a JSON patch.

pub extern crate k8s_openapi;
pub extern crate kube;

pub mod admission_request;
pub mod admission_response;
pub mod errors;
pub mod filter;
pub mod getter;
pub mod handler;
pub mod patch;
pub mod scheme;
pub mod webhook;
pub mod workload;
