use std::collections::BTreeMap;

use admission_runtime::admission_request::{GroupVersionKind, GroupVersionResource};
use admission_server::{
    AdmissionServer,
    config::{Config, HookType, WebhookDefinition},
    overlay::TemplateOverlay,
};
use axum::Router;

pub(crate) const GROUP: &str = "admission.example.com";

pub(crate) fn default_test_config() -> Config {
    let webhooks = BTreeMap::from([
        (
            "deployments".to_owned(),
            WebhookDefinition {
                resource: GroupVersionResource::new(GROUP, "v1", "deployments"),
                singular: "deployment".to_owned(),
                hook: HookType::Workload {
                    kind: "Deployment".to_owned(),
                },
                fetch_on_delete: false,
                overlay: TemplateOverlay {
                    labels: BTreeMap::from([("team".to_owned(), "payments".to_owned())]),
                    template_labels: BTreeMap::from([(
                        "sidecar".to_owned(),
                        "enabled".to_owned(),
                    )]),
                    ..Default::default()
                },
            },
        ),
        (
            "configmaps".to_owned(),
            WebhookDefinition {
                resource: GroupVersionResource::new(GROUP, "v1", "configmaps"),
                singular: "configmap".to_owned(),
                hook: HookType::Generic {
                    target: GroupVersionKind::new("", "v1", "ConfigMap"),
                    source_groups: vec![],
                    compatible_versions: vec![],
                },
                fetch_on_delete: false,
                overlay: TemplateOverlay {
                    annotations: BTreeMap::from([(
                        "example.com/owner".to_owned(),
                        "payments".to_owned(),
                    )]),
                    ..Default::default()
                },
            },
        ),
        (
            "pods".to_owned(),
            WebhookDefinition {
                resource: GroupVersionResource::new("", "v1", "pods"),
                singular: "pod".to_owned(),
                hook: HookType::Workload {
                    kind: "Pod".to_owned(),
                },
                fetch_on_delete: false,
                overlay: TemplateOverlay::default(),
            },
        ),
    ]);

    Config {
        addr: "127.0.0.1:8443".parse().unwrap(),
        webhooks,
        tls_config: None,
        max_concurrent_requests: 4,
        kubeconfig_context: None,
        ignore_kubernetes_connection_failure: true,
        log_level: "info".to_owned(),
        log_fmt: "text".to_owned(),
        log_no_color: true,
    }
}

pub(crate) async fn app(config: Config) -> Router {
    let server = AdmissionServer::new_from_config(config).await.unwrap();
    server.router()
}
