use admission_runtime::workload::WorkloadKind;
use clap::builder::PossibleValue;
use clap::{Arg, ArgAction, Command, crate_authors, crate_description, crate_name, crate_version};
use itertools::Itertools;
use lazy_static::lazy_static;

lazy_static! {
    static ref VERSION_AND_WORKLOAD_KINDS: String = {
        let kinds: String = WorkloadKind::ALL
            .iter()
            .map(|kind| {
                let versions = kind
                    .group_versions()
                    .iter()
                    .map(|gv| gv.api_version())
                    .join(", ");
                format!("  - {kind} ({versions})")
            })
            .join("\n");

        format!(
            "{}\n\nWorkload kinds supported by workload webhooks:\n{}",
            crate_version!(),
            kinds,
        )
    };
}

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("ADMISSION_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("ADMISSION_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("ADMISSION_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("8443")
            .env("ADMISSION_PORT")
            .help("Listen on PORT"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("")
            .env("ADMISSION_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("")
            .env("ADMISSION_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS"),
        Arg::new("webhooks")
            .long("webhooks")
            .value_name("WEBHOOKS_FILE")
            .env("ADMISSION_WEBHOOKS")
            .default_value("webhooks.yml")
            .help("YAML file holding the webhooks to serve"),
        Arg::new("max-concurrent-requests")
            .long("max-concurrent-requests")
            .value_name("MAX_CONCURRENT_REQUESTS")
            .env("ADMISSION_MAX_CONCURRENT_REQUESTS")
            .default_value("64")
            .help("Number of admission reviews evaluated at the same time"),
        Arg::new("kubeconfig-context")
            .long("kubeconfig-context")
            .value_name("CONTEXT")
            .env("ADMISSION_KUBECONFIG_CONTEXT")
            .required(false)
            .help("Kubeconfig context used to reach the cluster. Defaults to the in-cluster configuration or the current context"),
        Arg::new("ignore-kubernetes-connection-failure")
            .long("ignore-kubernetes-connection-failure")
            .env("ADMISSION_IGNORE_KUBERNETES_CONNECTION_FAILURE")
            .action(ArgAction::SetTrue)
            .help("Do not exit with an error if the Kubernetes configuration cannot be loaded. Webhooks fetching deleted objects will then fail to look them up."),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .long_version(VERSION_AND_WORKLOAD_KINDS.as_str())
        .args(args)
}
