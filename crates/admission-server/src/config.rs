use std::collections::BTreeMap;
use std::fs::File;
use std::net::SocketAddr;
use std::path::Path;

use admission_runtime::admission_request::{GroupVersionKind, GroupVersionResource};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::overlay::TemplateOverlay;

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

pub struct Config {
    pub addr: SocketAddr,
    pub webhooks: BTreeMap<String, WebhookDefinition>,
    pub tls_config: Option<TlsConfig>,
    pub max_concurrent_requests: usize,
    pub kubeconfig_context: Option<String>,
    pub ignore_kubernetes_connection_failure: bool,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let webhooks = webhooks(matches)?;

        let max_concurrent_requests = string_arg(matches, "max-concurrent-requests")?
            .parse::<usize>()
            .map_err(|e| anyhow!("error parsing the number of concurrent requests: {}", e))?;
        if max_concurrent_requests == 0 {
            return Err(anyhow!(
                "error parsing arguments: --max-concurrent-requests must be greater than zero"
            ));
        }

        let kubeconfig_context = matches.get_one::<String>("kubeconfig-context").cloned();
        let ignore_kubernetes_connection_failure =
            flag_arg(matches, "ignore-kubernetes-connection-failure");

        let log_level = string_arg(matches, "log-level")?;
        let log_fmt = string_arg(matches, "log-fmt")?;
        let log_no_color = flag_arg(matches, "log-no-color");

        let (cert_file, key_file) = tls_files(matches)?;
        let tls_config = if cert_file.is_empty() {
            None
        } else {
            Some(TlsConfig {
                cert_file,
                key_file,
            })
        };

        Ok(Self {
            addr,
            webhooks,
            tls_config,
            max_concurrent_requests,
            kubeconfig_context,
            ignore_kubernetes_connection_failure,
            log_level,
            log_fmt,
            log_no_color,
        })
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| anyhow!("error parsing arguments: missing value for {}", id))
}

fn flag_arg(matches: &ArgMatches, id: &str) -> bool {
    matches.get_one::<bool>(id).copied().unwrap_or_default()
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        string_arg(matches, "address")?,
        string_arg(matches, "port")?
    )
    .parse()
    .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_files(matches: &ArgMatches) -> Result<(String, String)> {
    let cert_file = string_arg(matches, "cert-file")?;
    let key_file = string_arg(matches, "key-file")?;
    if cert_file.is_empty() != key_file.is_empty() {
        Err(anyhow!(
            "error parsing arguments: either both --cert-file and --key-file must be provided, or neither"
        ))
    } else {
        Ok((cert_file, key_file))
    }
}

fn webhooks(matches: &ArgMatches) -> Result<BTreeMap<String, WebhookDefinition>> {
    let webhooks_file = string_arg(matches, "webhooks")?;
    let webhooks_file = Path::new(&webhooks_file);
    read_webhooks_file(webhooks_file).map_err(|e| {
        anyhow!(
            "error while loading webhooks from {:?}: {}",
            webhooks_file,
            e
        )
    })
}

/// A webhook served by the server, as read from the webhooks file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDefinition {
    /// Where the API server sends the admission reviews
    pub resource: GroupVersionResource,
    pub singular: String,
    #[serde(flatten)]
    pub hook: HookType,
    /// Look up the deleted objects and hand them to the handler
    #[serde(default)]
    pub fetch_on_delete: bool,
    #[serde(flatten)]
    pub overlay: TemplateOverlay,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum HookType {
    Generic {
        target: GroupVersionKind,
        /// Groups the kind is accepted from. Defaults to the target group.
        #[serde(default)]
        source_groups: Vec<String>,
        /// Other apiVersions in which the kind has the same schema as the target
        #[serde(default)]
        compatible_versions: Vec<String>,
    },
    Workload {
        kind: String,
    },
}

/// Reads the webhooks definitions from a YAML file.
pub fn read_webhooks_file(path: &Path) -> Result<BTreeMap<String, WebhookDefinition>> {
    let settings_file = File::open(path)?;
    let webhooks: BTreeMap<String, WebhookDefinition> = serde_yaml::from_reader(&settings_file)?;
    Ok(webhooks)
}
