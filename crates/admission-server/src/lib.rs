pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod hooks;
pub mod overlay;
pub mod tracing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ::tracing::{info, warn};
use anyhow::{Result, anyhow};
use axum::{
    Router,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use itertools::Itertools;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use api::handlers::{admission_handler, core_admission_handler, readiness_handler};
use api::state::ApiServerState;
use config::Config;
use hooks::build_hooks;

/// Used when the Kubernetes configuration cannot be loaded and the failure
/// is ignored.
const FALLBACK_CLUSTER_URL: &str = "https://kubernetes.default.svc";

/// How often hooks that failed to initialize are initialized again.
const INITIALIZATION_RETRY_PERIOD: Duration = Duration::from_secs(30);

pub struct AdmissionServer {
    router: Router,
    state: Arc<ApiServerState>,
    tls_config: Option<RustlsConfig>,
    addr: SocketAddr,
    kubeconfig_context: Option<String>,
}

impl AdmissionServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let hooks = build_hooks(&config.webhooks)?;
        if hooks.is_empty() {
            warn!("no webhook configured, every admission review will be refused");
        } else {
            info!(
                count = hooks.len(),
                webhooks = config.webhooks.keys().join(", ").as_str(),
                "webhooks loaded"
            );
        }

        let kube_config = kube_config(
            config.kubeconfig_context.as_deref(),
            config.ignore_kubernetes_connection_failure,
        )
        .await?;
        hooks.initialize(&kube_config, config.ignore_kubernetes_connection_failure)?;

        let state = Arc::new(ApiServerState {
            semaphore: Semaphore::new(config.max_concurrent_requests),
            hooks,
        });

        let router = Router::new()
            .route("/apis/{group}/{version}/{resource}", post(admission_handler))
            .route("/api/{version}/{resource}", post(core_admission_handler))
            .route("/readiness", get(readiness_handler))
            .with_state(state.clone())
            .layer(TraceLayer::new_for_http());

        let tls_config = match &config.tls_config {
            Some(tls_config) => Some(certs::create_tls_config(tls_config).await?),
            None => None,
        };

        Ok(Self {
            router,
            state,
            tls_config,
            addr: config.addr,
            kubeconfig_context: config.kubeconfig_context,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        if !self.state.hooks.all_initialized() {
            tokio::spawn(retry_initialization(
                self.state.clone(),
                self.kubeconfig_context.clone(),
                INITIALIZATION_RETRY_PERIOD,
            ));
        }

        match self.tls_config {
            Some(tls_config) => {
                info!(address = %self.addr, "started HTTPS server");
                axum_server::bind_rustls(self.addr, tls_config)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                info!(address = %self.addr, "started HTTP server");
                axum_server::bind(self.addr)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }
        Ok(())
    }
}

/// Initialize the hooks left uninitialized at start-up, reloading the
/// Kubernetes configuration on every attempt, until all of them are ready.
async fn retry_initialization(
    state: Arc<ApiServerState>,
    context: Option<String>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !state.hooks.all_initialized() {
        interval.tick().await;
        match kube_config(context.as_deref(), true).await {
            Ok(kube_config) => {
                if let Err(e) = state.hooks.initialize(&kube_config, true) {
                    warn!(error = %e, "cannot initialize webhooks");
                }
            }
            Err(e) => warn!(error = %e, "cannot reload the Kubernetes configuration"),
        }
    }
    info!("all webhooks initialized");
}

async fn kube_config(context: Option<&str>, ignore_failure: bool) -> Result<kube::Config> {
    let result = match context {
        Some(context) => {
            let options = kube::config::KubeConfigOptions {
                context: Some(context.to_owned()),
                ..Default::default()
            };
            kube::Config::from_kubeconfig(&options)
                .await
                .map_err(anyhow::Error::from)
        }
        None => kube::Config::infer().await.map_err(anyhow::Error::from),
    };

    match result {
        Ok(config) => Ok(config),
        Err(e) if ignore_failure => {
            warn!(
                error = %e,
                "cannot load the Kubernetes configuration, webhooks fetching deleted objects will not be able to look them up"
            );
            Ok(kube::Config::new(FALLBACK_CLUSTER_URL.parse()?))
        }
        Err(e) => Err(anyhow!("cannot load the Kubernetes configuration: {e}")),
    }
}
