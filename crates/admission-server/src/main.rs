use admission_server::{AdmissionServer, cli, config::Config, tracing::setup_tracing};
use anyhow::{Result, anyhow};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    // Starting from rustls 0.22, each application must set its default crypto provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Cannot install the rustls crypto provider"))?;

    let server = AdmissionServer::new_from_config(config).await?;
    server.run().await
}
