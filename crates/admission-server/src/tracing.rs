use anyhow::{Result, anyhow};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. `log_fmt` is either `text` or `json`.
pub fn setup_tracing(log_level: &str, log_fmt: &str, log_no_color: bool) -> Result<()> {
    let mut filter_layer = EnvFilter::new(log_level);
    // some of our dependencies generate trace events too, but we don't care about them
    for noisy in ["h2", "hyper", "hyper_util", "rustls", "tower"] {
        filter_layer = filter_layer.add_directive(
            format!("{noisy}=off")
                .parse()
                .map_err(|e| anyhow!("invalid log directive for {noisy}: {e}"))?,
        );
    }

    match log_fmt {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().json())
            .try_init()?,
        "text" => {
            let fmt_layer = fmt::layer().with_ansi(!log_no_color);

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init()?
        }
        _ => return Err(anyhow!("Unknown log message format")),
    };

    Ok(())
}
