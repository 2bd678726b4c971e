use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the JSON log subscriber. `RUST_LOG` overrides the default `info`
/// filter. Calling it again after a subscriber is installed is a no-op.
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init().unwrap();
        super::init().unwrap();
        tracing::info!("telemetry ready");
    }
}
