use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    // Structured JSON logging with span information; the filter is taken from
    // RUST_LOG so probe noise can be silenced per module.
    Registry::default()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true),
        )
        .init();

    tracing::info!("Structured logging initialized");
}
