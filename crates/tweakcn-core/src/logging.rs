/// Installs the global subscriber: `RUST_LOG`-filtered fmt output at INFO
/// and above by default.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();

    // A second init (tests, embedding) keeps the first subscriber.
    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
