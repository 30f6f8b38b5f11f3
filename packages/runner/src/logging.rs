use tracing_subscriber::EnvFilter;

/// Initialize the fmt subscriber with an env-filter; repeated calls in
/// tests are harmless.
pub fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
