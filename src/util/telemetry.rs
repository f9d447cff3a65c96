//! Structured logging setup.

/// Install a default `fmt` subscriber filtered by `RUST_LOG`, unless the
/// embedding application already installed one.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
