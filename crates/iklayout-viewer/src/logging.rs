use env_logger::Env;

/// Install the `env_logger` backend for the `log` facade.
///
/// Respects `RUST_LOG`, defaulting to `info`. Calling it again after a logger
/// is installed is harmless and returns `false`.
pub fn init() -> bool {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
