//! Logging setup.
//!
//! The library only emits records through the `log` facade. Binaries and
//! tests that want to see them install `env_logger` through these helpers,
//! which honour `RUST_LOG` and otherwise fall back to `default_filter`.

/// Install `env_logger`. Returns false if a logger was already installed.
#[cfg(feature = "debug")]
pub fn init(default_filter: &str) -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Without the `debug` feature there is no logger to install.
#[cfg(not(feature = "debug"))]
pub fn init(_default_filter: &str) -> bool {
    false
}

/// Logger for unit and integration tests; output is captured per test.
#[cfg(feature = "debug")]
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

#[cfg(not(feature = "debug"))]
pub fn init_for_tests() {}
