//! Runtime abstraction layer for async operations
//!
//! Tile fetches are spawned through this module so the engine does not
//! depend on a particular executor. Tokio is used when the `tokio-runtime`
//! feature is enabled; anything else can be installed with [`init_runtime`].

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable unit of background work
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning detached async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Run a future to completion in the background
    fn spawn_boxed(&self, future: BoxedTask);
}

/// Spawn a future on the installed runtime
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;

        /// Tokio-based async spawner; must be used from within a tokio runtime
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxedTask) {
                ::tokio::spawn(future);
            }
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Install a specific spawner. Has no effect once a spawner is in use.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) -> bool {
    let installed = RUNTIME.set(spawner).is_ok();
    if !installed {
        log::warn!("Async runtime already initialised, keeping the existing spawner");
    }
    installed
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| {
            #[cfg(feature = "tokio-runtime")]
            {
                Box::new(spawners::tokio_impl::TokioSpawner)
            }

            #[cfg(not(feature = "tokio-runtime"))]
            {
                panic!("No async runtime available. Enable 'tokio-runtime' or call init_runtime().");
            }
        })
        .as_ref()
}
