//! Dedicated async runtimes.
//!
//! Interceptors that want their work off the caller's context (cache reads on
//! one pool, network dispatch on another) get a [`Dispatcher`] from an
//! [`AsyncRuntime`].
//!
//! # Runtime Types
//!
//! - **Multi-threaded** (default): Tokio's work-stealing scheduler.
//! - **Single-threaded**: a current-thread runtime on one dedicated thread,
//!   which keeps all work it receives strictly ordered.
//!
//! # Example
//!
//! ```no_run
//! use horizon_relay_core::{AsyncRuntime, AsyncRuntimeConfig};
//!
//! let runtime = AsyncRuntime::new(
//!     AsyncRuntimeConfig::multi_threaded()
//!         .with_worker_threads(2)
//!         .with_thread_name("relay-network"),
//! )?;
//! let dispatcher = runtime.dispatcher();
//! # Ok::<(), horizon_relay_core::AsyncRuntimeError>(())
//! ```

use std::future::Future;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::dispatcher::Dispatcher;
use crate::error::AsyncRuntimeError;
use crate::logging::targets;

/// The type of async runtime to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeType {
    /// Multi-threaded runtime using Tokio's default scheduler.
    #[default]
    MultiThreaded,

    /// Single-threaded runtime on a dedicated thread.
    SingleThreaded,
}

/// Configuration for the async runtime.
#[derive(Debug, Clone)]
pub struct AsyncRuntimeConfig {
    /// The type of runtime to create.
    pub runtime_type: RuntimeType,
    /// Number of worker threads for multi-threaded runtime.
    /// Defaults to the number of CPU cores.
    pub worker_threads: Option<usize>,
    /// Name prefix for runtime threads.
    pub thread_name: String,
}

impl Default for AsyncRuntimeConfig {
    fn default() -> Self {
        Self {
            runtime_type: RuntimeType::MultiThreaded,
            worker_threads: None,
            thread_name: "horizon-relay".to_string(),
        }
    }
}

impl AsyncRuntimeConfig {
    /// Create a configuration for a multi-threaded runtime.
    pub fn multi_threaded() -> Self {
        Self {
            runtime_type: RuntimeType::MultiThreaded,
            ..Default::default()
        }
    }

    /// Create a configuration for a single-threaded runtime.
    pub fn single_threaded() -> Self {
        Self {
            runtime_type: RuntimeType::SingleThreaded,
            ..Default::default()
        }
    }

    /// Set the number of worker threads (multi-threaded runtime only).
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Set the thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Internal state for the single-threaded runtime.
struct SingleThreadedState {
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

/// An owned Tokio runtime that hands out [`Dispatcher`]s.
pub struct AsyncRuntime {
    /// Kept alive so the multi-threaded runtime does not shut down.
    #[allow(dead_code)]
    runtime: Option<Runtime>,
    handle: Handle,
    single_threaded: Option<SingleThreadedState>,
    runtime_type: RuntimeType,
}

impl AsyncRuntime {
    /// Create a new async runtime with the given configuration.
    pub fn new(config: AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        match config.runtime_type {
            RuntimeType::MultiThreaded => Self::new_multi_threaded(config),
            RuntimeType::SingleThreaded => Self::new_single_threaded(config),
        }
    }

    fn new_multi_threaded(config: AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name(&config.thread_name).enable_all();

        if let Some(workers) = config.worker_threads {
            builder.worker_threads(workers);
        }

        let runtime = builder
            .build()
            .map_err(|e| AsyncRuntimeError::CreationFailed(e.to_string()))?;
        let handle = runtime.handle().clone();

        tracing::debug!(target: targets::RUNTIME, name = %config.thread_name, "Started multi-threaded runtime");

        Ok(Self {
            runtime: Some(runtime),
            handle,
            single_threaded: None,
            runtime_type: RuntimeType::MultiThreaded,
        })
    }

    fn new_single_threaded(config: AsyncRuntimeConfig) -> Result<Self, AsyncRuntimeError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread_handle = std::thread::Builder::new()
            .name(format!("{}-main", config.thread_name))
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| AsyncRuntimeError::CreationFailed(e.to_string()))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| AsyncRuntimeError::CreationFailed("runtime thread exited".to_string()))?
            .map_err(AsyncRuntimeError::CreationFailed)?;

        tracing::debug!(target: targets::RUNTIME, name = %config.thread_name, "Started single-threaded runtime");

        Ok(Self {
            runtime: None,
            handle,
            single_threaded: Some(SingleThreadedState {
                thread_handle: Mutex::new(Some(thread_handle)),
                shutdown_tx,
            }),
            runtime_type: RuntimeType::SingleThreaded,
        })
    }

    /// Get the runtime type.
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Get a handle to the Tokio runtime.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// A dispatcher that runs work on this runtime.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::Runtime(self.handle.clone())
    }

    /// Block on a future, running it to completion.
    ///
    /// Do not call this from within an async context.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.handle.block_on(future)
    }

    /// Shut the runtime down.
    ///
    /// For single-threaded runtimes this stops and joins the runtime thread.
    pub fn shutdown(mut self) {
        if let Some(state) = self.single_threaded.take() {
            let _ = state.shutdown_tx.send(());
            if let Some(handle) = state.thread_handle.lock().take() {
                let _ = handle.join();
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for AsyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRuntime")
            .field("runtime_type", &self.runtime_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_multi_threaded_dispatch() {
        let runtime = AsyncRuntime::new(AsyncRuntimeConfig::multi_threaded()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let task = runtime.dispatcher().dispatch(Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        runtime.block_on(task);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_single_threaded_runtime() {
        let runtime = AsyncRuntime::new(AsyncRuntimeConfig::single_threaded()).unwrap();
        assert_eq!(runtime.runtime_type(), RuntimeType::SingleThreaded);

        let result = runtime.block_on(async { 42 });
        assert_eq!(result, 42);
        runtime.shutdown();
    }

    #[test]
    fn test_config_builder() {
        let config = AsyncRuntimeConfig::multi_threaded()
            .with_worker_threads(3)
            .with_thread_name("relay-test");

        assert_eq!(config.runtime_type, RuntimeType::MultiThreaded);
        assert_eq!(config.worker_threads, Some(3));
        assert_eq!(config.thread_name, "relay-test");
    }
}
