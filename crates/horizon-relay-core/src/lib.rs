//! Core systems for Horizon Relay.
//!
//! This crate provides the execution primitives the transport crate is built
//! on:
//!
//! - **Dispatchers**: where a unit of async work runs (inline or on a runtime)
//! - **Async Runtime**: owned Tokio runtimes that hand out dispatchers
//! - **Cancellation**: cooperative cancellation tokens shared across a call
//! - **Logging**: tracing targets and span names
//!
//! # Example
//!
//! ```no_run
//! use horizon_relay_core::{AsyncRuntime, AsyncRuntimeConfig, CancellationToken};
//!
//! let runtime = AsyncRuntime::new(AsyncRuntimeConfig::single_threaded())?;
//! let token = CancellationToken::new();
//! let waiter = token.clone();
//!
//! let task = runtime.dispatcher().dispatch(Box::pin(async move {
//!     waiter.cancelled().await;
//! }));
//!
//! token.cancel();
//! runtime.block_on(task);
//! # Ok::<(), horizon_relay_core::AsyncRuntimeError>(())
//! ```

pub mod async_runtime;
pub mod cancel;
pub mod dispatcher;
pub mod error;
pub mod logging;

pub use async_runtime::{AsyncRuntime, AsyncRuntimeConfig, RuntimeType};
pub use cancel::CancellationToken;
pub use dispatcher::{DispatchedTask, Dispatcher};
pub use error::AsyncRuntimeError;
