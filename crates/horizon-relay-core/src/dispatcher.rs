//! Execution contexts.
//!
//! A [`Dispatcher`] decides where a unit of async work runs:
//!
//! - [`Dispatcher::Inline`]: the work is driven by whoever polls the returned
//!   [`DispatchedTask`], on the caller's own context.
//! - [`Dispatcher::Runtime`]: the work is spawned onto a Tokio runtime and runs
//!   concurrently with the caller.
//!
//! Both kinds hand back a [`DispatchedTask`], so code that consumes the work
//! does not need to know which context it landed on.
//!
//! # Example
//!
//! ```no_run
//! use horizon_relay_core::{AsyncRuntime, AsyncRuntimeConfig, Dispatcher};
//!
//! let runtime = AsyncRuntime::new(AsyncRuntimeConfig::multi_threaded()).unwrap();
//! let network = runtime.dispatcher();
//!
//! let task = network.dispatch(Box::pin(async {
//!     // network work here
//! }));
//! runtime.block_on(task);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::logging::targets;

/// Where dispatched work runs.
#[derive(Clone, Default)]
pub enum Dispatcher {
    /// Run on the context that polls the task.
    #[default]
    Inline,
    /// Spawn onto a Tokio runtime.
    Runtime(Handle),
}

impl Dispatcher {
    /// A dispatcher that runs work on the polling context.
    pub fn inline() -> Self {
        Self::Inline
    }

    /// A dispatcher that spawns work onto the given runtime.
    pub fn runtime(handle: Handle) -> Self {
        Self::Runtime(handle)
    }

    /// A dispatcher for the runtime of the calling thread, if there is one.
    ///
    /// Falls back to [`Dispatcher::Inline`] outside of a Tokio runtime.
    pub fn current() -> Self {
        Handle::try_current()
            .map(Self::Runtime)
            .unwrap_or(Self::Inline)
    }

    /// Check if this dispatcher runs work inline.
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline)
    }

    /// Hand a unit of work to this dispatcher.
    ///
    /// Inline work does not start until the returned task is polled. Spawned
    /// work starts immediately and is aborted if the task is dropped before
    /// it finishes.
    pub fn dispatch(&self, future: BoxFuture<'static, ()>) -> DispatchedTask {
        let state = match self {
            Self::Inline => TaskState::Inline(future),
            Self::Runtime(handle) => TaskState::Spawned(handle.spawn(future)),
        };
        DispatchedTask { state }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "Dispatcher::Inline"),
            Self::Runtime(handle) => {
                write!(f, "Dispatcher::Runtime({:?})", handle.runtime_flavor())
            }
        }
    }
}

enum TaskState {
    Inline(BoxFuture<'static, ()>),
    Spawned(JoinHandle<()>),
    Done,
}

/// Work handed to a [`Dispatcher`].
///
/// Awaiting (or [`poll_drive`](Self::poll_drive)-ing) the task resolves when
/// the work has finished. Dropping an unfinished task cancels the work.
pub struct DispatchedTask {
    state: TaskState,
}

impl DispatchedTask {
    /// Drive the work forward.
    ///
    /// For inline work this polls the future itself; for spawned work it only
    /// observes completion.
    pub fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match &mut self.state {
            TaskState::Inline(future) => match future.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    self.state = TaskState::Done;
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            },
            TaskState::Spawned(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(result) => {
                    if let Err(err) = result {
                        if err.is_panic() {
                            tracing::error!(target: targets::RUNTIME, "Dispatched task panicked: {}", err);
                        } else {
                            tracing::debug!(target: targets::RUNTIME, "Dispatched task was aborted");
                        }
                    }
                    self.state = TaskState::Done;
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            },
            TaskState::Done => Poll::Ready(()),
        }
    }

    /// Check if the work has finished.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            TaskState::Inline(_) => false,
            TaskState::Spawned(handle) => handle.is_finished(),
            TaskState::Done => true,
        }
    }

    /// Stop the work without waiting for it.
    pub fn abort(&mut self) {
        match std::mem::replace(&mut self.state, TaskState::Done) {
            TaskState::Spawned(handle) => handle.abort(),
            TaskState::Inline(_) | TaskState::Done => {}
        }
    }
}

impl Future for DispatchedTask {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.get_mut().poll_drive(cx)
    }
}

impl Drop for DispatchedTask {
    fn drop(&mut self) {
        if let TaskState::Spawned(handle) = &self.state {
            handle.abort();
        }
    }
}

impl fmt::Debug for DispatchedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            TaskState::Inline(_) => "inline",
            TaskState::Spawned(_) => "spawned",
            TaskState::Done => "done",
        };
        f.debug_struct("DispatchedTask").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_inline_work_waits_for_poll() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let task = Dispatcher::inline().dispatch(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ran.load(Ordering::SeqCst));

        task.await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_runtime_work_starts_without_poll() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let task = Dispatcher::current().dispatch(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_dropping_spawned_task_aborts_it() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let task = Dispatcher::current().dispatch(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        drop(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_current_outside_runtime_is_inline() {
        assert!(Dispatcher::current().is_inline());
    }
}
