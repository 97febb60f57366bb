use std::io;

use thiserror::Error;

/// Returned when a [`UniqueFunction`] or a [`FunctionRef`] is called while it holds no callable.
///
/// Check [`has_value`] first to avoid it.
///
/// [`UniqueFunction`]: struct.UniqueFunction.html
/// [`FunctionRef`]: struct.FunctionRef.html
/// [`has_value`]: struct.UniqueFunction.html#method.has_value
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("attempted to call an empty function object")]
pub struct InvalidCall;

/// Errors reported by the [`ThreadPool`].
///
/// [`ThreadPool`]: struct.ThreadPool.html
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was stopped and accepts no new tasks until restarted.
    #[error("thread pool is stopped")]
    Stopped,

    /// The task panicked, or the pool was dropped before it ran.
    #[error("task finished without producing a result")]
    TaskLost,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}
