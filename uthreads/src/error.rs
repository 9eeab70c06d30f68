use thiserror::Error;

use crate::ThreadId;

/// User errors: the library's own state is left unchanged and the caller is
/// expected to handle these as part of normal control flow.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("uthreads::init has not been called yet")]
    NotInitialized,
    #[error("uthreads::init was already called once")]
    AlreadyInitialized,
    #[error("quantum_usecs must be positive")]
    NonPositiveQuantum,
    #[error("no more than {0} concurrent threads are supported")]
    ThreadTableFull(usize),
    #[error("thread {0:?} does not exist")]
    UnknownThread(ThreadId),
    #[error("the main thread (id 0) cannot be blocked")]
    BlockMainThread,
    #[error("the main thread (id 0) cannot sleep")]
    SleepMainThread,
    #[error("num_quantums must be positive")]
    NonPositiveSleep,
}
