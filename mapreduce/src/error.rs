use thiserror::Error;

/// User errors: returned to the caller, library state unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("a job needs at least one worker")]
    NoWorkers,
}

/// Log a platform error and exit the process. Thread create/join/lock
/// failures have no sensible `Result::Err` to hand back to arbitrary
/// worker-thread call sites, so we go down loudly instead, per spec.
pub(crate) fn fatal_platform(msg: &str) -> ! {
    log::error!("mapreduce: fatal: {msg}");
    std::process::exit(1);
}
