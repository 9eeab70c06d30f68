use thiserror::Error;

/// User errors: `read`/`write` fail cleanly, state unchanged. These are
/// the only failure modes this core has; physical-layer operations are
/// assumed infallible, so there is no platform-error path here the way
/// there is in `uthreads` or `mapreduce`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("virtual address {0:#x} is out of range")]
    AddressOutOfRange(u64),
    #[error("translation produced an invalid physical address {0:#x}")]
    InvalidPhysicalAddress(u64),
}

/// Log and exit: reserved for invariant violations (a corrupted frame
/// tree), not for anything a caller can trigger through the public API.
pub(crate) fn fatal_invariant(msg: &str) -> ! {
    log::error!("vmtranslator: fatal: {msg}");
    std::process::exit(1);
}
