//! The quantum clock: a real POSIX virtual-time interval timer delivering
//! `SIGVTALRM`. Virtual time only advances while this process is actually
//! scheduled on a CPU, which is what makes quanta measure the library's own
//! threads rather than wall-clock jitter from the rest of the system.

/// Install `timer_handler` as the `SIGVTALRM` action. Called once, from
/// `init`, while signals are already blocked.
pub(crate) fn install_handler(handler: extern "C" fn(libc::c_int)) -> Result<(), ()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGVTALRM, &action, std::ptr::null_mut()) != 0 {
            return Err(());
        }
    }
    Ok(())
}

/// (Re)arm the timer to fire once, `quantum_usecs` from now. Called both at
/// `init` and at every quantum boundary, matching the original's
/// `timer_sleep_check` rearming the interval on each dispatch rather than
/// relying on `it_interval` to free-run (so a thread that starts mid-quantum
/// via `resume` still gets a full quantum).
pub(crate) fn arm(quantum_usecs: i32) -> Result<(), ()> {
    let interval = libc::timeval {
        tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
        tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
        it_value: interval,
    };
    unsafe {
        if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) != 0 {
            return Err(());
        }
    }
    Ok(())
}
