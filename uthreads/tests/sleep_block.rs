//! A sleeping thread that is also blocked stays out of the ready queue
//! until an explicit `resume`, even after its sleep counter reaches zero.
//! Own process/test binary for the same reason as `round_robin.rs`.

use std::sync::atomic::{AtomicBool, Ordering};

use uthreads::ThreadId;

static WOKE: AtomicBool = AtomicBool::new(false);
static BLOCK_ISSUED: AtomicBool = AtomicBool::new(false);

extern "C" fn sleeper() {
    uthreads::sleep(3).expect("thread 1 may sleep");
    WOKE.store(true, Ordering::SeqCst);
    loop {
        std::hint::spin_loop();
    }
}

extern "C" fn blocker() {
    // Give thread 1 a chance to reach its own first quantum and call
    // sleep() before we block it.
    while uthreads::get_total_quantums() < 2 {
        std::hint::spin_loop();
    }
    uthreads::block(ThreadId(1)).expect("thread 1 exists and isn't thread 0");
    BLOCK_ISSUED.store(true, Ordering::SeqCst);
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn blocked_sleeper_only_wakes_on_explicit_resume() {
    let _ = env_logger::try_init();
    uthreads::init(200_000).expect("quantum_usecs is positive");

    let sleeper_id = uthreads::spawn(sleeper).expect("thread table has room");
    uthreads::spawn(blocker).expect("thread table has room");

    while !BLOCK_ISSUED.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }

    // Let plenty more quanta elapse, certainly enough for the sleep
    // counter (started at 3 + 1) to have ticked down to zero, while
    // thread 1 is BLOCKED. It must not wake itself.
    let baseline = uthreads::get_total_quantums();
    while uthreads::get_total_quantums() < baseline + 8 {
        std::hint::spin_loop();
    }
    assert!(!WOKE.load(Ordering::SeqCst), "a blocked sleeper must not self-wake");
    assert!(uthreads::blocked_thread_ids().contains(&sleeper_id));

    uthreads::resume(sleeper_id).expect("thread 1 exists");

    while !WOKE.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }
    assert!(!uthreads::blocked_thread_ids().contains(&sleeper_id));
}
