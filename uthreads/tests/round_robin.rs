//! Round-robin fairness end to end. Runs under a real `SIGVTALRM`, so this
//! file is its own test binary (one process, one `init()` call) rather
//! than sharing a process with other scenarios, since the library's
//! global state is a process-wide singleton by design.

use uthreads::ThreadId;

extern "C" fn spin_forever() {
    loop {
        std::hint::spin_loop();
    }
}

#[test]
fn three_quanta_round_robin_fairly() {
    let _ = env_logger::try_init();
    uthreads::init(200_000).expect("quantum_usecs is positive");

    let t1 = uthreads::spawn(spin_forever).expect("thread table has room");
    let t2 = uthreads::spawn(spin_forever).expect("thread table has room");
    assert_eq!(t1, ThreadId(1));
    assert_eq!(t2, ThreadId(2));

    // Three quantum boundaries after init's initial quantum: thread 1 runs
    // once, thread 2 runs once, then thread 0 (this thread) is dispatched
    // again. Busy-poll from the main thread itself, which is a round-robin
    // participant like any other.
    while uthreads::get_total_quantums() < 4 {
        std::hint::spin_loop();
    }

    assert_eq!(uthreads::get_quantums(ThreadId(0)).unwrap(), 2);
    assert_eq!(uthreads::get_quantums(t1).unwrap(), 1);
    assert_eq!(uthreads::get_quantums(t2).unwrap(), 1);
}
