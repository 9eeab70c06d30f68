use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;

use crate::context::{self, Context};
use crate::error::Error;
use crate::thread::{State, Thread, ThreadId};
use crate::{timer, MAX_THREAD_NUM};

const NOT_INITIALIZED_MSG: &str = "uthreads: accessed internal state before init()";

pub(crate) struct Scheduler {
    threads: Vec<Option<Thread>>,
    ready: VecDeque<ThreadId>,
    sleeping: HashSet<ThreadId>,
    current: ThreadId,
    total_quantums: u64,
    quantum_usecs: i32,
}

lazy_static! {
    static ref STATE: Mutex<Option<Scheduler>> = Mutex::new(None);
}

fn lock_state() -> MutexGuard<'static, Option<Scheduler>> {
    STATE
        .lock()
        .unwrap_or_else(|_| fatal_platform("global scheduler mutex was poisoned"))
}

/// Log a platform error and exit the process. Per spec, platform failures
/// (a failed syscall, a corrupted internal invariant) are not recoverable
/// the way user errors are: there is no sensible `Result::Err` to return to
/// arbitrary call sites mid context-switch, so we go down loudly instead.
fn fatal_platform(msg: &str) -> ! {
    log::error!("uthreads: fatal: {msg}");
    std::process::exit(1);
}

unsafe fn block_signals() {
    let mut set: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut set);
    libc::sigaddset(&mut set, libc::SIGVTALRM);
    if libc::sigprocmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) != 0 {
        fatal_platform("sigprocmask(SIG_BLOCK) failed");
    }
}

unsafe fn unblock_signals() {
    let mut set: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut set);
    libc::sigaddset(&mut set, libc::SIGVTALRM);
    if libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut()) != 0 {
        fatal_platform("sigprocmask(SIG_UNBLOCK) failed");
    }
}

fn ctx_ptr_mut(state: &mut Scheduler, tid: ThreadId) -> *mut Context {
    &mut state.threads[tid.0].as_mut().unwrap().context as *mut Context
}

fn ctx_ptr(state: &Scheduler, tid: ThreadId) -> *const Context {
    &state.threads[tid.0].as_ref().unwrap().context as *const Context
}

/// Pop the next ready thread, make it `Running`, advance the global and
/// per-thread quantum counters, tick every sleeper, and rearm the timer.
/// Shared by every quantum boundary: a voluntary yield, a timer
/// preemption, and a self-termination all end here.
fn advance_quantum(state: &mut Scheduler) {
    let Some(next_id) = state.ready.pop_front() else {
        fatal_platform("ready queue is empty at a quantum boundary");
    };

    state.total_quantums += 1;
    {
        let next = state.threads[next_id.0].as_mut().unwrap();
        next.state = State::Running;
        next.quantum_counter += 1;
    }
    state.current = next_id;

    let mut woke = Vec::new();
    for &tid in &state.sleeping {
        let thread = state.threads[tid.0].as_mut().unwrap();
        if thread.sleep_counter > 0 {
            thread.sleep_counter -= 1;
        }
        if thread.sleep_counter == 0 && thread.state == State::SleepNotBlocked {
            woke.push(tid);
        }
    }
    for tid in woke {
        state.sleeping.remove(&tid);
        let thread = state.threads[tid.0].as_mut().unwrap();
        thread.state = State::Ready;
        state.ready.push_back(tid);
    }

    if timer::arm(state.quantum_usecs).is_err() {
        fatal_platform("setitimer failed while rearming the quantum timer");
    }
}

/// Record that the running thread is yielding (the caller has already
/// placed it into whichever queue/set reflects its new state), dispatch the
/// next ready thread, and switch the CPU onto it. Returns once this
/// function's own caller is redispatched.
fn yield_to_scheduler() {
    unsafe { block_signals() };
    let (old_ptr, new_ptr) = {
        let mut guard = lock_state();
        let state = guard.as_mut().expect(NOT_INITIALIZED_MSG);
        let outgoing = state.current;
        let old_ptr = ctx_ptr_mut(state, outgoing);
        advance_quantum(state);
        let new_ptr = ctx_ptr(state, state.current);
        (old_ptr, new_ptr)
    };
    unsafe {
        unblock_signals();
        context::switch_context(old_ptr, new_ptr);
    }
}

/// Tear down the running thread's slot and dispatch the next ready thread
/// without saving anything, since this stack is never coming back. Note
/// this frees the very stack the caller is currently executing on; no
/// further heap activity happens between the free and the final jump, so
/// the freed memory is never touched again or reused out from under us.
fn terminate_self_and_dispatch() -> ! {
    let new_ptr = {
        let mut guard = lock_state();
        let state = guard.as_mut().expect(NOT_INITIALIZED_MSG);
        let dying = state.current;
        state.threads[dying.0] = None;
        state.sleeping.remove(&dying);
        advance_quantum(state);
        ctx_ptr(state, state.current)
    };
    unsafe {
        unblock_signals();
        context::restore_context(new_ptr)
    }
}

extern "C" fn timer_handler(_sig: libc::c_int) {
    let mut guard = lock_state();
    let Some(state) = guard.as_mut() else {
        // The timer can't fire before init() finishes arming it, but a
        // defensive check costs nothing.
        return;
    };
    let outgoing = state.current;
    state.threads[outgoing.0].as_mut().unwrap().state = State::Ready;
    state.ready.push_back(outgoing);
    let old_ptr = ctx_ptr_mut(state, outgoing);
    advance_quantum(state);
    let new_ptr = ctx_ptr(state, state.current);
    drop(guard);
    unsafe {
        unblock_signals();
        context::switch_context(old_ptr, new_ptr);
    }
}

pub fn init(quantum_usecs: i32) -> Result<(), Error> {
    if quantum_usecs <= 0 {
        return Err(Error::NonPositiveQuantum);
    }

    let mut guard = lock_state();
    if guard.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    let mut threads = Vec::with_capacity(MAX_THREAD_NUM);
    threads.push(Some(Thread::main()));
    threads.resize_with(MAX_THREAD_NUM, || None);

    unsafe { block_signals() };

    if timer::install_handler(timer_handler).is_err() {
        unsafe { unblock_signals() };
        fatal_platform("sigaction(SIGVTALRM) failed");
    }
    if timer::arm(quantum_usecs).is_err() {
        unsafe { unblock_signals() };
        fatal_platform("setitimer failed during init");
    }

    *guard = Some(Scheduler {
        threads,
        ready: VecDeque::new(),
        sleeping: HashSet::new(),
        current: ThreadId(0),
        total_quantums: 1,
        quantum_usecs,
    });
    drop(guard);

    unsafe { unblock_signals() };
    log::info!("uthreads initialized, quantum_usecs={quantum_usecs}");
    Ok(())
}

fn spawn_inner(entry: extern "C" fn()) -> Result<ThreadId, Error> {
    let mut guard = lock_state();
    let state = guard.as_mut().ok_or(Error::NotInitialized)?;
    for i in 1..MAX_THREAD_NUM {
        if state.threads[i].is_none() {
            let id = ThreadId(i);
            state.threads[i] = Some(Thread::spawn(id, entry));
            state.ready.push_back(id);
            return Ok(id);
        }
    }
    Err(Error::ThreadTableFull(MAX_THREAD_NUM))
}

pub fn spawn(entry: extern "C" fn()) -> Result<ThreadId, Error> {
    unsafe { block_signals() };
    let result = spawn_inner(entry);
    unsafe { unblock_signals() };
    result
}

fn terminate_inner(tid: ThreadId) -> Result<bool, Error> {
    let mut guard = lock_state();
    let state = guard.as_mut().ok_or(Error::NotInitialized)?;
    if tid.0 >= MAX_THREAD_NUM || state.threads[tid.0].is_none() {
        return Err(Error::UnknownThread(tid));
    }
    if tid == state.current {
        return Ok(true);
    }
    let prior = state.threads[tid.0].as_ref().unwrap().state;
    if prior == State::Ready {
        state.ready.retain(|&x| x != tid);
    }
    state.sleeping.remove(&tid);
    state.threads[tid.0] = None;
    Ok(false)
}

pub fn terminate(tid: ThreadId) -> Result<(), Error> {
    unsafe { block_signals() };

    if tid == ThreadId(0) {
        log::info!("uthreads: main thread terminated, process exiting");
        std::process::exit(0);
    }

    match terminate_inner(tid) {
        Ok(true) => terminate_self_and_dispatch(),
        Ok(false) => {
            unsafe { unblock_signals() };
            Ok(())
        }
        Err(e) => {
            unsafe { unblock_signals() };
            Err(e)
        }
    }
}

fn block_inner(tid: ThreadId) -> Result<bool, Error> {
    let mut guard = lock_state();
    let state = guard.as_mut().ok_or(Error::NotInitialized)?;
    if tid == ThreadId(0) {
        return Err(Error::BlockMainThread);
    }
    if tid.0 >= MAX_THREAD_NUM || state.threads[tid.0].is_none() {
        return Err(Error::UnknownThread(tid));
    }
    let prior = state.threads[tid.0].as_ref().unwrap().state;
    if prior == State::Blocked {
        return Ok(false);
    }
    let self_blocking = tid == state.current;
    if !self_blocking && prior != State::SleepNotBlocked {
        state.ready.retain(|&x| x != tid);
    }
    state.threads[tid.0].as_mut().unwrap().state = State::Blocked;
    Ok(self_blocking)
}

pub fn block(tid: ThreadId) -> Result<(), Error> {
    unsafe { block_signals() };
    match block_inner(tid) {
        Ok(true) => {
            yield_to_scheduler();
            Ok(())
        }
        Ok(false) => {
            unsafe { unblock_signals() };
            Ok(())
        }
        Err(e) => {
            unsafe { unblock_signals() };
            Err(e)
        }
    }
}

fn resume_inner(tid: ThreadId) -> Result<(), Error> {
    let mut guard = lock_state();
    let state = guard.as_mut().ok_or(Error::NotInitialized)?;
    if tid.0 >= MAX_THREAD_NUM || state.threads[tid.0].is_none() {
        return Err(Error::UnknownThread(tid));
    }
    let thread = state.threads[tid.0].as_mut().unwrap();
    if thread.state != State::Blocked {
        return Ok(());
    }
    if thread.sleep_counter == 0 {
        thread.state = State::Ready;
        state.sleeping.remove(&tid);
        state.ready.push_back(tid);
    } else {
        thread.state = State::SleepNotBlocked;
    }
    Ok(())
}

pub fn resume(tid: ThreadId) -> Result<(), Error> {
    unsafe { block_signals() };
    let result = resume_inner(tid);
    unsafe { unblock_signals() };
    result
}

fn sleep_inner(num_quantums: u32) -> Result<(), Error> {
    let mut guard = lock_state();
    let state = guard.as_mut().ok_or(Error::NotInitialized)?;
    if num_quantums == 0 {
        return Err(Error::NonPositiveSleep);
    }
    if state.current == ThreadId(0) {
        return Err(Error::SleepMainThread);
    }
    let tid = state.current;
    state.sleeping.insert(tid);
    let thread = state.threads[tid.0].as_mut().unwrap();
    // The quantum in which sleep() is called doesn't count towards the
    // requested duration, so the counter is one higher than num_quantums.
    thread.sleep_counter = num_quantums + 1;
    thread.state = State::SleepNotBlocked;
    Ok(())
}

pub fn sleep(num_quantums: u32) -> Result<(), Error> {
    unsafe { block_signals() };
    match sleep_inner(num_quantums) {
        Ok(()) => {
            yield_to_scheduler();
            Ok(())
        }
        Err(e) => {
            unsafe { unblock_signals() };
            Err(e)
        }
    }
}

pub fn get_tid() -> ThreadId {
    unsafe { block_signals() };
    let result = lock_state().as_ref().map(|s| s.current).unwrap_or(ThreadId(0));
    unsafe { unblock_signals() };
    result
}

pub fn get_total_quantums() -> u64 {
    unsafe { block_signals() };
    let result = lock_state().as_ref().map(|s| s.total_quantums).unwrap_or(0);
    unsafe { unblock_signals() };
    result
}

pub fn get_quantums(tid: ThreadId) -> Result<u64, Error> {
    unsafe { block_signals() };
    let result = (|| {
        let guard = lock_state();
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;
        if tid.0 >= MAX_THREAD_NUM || state.threads[tid.0].is_none() {
            return Err(Error::UnknownThread(tid));
        }
        Ok(state.threads[tid.0].as_ref().unwrap().quantum_counter)
    })();
    // Unlike the original's get_quantums, every exit path restores the
    // mask, including the error path.
    unsafe { unblock_signals() };
    result
}

/// Diagnostic helper: threads whose `state` is `Blocked` right now. Derived
/// on demand from each thread's own state field rather than kept as a
/// separate membership list, so it can never drift out of sync with it.
pub fn blocked_thread_ids() -> Vec<ThreadId> {
    lock_state()
        .as_ref()
        .map(|s| {
            s.threads
                .iter()
                .flatten()
                .filter(|t| t.state == State::Blocked)
                .map(|t| t.id)
                .collect()
        })
        .unwrap_or_default()
}
