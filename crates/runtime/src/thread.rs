//! Thread groups, the stop-the-world rendezvous, and the thread-facing
//! synchronisation values.
//!
//! All threads spawned from one runtime share a *group*: the GC heap,
//! the global variable table, the class registry, the intern tables and
//! the tag tables. Per-thread interpreter state (stacks, frames, PRNG)
//! is never shared.
//!
//! ## GC coordination
//!
//! Collection is stop-the-world. The initiating thread flags a request;
//! every other mutator notices it at a safepoint (call entry, loop
//! opcodes, channel/condvar waits), publishes its root values into its
//! thread handle, and parks on the group condvar. Once all peers are
//! parked the initiator marks from every root source, sweeps, raises
//! the limit, clears the request and broadcasts resume. Mutators hold
//! the group lock only briefly at park and at thread start/stop.
//!
//! Blocking operations (channel receive, condvar wait, join, mutex
//! lock) wait in bounded slices and re-check the park request between
//! slices, so a blocked thread cannot hold up a collection.

use crate::channel::ChanState;
use crate::class::{ClassRegistry, FinalizeNames};
use crate::heap::{Heap, PendingFinalizer};
use crate::tags::{TagId, TagTable};
use crate::value::Value;
use quill_core::intern::{InternId, InternSet};
use quill_core::span::SrcMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

/// Wait-slice length for parkable blocking operations.
pub const WAIT_SLICE: Duration = Duration::from_millis(2);

/// Member names the runtime consults on hot paths, interned once at
/// group creation.
#[derive(Debug, Clone, Copy)]
pub struct Names {
    pub init: InternId,
    pub free: InternId,
    pub next: InternId,
    pub iter: InternId,
    pub str_: InternId,
    pub json: InternId,
    pub eq: InternId,
    pub cmp: InternId,
    pub add: InternId,
    pub sub: InternId,
    pub mul: InternId,
    pub div: InternId,
    pub modulo: InternId,
    pub neg: InternId,
    pub len: InternId,
    pub contains: InternId,
    pub subscript: InternId,
    pub missing: InternId,
    pub drop_: InternId,
    pub call: InternId,
    pub fmt: InternId,
    pub message: InternId,
}

impl Names {
    fn intern(set: &mut InternSet) -> Names {
        Names {
            init: set.intern("init"),
            free: set.intern("__free__"),
            next: set.intern("__next__"),
            iter: set.intern("__iter__"),
            str_: set.intern("__str__"),
            json: set.intern("__json__"),
            eq: set.intern("__eq__"),
            cmp: set.intern("__cmp__"),
            add: set.intern("__add__"),
            sub: set.intern("__sub__"),
            mul: set.intern("__mul__"),
            div: set.intern("__div__"),
            modulo: set.intern("__mod__"),
            neg: set.intern("__neg__"),
            len: set.intern("__len__"),
            contains: set.intern("__contains__"),
            subscript: set.intern("__subscript__"),
            missing: set.intern("__missing__"),
            drop_: set.intern("__drop__"),
            call: set.intern("__call__"),
            fmt: set.intern("__fmt__"),
            message: set.intern("message"),
        }
    }

    pub fn finalize_names(&self) -> FinalizeNames {
        FinalizeNames { init: self.init, free: self.free }
    }
}

/// Builtin tags installed at group creation: the error kinds of the
/// language plus the range constructors.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTags {
    pub match_error: TagId,
    pub type_error: TagId,
    pub value_error: TagId,
    pub runtime_error: TagId,
    pub assertion_error: TagId,
    pub timeout_error: TagId,
    pub canceled_error: TagId,
    pub range_excl: TagId,
    pub range_incl: TagId,
    pub closed: TagId,
}

impl ErrorTags {
    fn define(tags: &mut TagTable) -> ErrorTags {
        ErrorTags {
            match_error: tags.define("MatchError"),
            type_error: tags.define("TypeError"),
            value_error: tags.define("ValueError"),
            runtime_error: tags.define("RuntimeError"),
            assertion_error: tags.define("AssertionError"),
            timeout_error: tags.define("TimeoutError"),
            canceled_error: tags.define("CanceledError"),
            range_excl: tags.define("Range"),
            range_incl: tags.define("InclusiveRange"),
            closed: tags.define("Closed"),
        }
    }
}

#[derive(Debug, Default)]
struct GcState {
    collecting: bool,
    parked: usize,
}

#[derive(Debug, Default)]
struct GcCoordinator {
    state: Mutex<GcState>,
    parked_cv: Condvar,
    resume_cv: Condvar,
    requested: AtomicBool,
}

#[derive(Debug, Default)]
struct ThreadDone {
    done: bool,
    /// Ok(return value) or Err(uncaught thrown value).
    result: Option<Result<Value, Value>>,
}

/// Shared handle for one interpreter thread.
#[derive(Debug)]
pub struct ThreadHandle {
    pub id: u64,
    /// Roots published at park time, marked by the collector.
    roots: Mutex<Vec<Value>>,
    state: Mutex<ThreadDone>,
    done_cv: Condvar,
    pub cancel: AtomicBool,
    pub alive: AtomicBool,
}

impl ThreadHandle {
    fn new(id: u64) -> Arc<ThreadHandle> {
        Arc::new(ThreadHandle {
            id,
            roots: Mutex::new(Vec::new()),
            state: Mutex::new(ThreadDone::default()),
            done_cv: Condvar::new(),
            cancel: AtomicBool::new(false),
            alive: AtomicBool::new(true),
        })
    }

    pub fn finish(&self, result: Result<Value, Value>) {
        let mut st = self.state.lock().expect("thread state poisoned");
        st.done = true;
        st.result = Some(result);
        self.alive.store(false, Ordering::Release);
        self.done_cv.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().expect("thread state poisoned").done
    }

    /// Wait one bounded slice for completion; the VM loops with
    /// safepoint checks in between.
    pub fn wait_done_slice(&self) -> Option<Result<Value, Value>> {
        let st = self.state.lock().expect("thread state poisoned");
        if st.done {
            return st.result.clone();
        }
        let (st, _) = self
            .done_cv
            .wait_timeout(st, WAIT_SLICE)
            .expect("thread state poisoned");
        if st.done { st.result.clone() } else { None }
    }

    fn result_values(&self) -> Vec<Value> {
        match &self.state.lock().expect("thread state poisoned").result {
            Some(Ok(v)) | Some(Err(v)) => vec![v.clone()],
            None => Vec::new(),
        }
    }
}

/// The shared state of one runtime: heap, globals, registries, and the
/// GC rendezvous. Every public entry point receives this context
/// explicitly; there is no process-global state.
pub struct ThreadGroup {
    pub heap: Mutex<Heap>,
    pub globals: Mutex<Vec<Value>>,
    pub classes: Mutex<ClassRegistry>,
    pub members: Mutex<InternSet>,
    pub operators: Mutex<InternSet>,
    pub tags: Mutex<TagTable>,
    pub srcs: Mutex<SrcMap>,
    pub names: Names,
    pub error_tags: ErrorTags,
    gc: GcCoordinator,
    threads: Mutex<Vec<Arc<ThreadHandle>>>,
    channels: Mutex<Vec<Weak<ChanState>>>,
    mutators: AtomicUsize,
    next_thread_id: AtomicU64,
}

impl Default for ThreadGroup {
    fn default() -> Self {
        Self::build()
    }
}

impl ThreadGroup {
    fn build() -> ThreadGroup {
        let mut members = InternSet::new();
        let names = Names::intern(&mut members);
        let classes = ClassRegistry::new(&mut members);
        let mut tags = TagTable::new();
        let error_tags = ErrorTags::define(&mut tags);
        ThreadGroup {
            heap: Mutex::new(Heap::new()),
            globals: Mutex::new(Vec::new()),
            classes: Mutex::new(classes),
            members: Mutex::new(members),
            operators: Mutex::new(InternSet::new()),
            tags: Mutex::new(tags),
            srcs: Mutex::new(SrcMap::new()),
            names,
            error_tags,
            gc: GcCoordinator::default(),
            threads: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            mutators: AtomicUsize::new(0),
            next_thread_id: AtomicU64::new(1),
        }
    }

    pub fn new() -> Arc<ThreadGroup> {
        Arc::new(Self::build())
    }

    pub fn intern_member(&self, name: &str) -> InternId {
        self.members.lock().expect("intern table poisoned").intern(name)
    }

    pub fn member_name(&self, id: InternId) -> String {
        self.members
            .lock()
            .expect("intern table poisoned")
            .name(id)
            .to_string()
    }

    /// Reserve a global slot. Slots are assigned by the compiler and
    /// grow the table on first reference.
    pub fn ensure_global(&self, slot: usize) {
        let mut globals = self.globals.lock().expect("globals poisoned");
        if globals.len() <= slot {
            globals.resize(slot + 1, Value::uninit());
        }
    }

    pub fn register_channel(&self, ch: &Arc<ChanState>) {
        let mut channels = self.channels.lock().expect("channel registry poisoned");
        channels.retain(|w| w.strong_count() > 0);
        channels.push(Arc::downgrade(ch));
    }

    // -- thread lifecycle ---------------------------------------------------

    pub fn register_thread(&self) -> Arc<ThreadHandle> {
        let h = ThreadHandle::new(self.next_thread_id.fetch_add(1, Ordering::Relaxed));
        self.threads.lock().expect("thread registry poisoned").push(Arc::clone(&h));
        self.mutators.fetch_add(1, Ordering::AcqRel);
        h
    }

    pub fn unregister_thread(&self, h: &ThreadHandle) {
        h.alive.store(false, Ordering::Release);
        self.mutators.fetch_sub(1, Ordering::AcqRel);
        // A departing thread may be the last straggler an initiator is
        // waiting for.
        self.gc.parked_cv.notify_all();
        let mut threads = self.threads.lock().expect("thread registry poisoned");
        threads.retain(|t| t.id != h.id);
    }

    pub fn live_thread_handles(&self) -> Vec<Arc<ThreadHandle>> {
        self.threads.lock().expect("thread registry poisoned").clone()
    }

    // -- safepoints and collection ------------------------------------------

    /// True when some thread has requested a collection.
    pub fn gc_requested(&self) -> bool {
        self.gc.requested.load(Ordering::Acquire)
    }

    /// Park at a safepoint if a collection is pending. `roots` is
    /// invoked once to publish this thread's root values.
    pub fn park_if_requested(&self, handle: &ThreadHandle, roots: impl FnOnce() -> Vec<Value>) {
        if !self.gc_requested() {
            return;
        }
        let mut st = self.gc.state.lock().expect("gc state poisoned");
        if !st.collecting {
            return;
        }
        *handle.roots.lock().expect("thread roots poisoned") = roots();
        st.parked += 1;
        self.gc.parked_cv.notify_all();
        while st.collecting {
            st = self.gc.resume_cv.wait(st).expect("gc state poisoned");
        }
        st.parked -= 1;
        handle.roots.lock().expect("thread roots poisoned").clear();
    }

    /// Try to become the collection initiator. On failure a collection
    /// is already pending and the caller should park instead.
    pub fn try_begin_collect(&self) -> bool {
        if self
            .gc
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let mut st = self.gc.state.lock().expect("gc state poisoned");
        st.collecting = true;
        true
    }

    /// Run a full collection from the initiating thread. `my_roots` are
    /// the initiator's own roots. Returns the finalizers to run (with
    /// GC re-entry off) after the world resumes.
    pub fn collect_as_initiator(&self, my_roots: &[Value]) -> Vec<PendingFinalizer> {
        // Phase a: rendezvous. Everyone but us must park (or exit).
        {
            let mut st = self.gc.state.lock().expect("gc state poisoned");
            loop {
                let others = self.mutators.load(Ordering::Acquire).saturating_sub(1);
                if st.parked >= others {
                    break;
                }
                let (g, _) = self
                    .gc
                    .parked_cv
                    .wait_timeout(st, WAIT_SLICE)
                    .expect("gc state poisoned");
                st = g;
            }
        }

        // Phase b: mark from every root source.
        let mut heap = self.heap.lock().expect("heap poisoned");
        heap.mark_values(my_roots.iter());
        heap.mark_own_roots();
        for handle in self.live_thread_handles() {
            let roots = handle.roots.lock().expect("thread roots poisoned");
            let cloned: Vec<Value> = roots.clone();
            drop(roots);
            heap.mark_values(cloned.iter());
            heap.mark_values(handle.result_values().iter());
        }
        {
            let globals = self.globals.lock().expect("globals poisoned");
            heap.mark_values(globals.iter());
        }
        {
            let classes = self.classes.lock().expect("class registry poisoned");
            let statics: Vec<Value> = classes.root_values().cloned().collect();
            drop(classes);
            heap.mark_values(statics.iter());
        }
        {
            let mut channels = self.channels.lock().expect("channel registry poisoned");
            channels.retain(|w| w.strong_count() > 0);
            let queued: Vec<Value> = channels
                .iter()
                .filter_map(|w| w.upgrade())
                .flat_map(|ch| ch.queued_values())
                .collect();
            heap.mark_values(queued.iter());
        }

        // Phase c: sweep; dead finalizable objects are handed back.
        let pending = {
            let reg = self.classes.lock().expect("class registry poisoned");
            let (_, pending) = heap.sweep(|c| reg.finalizer(c));
            pending
        };
        heap.rescale_limit();
        drop(heap);

        // Phase d: resume the world.
        let mut st = self.gc.state.lock().expect("gc state poisoned");
        st.collecting = false;
        self.gc.requested.store(false, Ordering::Release);
        self.gc.resume_cv.notify_all();
        drop(st);

        pending
    }
}

// ---------------------------------------------------------------------------
// Mutex and condition-variable values

/// An owning handle to a language-level mutex. Lock waits are sliced so
/// a blocked locker still parks for GC.
#[derive(Debug, Default)]
pub struct MutexHandle {
    locked: Mutex<bool>,
    cv: Condvar,
}

impl MutexHandle {
    pub fn new() -> Self {
        MutexHandle::default()
    }

    /// Acquire if free. Returns false if held.
    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Wait one bounded slice for the mutex. Returns true on acquire.
    pub fn lock_slice(&self) -> bool {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        if !*locked {
            *locked = true;
            return true;
        }
        let (mut locked, _) = self
            .cv
            .wait_timeout(locked, WAIT_SLICE)
            .expect("mutex poisoned");
        if !*locked {
            *locked = true;
            true
        } else {
            false
        }
    }

    /// Release. Errors if the mutex was not held.
    pub fn unlock(&self) -> Result<(), ()> {
        let mut locked = self.locked.lock().expect("mutex poisoned");
        if !*locked {
            return Err(());
        }
        *locked = false;
        self.cv.notify_one();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CondSignals {
    signals: u64,
    broadcast_gen: u64,
}

/// A language-level condition variable with POSIX ordering: `signal`
/// wakes one waiter, `broadcast` wakes all. Spurious wakeups are
/// permitted, as in POSIX.
#[derive(Debug, Default)]
pub struct CondVarHandle {
    state: Mutex<CondSignals>,
    cv: Condvar,
}

impl CondVarHandle {
    pub fn new() -> Self {
        CondVarHandle::default()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().expect("condvar poisoned").broadcast_gen
    }

    /// Wait one bounded slice. Returns true if signaled or broadcast
    /// since `gen`.
    pub fn wait_slice(&self, gen: u64) -> bool {
        let mut st = self.state.lock().expect("condvar poisoned");
        if st.signals > 0 {
            st.signals -= 1;
            return true;
        }
        if st.broadcast_gen != gen {
            return true;
        }
        let (mut st, _) = self
            .cv
            .wait_timeout(st, WAIT_SLICE)
            .expect("condvar poisoned");
        if st.signals > 0 {
            st.signals -= 1;
            true
        } else {
            st.broadcast_gen != gen
        }
    }

    pub fn signal(&self) {
        let mut st = self.state.lock().expect("condvar poisoned");
        st.signals += 1;
        self.cv.notify_all();
    }

    pub fn broadcast(&self) {
        let mut st = self.state.lock().expect("condvar poisoned");
        st.broadcast_gen += 1;
        self.cv.notify_all();
    }
}
