//! Host tick scheduling.
//!
//! The host drives everything from a fixed-rate tick loop; there are no
//! threads. Deferred renders and spawned futures both run on that loop.

use std::cell::{Cell, RefCell};

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

pub type Task = Box<dyn FnOnce()>;

pub trait TickScheduler {
    /// Runs `task` after `delay_ticks` ticks. Must not run it synchronously.
    fn run_deferred(&self, task: Task, delay_ticks: u32) -> TaskHandle;
    /// Cancels a task that has not run yet; unknown handles are ignored.
    fn cancel(&self, handle: TaskHandle);
    fn run_next_tick(&self, task: Task);
    /// Drives `fut` cooperatively on the host loop.
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>);
    fn current_tick(&self) -> u64;
}

struct Queued {
    due: u64,
    handle: TaskHandle,
    task: Task,
}

/// Deterministic scheduler that only moves when told to. Used by tests and
/// by hosts that pump ticks themselves.
pub struct ManualTicks {
    tick: Cell<u64>,
    next_handle: Cell<u64>,
    queue: RefCell<Vec<Queued>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Default for ManualTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTicks {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            tick: Cell::new(0),
            next_handle: Cell::new(1),
            queue: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// Number of deferred tasks still queued.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Polls spawned futures until none can make progress.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Advances `ticks` ticks, running due tasks in scheduling order and
    /// settling spawned futures after each tick.
    pub fn advance(&self, ticks: u64) {
        self.run_until_stalled();
        for _ in 0..ticks {
            let now = self.tick.get() + 1;
            self.tick.set(now);

            let due: Vec<Queued> = {
                let mut queue = self.queue.borrow_mut();
                let (due, rest): (Vec<_>, Vec<_>) = queue.drain(..).partition(|q| q.due <= now);
                *queue = rest;
                due
            };
            let mut due = due;
            due.sort_by_key(|q| q.handle);
            for q in due {
                log::trace!("tick {now}: running task {:?}", q.handle);
                (q.task)();
            }
            self.run_until_stalled();
        }
    }
}

impl TickScheduler for ManualTicks {
    fn run_deferred(&self, task: Task, delay_ticks: u32) -> TaskHandle {
        let handle = TaskHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.queue.borrow_mut().push(Queued {
            due: self.tick.get() + delay_ticks.max(1) as u64,
            handle,
            task,
        });
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        self.queue.borrow_mut().retain(|q| q.handle != handle);
    }

    fn run_next_tick(&self, task: Task) {
        self.run_deferred(task, 1);
    }

    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(fut) {
            log::error!("failed to spawn task: {e}");
        }
    }

    fn current_tick(&self) -> u64 {
        self.tick.get()
    }
}
