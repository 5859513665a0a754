//! Single-threaded cooperative executor
//!
//! [`QueueExecutor`] is a plain FIFO of ready tasks. Nothing runs until the
//! owner pumps it with [`QueueExecutor::run_once`] or
//! [`QueueExecutor::run_until_stalled`], typically from `Handler::update` so
//! that async code advances once per frame.
//!
//! Tasks need not be `Send`, but their wakers are: a quit signal fired on
//! another thread re-queues the waiting task, which then resumes on the
//! executor's thread at the next pump.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

type TaskId = u64;
type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

#[derive(Default)]
struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
    signal: Condvar,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        self.ids.lock().push_back(id);
        self.signal.notify_one();
    }

    fn pop(&self) -> Option<TaskId> {
        self.ids.lock().pop_front()
    }

    fn wait_nonempty(&self) {
        let mut ids = self.ids.lock();
        while ids.is_empty() {
            self.signal.wait(&mut ids);
        }
    }
}

struct TaskWaker {
    id: TaskId,
    queued: AtomicBool,
    ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.ready.push(self.id);
        }
    }
}

struct TaskSlot {
    future: LocalTask,
    waker: Arc<TaskWaker>,
}

/// Handle to a spawned task's output.
pub struct TaskHandle<T> {
    output: Rc<RefCell<Option<T>>>,
    finished: Rc<Cell<bool>>,
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Take the output of a finished task. Returns `None` while the task is
    /// still pending or if the output was already taken.
    pub fn take_output(&self) -> Option<T> {
        self.output.borrow_mut().take()
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.finished.get())
            .finish()
    }
}

/// FIFO executor for `!Send` futures, pumped by its owner.
pub struct QueueExecutor {
    ready: Arc<ReadyQueue>,
    tasks: RefCell<HashMap<TaskId, TaskSlot>>,
    next_id: Cell<TaskId>,
    ticks: Cell<u64>,
}

impl Default for QueueExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueExecutor")
            .field("pending", &self.pending())
            .field("ticks", &self.ticks.get())
            .finish()
    }
}

impl QueueExecutor {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(ReadyQueue::default()),
            tasks: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            ticks: Cell::new(0),
        }
    }

    /// Queue a future. It is first polled by the next pump, not here.
    pub fn spawn<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let finished = Rc::new(Cell::new(false));
        let handle = TaskHandle {
            output: output.clone(),
            finished: finished.clone(),
        };

        let task = async move {
            let value = future.await;
            *output.borrow_mut() = Some(value);
            finished.set(true);
        };

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let waker = Arc::new(TaskWaker {
            id,
            queued: AtomicBool::new(true),
            ready: self.ready.clone(),
        });
        self.tasks.borrow_mut().insert(
            id,
            TaskSlot {
                future: Box::pin(task),
                waker,
            },
        );
        self.ready.push(id);
        trace!(task = id, "task spawned");
        handle
    }

    /// Poll the next ready task. Returns `false` if nothing was ready.
    pub fn run_once(&self) -> bool {
        let Some(id) = self.ready.pop() else {
            return false;
        };

        // The slot leaves the map while polling so the task may spawn.
        let Some(mut slot) = self.tasks.borrow_mut().remove(&id) else {
            // Woken after it completed.
            return true;
        };
        slot.waker.queued.store(false, Ordering::Release);
        self.ticks.set(self.ticks.get() + 1);

        let waker = Waker::from(slot.waker.clone());
        let mut cx = Context::from_waker(&waker);
        match slot.future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => trace!(task = id, "task finished"),
            Poll::Pending => {
                self.tasks.borrow_mut().insert(id, slot);
            }
        }
        true
    }

    /// Pump until no task is ready. Returns the number of polls.
    pub fn run_until_stalled(&self) -> usize {
        let mut polled = 0;
        while self.run_once() {
            polled += 1;
        }
        polled
    }

    /// Run `future` to completion, pumping every other task meanwhile.
    ///
    /// Parks the thread while nothing is ready; another thread must
    /// eventually wake one of the tasks or this never returns.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
    {
        let handle = self.spawn(future);
        loop {
            self.run_until_stalled();
            if let Some(output) = handle.take_output() {
                return output;
            }
            self.ready.wait_nonempty();
        }
    }

    /// No live task is left
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Number of live tasks, ready or suspended
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Total number of polls performed
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_spawn_order() {
        let executor = QueueExecutor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = log.clone();
            executor.spawn(async move { log.borrow_mut().push(n) });
        }
        assert_eq!(executor.pending(), 3);
        assert!(log.borrow().is_empty());

        assert_eq!(executor.run_until_stalled(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(executor.is_empty());
        assert!(!executor.run_once());
    }

    #[test]
    fn task_may_spawn_while_polled() {
        let executor = Rc::new(QueueExecutor::new());
        let inner = executor.clone();
        let outer = executor.spawn(async move { inner.spawn(async { 5 }) });

        executor.run_once();
        let nested = outer.take_output().unwrap();
        assert!(!nested.is_finished());
        executor.run_once();
        assert_eq!(nested.take_output(), Some(5));
    }

    #[test]
    fn block_on_returns_output() {
        let executor = QueueExecutor::new();
        assert_eq!(executor.block_on(async { 40 + 2 }), 42);
        assert_eq!(executor.ticks(), 1);
    }
}
