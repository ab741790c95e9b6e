//! A minimal deterministic cooperative executor.
//!
//! The bus does not care which executor drives its futures, as long as every
//! task is polled on the same thread. This one exists so that the crate's
//! tests, examples, and small embedders have a scheduler with completely
//! predictable behavior: tasks are polled strictly in the order they were
//! spawned or woken, wakeups are idempotent until the task runs, and
//! [`Executor::run`] insists that every task actually finishes.
//!
//! Tasks are futures with no output; results leave a task through whatever
//! the future captured (typically an `Rc` shared with the caller).

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Wake, Waker},
};

/// Single-threaded run-to-completion executor with FIFO scheduling.
#[derive(Default)]
pub struct Executor {
    tasks: Vec<Option<Pin<Box<dyn Future<Output = ()>>>>>,
    ready: Arc<ReadyQueue>,
}

/// Queue of task indices due for a poll.
///
/// The mutex exists only to satisfy the `Wake` bounds; nothing ever contends
/// on it, since every waker clone lives on this thread.
#[derive(Default)]
struct ReadyQueue {
    indices: Mutex<VecDeque<usize>>,
}

impl ReadyQueue {
    fn push(&self, index: usize) {
        let mut indices = self.indices.lock().unwrap();
        // a wakeup is idempotent until the task runs
        if !indices.contains(&index) {
            indices.push_back(index);
        }
    }

    fn pop(&self) -> Option<usize> {
        self.indices.lock().unwrap().pop_front()
    }
}

struct TaskWaker {
    index: usize,
    ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.index);
    }
}

impl Executor {
    pub fn new() -> Self {
        Executor::default()
    }

    /// Add a task. It gets its first poll on the next run.
    pub fn spawn(&mut self, fut: impl Future<Output = ()> + 'static) {
        let index = self.tasks.len();
        self.tasks.push(Some(Box::pin(fut)));
        self.ready.push(index);
    }

    /// Poll woken tasks in wake order until none is ready.
    ///
    /// Returns with tasks still pending when every one of them is waiting on
    /// a wakeup; spawning more tasks or waking existing ones makes another
    /// call do more work.
    pub fn run_until_stalled(&mut self) {
        while let Some(index) = self.ready.pop() {
            let Some(task) = self.tasks[index].as_mut() else {
                // woken after completion; nothing left to poll
                continue;
            };
            let waker = Waker::from(Arc::new(TaskWaker {
                index,
                ready: Arc::clone(&self.ready),
            }));
            let mut cx = Context::from_waker(&waker);
            if let Poll::Ready(()) = task.as_mut().poll(&mut cx) {
                self.tasks[index] = None;
            }
        }
    }

    /// Run every task to completion.
    ///
    /// # Panics
    ///
    /// Panics if the tasks stall, that is, every remaining task is parked and
    /// no wakeup can come from within the task set. A stall means the program
    /// deadlocked.
    pub fn run(&mut self) {
        self.run_until_stalled();
        let stalled = self.tasks.iter().flatten().count();
        assert!(stalled == 0, "executor stalled with {stalled} tasks still pending");
    }

    /// Whether every spawned task has completed.
    pub fn is_idle(&self) -> bool {
        self.tasks.iter().all(Option::is_none)
    }
}
