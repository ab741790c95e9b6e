//! FIFO wait queues of parked task wakers.
//!
//! Each channel keeps two of these, one per direction. A parked operation
//! shares its node with the queue; the queue never owns task state, only the
//! waker last registered by a poll. Wakeups are hints: a woken task re-tests
//! its condition and may park again.

use smallvec::SmallVec;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    task::Waker,
};

/// Wakers collected under a borrow, to be invoked once the borrow is
/// released.
pub(crate) type WakerBatch = SmallVec<[Waker; 4]>;

/// One parked operation's entry in a wait queue.
pub(crate) struct WaiterNode {
    /// waker registered by the owning operation's latest poll, taken when the
    /// node is woken
    waker: RefCell<Option<Waker>>,
    /// set by `purge` when the channel closes under the waiter
    gone: Cell<bool>,
}

impl WaiterNode {
    pub(crate) fn set_waker(&self, waker: &Waker) {
        *self.waker.borrow_mut() = Some(waker.clone());
    }

    /// Whether the channel closed while this node was parked. A gone node is
    /// no longer linked anywhere.
    pub(crate) fn is_gone(&self) -> bool {
        self.gone.get()
    }
}

/// Ordered queue of waiters blocked on one condition.
#[derive(Default)]
pub(crate) struct WaitQueue {
    nodes: VecDeque<Rc<WaiterNode>>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        WaitQueue::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Park a new waiter at the tail. The returned node is shared with the
    /// queue until detached or purged.
    pub(crate) fn enqueue(&mut self, waker: &Waker) -> Rc<WaiterNode> {
        let node = Rc::new(WaiterNode {
            waker: RefCell::new(Some(waker.clone())),
            gone: Cell::new(false),
        });
        self.nodes.push_back(Rc::clone(&node));
        node
    }

    /// Whether `node` is the front waiter. Only the front waiter retries its
    /// operation; the ones behind it keep their place in line.
    pub(crate) fn is_front(&self, node: &Rc<WaiterNode>) -> bool {
        self.nodes.front().is_some_and(|front| Rc::ptr_eq(front, node))
    }

    /// Take the front waiter's waker, leaving the node linked. The waiter
    /// detaches itself once it resumes. Returns `None` when the queue is
    /// empty or the front waiter was already woken.
    pub(crate) fn wake_front(&mut self) -> Option<Waker> {
        self.nodes.front().and_then(|node| node.waker.borrow_mut().take())
    }

    /// Detach every waiter and collect its waker, leaving the queue empty.
    ///
    /// This is the close-time primitive: once it returns, no node is linked
    /// into this queue any more, so the queue's storage can die before the
    /// woken tasks run. The caller invokes the collected wakers after
    /// releasing its borrows.
    pub(crate) fn purge(&mut self) -> WakerBatch {
        let mut wakers = WakerBatch::new();
        while let Some(node) = self.nodes.pop_front() {
            node.gone.set(true);
            if let Some(waker) = node.waker.borrow_mut().take() {
                wakers.push(waker);
            }
        }
        wakers
    }

    /// Unlink one waiter, on operation completion or future drop.
    ///
    /// If the detached node was at the front and its wakeup had already been
    /// consumed, that wakeup would otherwise be lost; the new front's waker
    /// is returned so the caller can pass the hint along.
    pub(crate) fn detach(&mut self, node: &Rc<WaiterNode>) -> Option<Waker> {
        let idx = self.nodes.iter().position(|n| Rc::ptr_eq(n, node))?;
        let consumed = node.waker.borrow().is_none();
        self.nodes.remove(idx);
        node.waker.borrow_mut().take();
        if idx == 0 && consumed {
            self.wake_front()
        } else {
            None
        }
    }
}
