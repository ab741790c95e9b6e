//! Futures for the blocking operations.
//!
//! Every blocking operation wraps its non-blocking primitive in the same
//! retry shape: try, and on would-block park on the matching wait queue and
//! return `Pending`. A parked operation retries only while it is the front
//! waiter of its queue; polled out of turn it just re-registers its waker, so
//! waiters resume strictly in park order even under `select!`-style spurious
//! polls. When the retry finally succeeds and the channel still has slack in
//! the same direction, the next waiter in line is woken; a batch that frees
//! several slots at once therefore drains the whole queue, one chained wakeup
//! at a time.
//!
//! A waiter whose channel closes under it is detached by the close itself and
//! resolves to [`NoChannelError`] on its next poll, without ever touching the
//! dead channel. Broadcast is the one exception: it restarts its
//! all-or-nothing attempt against the remaining channels instead.

use crate::{
    bus::{Bus, ChannelId},
    channel::{Dir, Parked},
    error::{set_last_error, ErrorKind, NoChannelError, TryError},
    Word,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Outcome of examining a parked node at the top of a poll.
enum Resume {
    /// Not parked, or parked at the front: run the primitive.
    Retry,
    /// Parked behind other waiters: keep waiting.
    NotOurTurn,
    /// The channel closed while parked.
    ChannelGone,
}

/// check the parked node, dropping it when the channel is gone
fn resume(parked: &mut Option<Parked>, cx: &Context) -> Resume {
    let Some(p) = parked.as_ref() else {
        return Resume::Retry;
    };
    if p.is_gone() {
        *parked = None;
        return Resume::ChannelGone;
    }
    if !p.is_front() {
        p.refresh(cx.waker());
        return Resume::NotOurTurn;
    }
    Resume::Retry
}

/// park on first suspension, refresh the waker on later ones
fn park_or_refresh<T>(
    parked: &mut Option<Parked>,
    bus: &Bus,
    id: ChannelId,
    dir: Dir,
    cx: &Context,
) -> Poll<Result<T, NoChannelError>> {
    match parked {
        Some(p) => p.refresh(cx.waker()),
        None => match bus.park(id, dir, cx.waker()) {
            Some(p) => *parked = Some(p),
            // the channel vanished between the primitive and the park; a
            // primitive cannot suspend, so this is unreachable in practice,
            // but failing like any other lost channel is harmless
            None => return lost_channel(),
        },
    }
    Poll::Pending
}

fn lost_channel<T>() -> Poll<Result<T, NoChannelError>> {
    set_last_error(ErrorKind::NoChannel);
    Poll::Ready(Err(NoChannelError))
}

/// Future for sending one word, created by [`Bus::send`].
///
/// Resolves once the word is in the channel, or to [`NoChannelError`] if the
/// descriptor is invalid or the channel closes while the sender is parked.
/// Dropping the future before it resolves leaves the channel untouched.
pub struct SendFut {
    bus: Bus,
    id: ChannelId,
    word: Word,
    parked: Option<Parked>,
}

impl SendFut {
    pub(crate) fn new(bus: Bus, id: ChannelId, word: Word) -> Self {
        SendFut { bus, id, word, parked: None }
    }
}

impl Future for SendFut {
    type Output = Result<(), NoChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        match resume(&mut this.parked, cx) {
            Resume::Retry => {}
            Resume::NotOurTurn => return Poll::Pending,
            Resume::ChannelGone => return lost_channel(),
        }
        match this.bus.try_send(this.id, this.word) {
            Ok(()) => {
                this.parked = None;
                this.bus.chain_wake(this.id, Dir::Send);
                Poll::Ready(Ok(()))
            }
            Err(TryError::WouldBlock(_)) => {
                park_or_refresh(&mut this.parked, &this.bus, this.id, Dir::Send, cx)
            }
            Err(TryError::NoChannel(e)) => {
                this.parked = None;
                Poll::Ready(Err(e))
            }
        }
    }
}

/// Future for receiving one word, created by [`Bus::recv`].
///
/// Resolves to the received word, or to [`NoChannelError`] if the descriptor
/// is invalid or the channel closes while the receiver is parked. Dropping
/// the future before it resolves never loses a word.
pub struct RecvFut {
    bus: Bus,
    id: ChannelId,
    parked: Option<Parked>,
}

impl RecvFut {
    pub(crate) fn new(bus: Bus, id: ChannelId) -> Self {
        RecvFut { bus, id, parked: None }
    }
}

impl Future for RecvFut {
    type Output = Result<Word, NoChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        match resume(&mut this.parked, cx) {
            Resume::Retry => {}
            Resume::NotOurTurn => return Poll::Pending,
            Resume::ChannelGone => return lost_channel(),
        }
        match this.bus.try_recv(this.id) {
            Ok(word) => {
                this.parked = None;
                this.bus.chain_wake(this.id, Dir::Recv);
                Poll::Ready(Ok(word))
            }
            Err(TryError::WouldBlock(_)) => {
                park_or_refresh(&mut this.parked, &this.bus, this.id, Dir::Recv, cx)
            }
            Err(TryError::NoChannel(e)) => {
                this.parked = None;
                Poll::Ready(Err(e))
            }
        }
    }
}

/// Future for a batched send, created by [`Bus::send_slice`].
///
/// Resolves to the number of words written once at least the first word is
/// in the channel; a full channel parks the sender, a partially full one
/// takes what fits.
pub struct SendSliceFut<'a> {
    bus: Bus,
    id: ChannelId,
    words: &'a [Word],
    parked: Option<Parked>,
}

impl<'a> SendSliceFut<'a> {
    pub(crate) fn new(bus: Bus, id: ChannelId, words: &'a [Word]) -> Self {
        SendSliceFut { bus, id, words, parked: None }
    }
}

impl Future for SendSliceFut<'_> {
    type Output = Result<usize, NoChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        match resume(&mut this.parked, cx) {
            Resume::Retry => {}
            Resume::NotOurTurn => return Poll::Pending,
            Resume::ChannelGone => return lost_channel(),
        }
        match this.bus.try_send_slice(this.id, this.words) {
            Ok(n) => {
                this.parked = None;
                this.bus.chain_wake(this.id, Dir::Send);
                Poll::Ready(Ok(n))
            }
            Err(TryError::WouldBlock(_)) => {
                park_or_refresh(&mut this.parked, &this.bus, this.id, Dir::Send, cx)
            }
            Err(TryError::NoChannel(e)) => {
                this.parked = None;
                Poll::Ready(Err(e))
            }
        }
    }
}

/// Future for a batched receive, created by [`Bus::recv_slice`].
///
/// Resolves to the number of words read once at least one word is available.
pub struct RecvSliceFut<'a> {
    bus: Bus,
    id: ChannelId,
    out: &'a mut [Word],
    parked: Option<Parked>,
}

impl<'a> RecvSliceFut<'a> {
    pub(crate) fn new(bus: Bus, id: ChannelId, out: &'a mut [Word]) -> Self {
        RecvSliceFut { bus, id, out, parked: None }
    }
}

impl Future for RecvSliceFut<'_> {
    type Output = Result<usize, NoChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        match resume(&mut this.parked, cx) {
            Resume::Retry => {}
            Resume::NotOurTurn => return Poll::Pending,
            Resume::ChannelGone => return lost_channel(),
        }
        match this.bus.try_recv_slice(this.id, this.out) {
            Ok(n) => {
                this.parked = None;
                this.bus.chain_wake(this.id, Dir::Recv);
                Poll::Ready(Ok(n))
            }
            Err(TryError::WouldBlock(_)) => {
                park_or_refresh(&mut this.parked, &this.bus, this.id, Dir::Recv, cx)
            }
            Err(TryError::NoChannel(e)) => {
                this.parked = None;
                Poll::Ready(Err(e))
            }
        }
    }
}

/// Future for a bus-wide broadcast, created by [`Bus::broadcast`].
///
/// Repeats the all-or-nothing delivery attempt until no open channel is
/// full, parking on the send queue of whichever channel is blocking it. A
/// blocking channel that closes does not fail the broadcast; the attempt
/// restarts against the remaining channels. Resolves to [`NoChannelError`]
/// only when an attempt finds no open channel at all.
pub struct BroadcastFut {
    bus: Bus,
    word: Word,
    parked: Option<Parked>,
}

impl BroadcastFut {
    pub(crate) fn new(bus: Bus, word: Word) -> Self {
        BroadcastFut { bus, word, parked: None }
    }
}

impl Future for BroadcastFut {
    type Output = Result<(), NoChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match resume(&mut this.parked, cx) {
                // a broadcast outlives the channel it was parked on; retry
                // against whatever channels remain
                Resume::Retry | Resume::ChannelGone => {}
                Resume::NotOurTurn => return Poll::Pending,
            }
            match this.bus.try_broadcast(this.word) {
                Ok(()) => {
                    this.parked = None;
                    return Poll::Ready(Ok(()));
                }
                Err(TryError::NoChannel(e)) => {
                    this.parked = None;
                    return Poll::Ready(Err(e));
                }
                Err(TryError::WouldBlock(_)) => {
                    if let Some(p) = this.parked.as_ref() {
                        if p.chan.borrow().is_full() {
                            // still blocked on the same channel, keep our
                            // place in its queue
                            p.refresh(cx.waker());
                            return Poll::Pending;
                        }
                        this.parked = None;
                    }
                    match this.bus.park_broadcast(cx.waker()) {
                        Some(p) => {
                            this.parked = Some(p);
                            return Poll::Pending;
                        }
                        // the full channel closed in the meantime; retry
                        // without suspending
                        None => continue,
                    }
                }
            }
        }
    }
}
