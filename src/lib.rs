//! # Sluice: a cooperative in-process word bus
//!
//! A sluice bus multiplexes bounded FIFO channels of fixed-width words
//! between tasks scheduled cooperatively on a single thread. Channels are
//! addressed by small integer descriptors ([`ChannelId`]) handed out by
//! [`Bus::open`] and recycled by [`Bus::close`].
//!
//! Every operation comes in two flavors:
//!
//! - **Non-blocking primitives** (`try_send`, `try_recv`, `try_send_slice`,
//!   `try_recv_slice`, `try_broadcast`) never suspend. When the channel is in
//!   the wrong state (full for sends, empty for receives, any-channel-full
//!   for broadcast) they fail with a would-block error and leave the channel
//!   untouched.
//! - **Blocking operations** (`send`, `recv`, `send_slice`, `recv_slice`,
//!   `broadcast`) are futures. When the channel is in the wrong state they
//!   park the calling task on the channel's wait queue and retry once woken.
//!   Waiters are resumed strictly in the order they parked, and an operation
//!   that frees more room than one waiter can use wakes its successor, so a
//!   burst of freed capacity drains the whole queue without starving anyone.
//!
//! The bus is deliberately single-threaded: handles are `!Send`, internal
//! state is reference-counted rather than locked, and a task only ever
//! observes channel state at its own suspension points. Any executor that
//! polls futures on one thread can drive the bus; the [`exec`] module ships a
//! minimal deterministic one used by this crate's own tests and examples.
//!
//! Closing a channel while tasks are parked on it is safe and well-defined:
//! every waiter is detached from the channel's queues before the channel's
//! storage is released, then woken. A woken waiter observes that its channel
//! is gone and fails with [`NoChannelError`], even if the descriptor has
//! already been reused for a fresh channel.
//!
//! In addition to the typed `Result` each call returns, the bus records the
//! outcome kind of every entry point in a thread-local cell readable through
//! [`last_error`], mirroring the errno convention of classic bus APIs.
//!
//! ```
//! use sluice::{exec::Executor, Bus};
//!
//! let bus = Bus::new();
//! let pipe = bus.open(2);
//!
//! let mut exec = Executor::new();
//! let tx = bus.clone();
//! exec.spawn(async move {
//!     for word in 1..=5 {
//!         tx.send(pipe, word).await.unwrap();
//!     }
//! });
//! let rx = bus.clone();
//! exec.spawn(async move {
//!     for expected in 1..=5 {
//!         assert_eq!(rx.recv(pipe).await.unwrap(), expected);
//!     }
//! });
//! exec.run();
//! ```

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod bus;
mod channel;
mod error;
mod ops;
mod ring;
mod waiters;

pub mod exec;

pub use crate::{
    bus::{Bus, ChannelId},
    error::{
        last_error, set_last_error, ErrorKind, NoChannelError, TryError, WouldBlockError,
    },
    ops::{BroadcastFut, RecvFut, RecvSliceFut, SendFut, SendSliceFut},
};

/// The fixed-width message word carried by every channel.
pub type Word = u32;
