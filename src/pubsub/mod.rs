//! Generic publish/subscribe streaming core.
//!
//! Producers broadcast reference-counted messages through a [`Publisher`];
//! each consumer owns its own mailbox and drains it at its own pace. Two
//! mailbox strategies implement the [`Subscriber`] capability: [`Mailbox`]
//! for immediate one-at-a-time consumption and [`BatchMailbox`] for
//! size-or-timeout batching.

mod batch;
mod mailbox;
mod publisher;

pub use batch::{BatchMailbox, BatchWait};
pub use mailbox::Mailbox;
pub use publisher::{Publisher, Subscriber};
