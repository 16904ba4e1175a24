//! Maildrift Core - Mailbox-state synchronization cache
//!
//! This crate maintains, per open mailbox, an in-memory view of message
//! metadata kept aligned with the backing store through cold and
//! differential loads, and answers the protocol layer's positional,
//! flag, and permission queries.

pub mod mailbox;

pub use mailbox::{MailboxState, MessageInfo, Rights, ANYONE_USER};
