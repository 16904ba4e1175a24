//! Mailbox-state cache
//!
//! One [`MailboxState`] instance exists per open mailbox per session. It
//! is built by a cold load, refreshed by differential loads against the
//! previous instance, and adjusted in place by narrow mutators between
//! loads. There is no internal locking: an instance is owned by exactly
//! one session, and cross-session consistency is reconciled optimistically
//! through the mailbox change-sequence counter.

pub mod acl;
pub mod load;
pub mod recent;
pub mod seqset;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

pub use acl::{Rights, ANYONE_USER};
pub use state::{MailboxState, MessageInfo};
