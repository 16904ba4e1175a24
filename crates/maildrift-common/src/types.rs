//! Common types for Maildrift

use serde::{Deserialize, Serialize};

/// Unique identifier for mailboxes
pub type MailboxId = i64;

/// Unique identifier for users
pub type UserId = i64;

/// Message UID, stable for the lifetime of a message within one mailbox
pub type Uid = u64;

/// Message sequence number, 1-based position among visible messages
pub type Msn = u64;

/// Per-mailbox change-sequence counter value
pub type SeqId = u64;

/// IMAP system flags of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessageFlags {
    pub seen: bool,
    pub answered: bool,
    pub deleted: bool,
    pub flagged: bool,
    pub draft: bool,
    pub recent: bool,
}

/// Message lifecycle status values as stored by the backing store.
///
/// Stored status columns are plain integers; this enum names the ladder.
/// Visibility is decided against the configured purge threshold, not
/// against these constants directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Active = 0,
    Seen = 1,
    Expunged = 2,
    Purged = 3,
}

impl From<MessageStatus> for i16 {
    fn from(status: MessageStatus) -> i16 {
        status as i16
    }
}

/// Mailbox access mode granted to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadOnly = 1,
    ReadWrite = 2,
}

impl Permission {
    /// Decode a stored permission value, falling back to read-only.
    pub fn from_i16(value: i16) -> Self {
        match value {
            2 => Permission::ReadWrite,
            _ => Permission::ReadOnly,
        }
    }
}
