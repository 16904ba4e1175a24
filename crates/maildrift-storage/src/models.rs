//! Row models for the mailbox-state cache

use chrono::{DateTime, Utc};
use maildrift_common::types::{MailboxId, MessageFlags, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fallback internal date for messages whose physical row carries none
pub const DEFAULT_INTERNAL_DATE: &str = "01-Jan-1970 00:00:01 +0100";

/// Mailbox-level metadata, assembled from the mailbox, subscription, and
/// message tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxMetaRow {
    pub mailbox_id: MailboxId,
    pub owner_id: UserId,
    pub name: String,
    pub permission: i16,
    pub no_select: bool,
    pub no_inferiors: bool,
    pub no_children: bool,
    pub is_subscribed: bool,
    pub seq: i64,
    pub uidnext: i64,
    pub exists: i64,
    pub unseen: i64,
    pub recent: i64,
}

/// One message metadata row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessageRow {
    pub uid: i64,
    pub seen: bool,
    pub answered: bool,
    pub deleted: bool,
    pub flagged: bool,
    pub draft: bool,
    pub recent: bool,
    pub internal_date: Option<DateTime<Utc>>,
    pub rfc_size: i64,
    pub seq: i64,
    pub status: i16,
    pub phys_id: i64,
}

impl MessageRow {
    /// Get message flags
    pub fn flags(&self) -> MessageFlags {
        MessageFlags {
            seen: self.seen,
            answered: self.answered,
            deleted: self.deleted,
            flagged: self.flagged,
            draft: self.draft,
            recent: self.recent,
        }
    }

    /// Internal date in IMAP wire format
    pub fn internal_date_str(&self) -> String {
        match self.internal_date {
            Some(ts) => ts.format("%d-%b-%Y %H:%M:%S %z").to_string(),
            None => DEFAULT_INTERNAL_DATE.to_string(),
        }
    }
}

/// One (message, keyword) association row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KeywordRow {
    pub uid: i64,
    pub keyword: String,
}

/// Per-user ACL grants on a mailbox
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize, Default)]
pub struct AclRow {
    pub lookup_flag: bool,
    pub read_flag: bool,
    pub seen_flag: bool,
    pub write_flag: bool,
    pub insert_flag: bool,
    pub post_flag: bool,
    pub create_flag: bool,
    pub delete_flag: bool,
    pub deleted_flag: bool,
    pub expunge_flag: bool,
    pub administer_flag: bool,
}

/// The three row sets a load consumes, read as one consistent snapshot
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub meta: Option<MailboxMetaRow>,
    pub messages: Vec<MessageRow>,
    pub keywords: Vec<KeywordRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(internal_date: Option<DateTime<Utc>>) -> MessageRow {
        MessageRow {
            uid: 1,
            seen: true,
            answered: false,
            deleted: false,
            flagged: false,
            draft: false,
            recent: true,
            internal_date,
            rfc_size: 1024,
            seq: 1,
            status: 0,
            phys_id: 10,
        }
    }

    #[test]
    fn test_internal_date_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 5).unwrap();
        assert_eq!(row(Some(ts)).internal_date_str(), "07-Mar-2024 12:30:05 +0000");
        assert_eq!(row(None).internal_date_str(), DEFAULT_INTERNAL_DATE);
    }

    #[test]
    fn test_row_flags() {
        let flags = row(None).flags();
        assert!(flags.seen);
        assert!(flags.recent);
        assert!(!flags.deleted);
    }
}
