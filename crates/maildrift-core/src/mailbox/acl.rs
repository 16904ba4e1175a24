//! ACL rights resolution

use super::state::MailboxState;
use bitflags::bitflags;
use maildrift_common::types::UserId;
use maildrift_common::{Error, Result};
use maildrift_storage::models::AclRow;
use maildrift_storage::repository::RowSource;
use tracing::debug;

/// Reserved subject consulted when a non-owner has no explicit ACL row.
pub const ANYONE_USER: UserId = 0;

bitflags! {
    /// Per-mailbox ACL rights
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rights: u16 {
        const LOOKUP = 1 << 0;
        const READ = 1 << 1;
        const SEEN = 1 << 2;
        const WRITE = 1 << 3;
        const INSERT = 1 << 4;
        const POST = 1 << 5;
        const CREATE = 1 << 6;
        const DELETE = 1 << 7;
        const DELETED = 1 << 8;
        const EXPUNGE = 1 << 9;
        const ADMINISTER = 1 << 10;
    }
}

impl From<&AclRow> for Rights {
    fn from(row: &AclRow) -> Rights {
        let mut rights = Rights::empty();
        rights.set(Rights::LOOKUP, row.lookup_flag);
        rights.set(Rights::READ, row.read_flag);
        rights.set(Rights::SEEN, row.seen_flag);
        rights.set(Rights::WRITE, row.write_flag);
        rights.set(Rights::INSERT, row.insert_flag);
        rights.set(Rights::POST, row.post_flag);
        rights.set(Rights::CREATE, row.create_flag);
        rights.set(Rights::DELETE, row.delete_flag);
        rights.set(Rights::DELETED, row.deleted_flag);
        rights.set(Rights::EXPUNGE, row.expunge_flag);
        rights.set(Rights::ADMINISTER, row.administer_flag);
        rights
    }
}

impl MailboxState {
    /// Cached mailbox owner, fetched on first use.
    async fn owner_id(&mut self, rows: &dyn RowSource) -> Result<UserId> {
        if let Some(owner) = self.owner {
            return Ok(owner);
        }
        let meta = rows
            .fetch_mailbox_meta(self.mailbox_id())
            .await?
            .ok_or_else(|| Error::NotFound(format!("mailbox {}", self.mailbox_id())))?;
        self.owner = Some(meta.owner_id);
        Ok(meta.owner_id)
    }

    /// Effective rights of a user on this mailbox.
    ///
    /// An explicit row for the owner restricts the owner's otherwise
    /// implicit full grant. Non-owners are governed by their own row,
    /// then by the `anyone` row, and are denied when neither exists.
    pub async fn rights_for(&mut self, rows: &dyn RowSource, user_id: UserId) -> Result<Rights> {
        let owner = self.owner_id(rows).await?;
        let explicit = rows.fetch_acl(self.mailbox_id(), user_id).await?;

        if user_id == owner {
            return Ok(match explicit.as_ref() {
                Some(row) => Rights::from(row),
                None => Rights::all(),
            });
        }

        let row = match explicit {
            Some(row) => row,
            None => match rows.fetch_acl(self.mailbox_id(), ANYONE_USER).await? {
                Some(row) => row,
                None => return Ok(Rights::empty()),
            },
        };
        Ok(Rights::from(&row))
    }

    /// Check one right for one user. A query failure propagates as an
    /// error; callers must treat it as "denied", never as "granted".
    pub async fn has_right(
        &mut self,
        rows: &dyn RowSource,
        user_id: UserId,
        right: Rights,
    ) -> Result<bool> {
        debug!(
            user_id,
            mailbox_id = self.mailbox_id(),
            ?right,
            "checking ACL"
        );
        Ok(self.rights_for(rows, user_id).await?.contains(right))
    }
}
