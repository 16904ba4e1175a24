//! Row source consumed by the mailbox-state cache

use crate::db::DatabasePool;
use crate::models::{AclRow, KeywordRow, MailboxMetaRow, MessageRow, StateSnapshot};
use async_trait::async_trait;
use maildrift_common::config::StateConfig;
use maildrift_common::types::{MailboxId, MessageStatus, SeqId, Uid, UserId};
use maildrift_common::{Error, Result};
use sqlx::{FromRow, PgConnection};
use tracing::debug;

/// Row-returning query interface consumed by the mailbox-state cache.
///
/// Implementations answer with plain row values; all interpretation
/// (visibility, remapping, counters) happens in the cache.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Mailbox-level metadata, or `None` when the mailbox is gone.
    async fn fetch_mailbox_meta(&self, mailbox_id: MailboxId) -> Result<Option<MailboxMetaRow>>;

    /// Message rows with `status <= max_status`, ascending by UID.
    /// `since_seq` restricts to rows touched at or after the watermark.
    async fn fetch_messages(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<MessageRow>>;

    /// Keyword rows for the same message set `fetch_messages` returns.
    async fn fetch_keywords(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<KeywordRow>>;

    /// Current change-sequence counter of a mailbox, without the rest of
    /// the metadata block.
    async fn fetch_seq(&self, mailbox_id: MailboxId) -> Result<SeqId>;

    /// Explicit ACL row for one user on one mailbox.
    async fn fetch_acl(&self, mailbox_id: MailboxId, user_id: UserId) -> Result<Option<AclRow>>;

    /// Transition one message to purge status.
    async fn mark_purged(&self, uid: Uid) -> Result<()>;

    /// Clear the \Recent flag on the given rows. The update is guarded:
    /// only rows still flagged recent and with `seq < guard_seq` change,
    /// so flags set concurrently by another session survive. Returns the
    /// number of rows changed.
    async fn clear_recent_flags(
        &self,
        mailbox_id: MailboxId,
        uids: &[Uid],
        guard_seq: SeqId,
    ) -> Result<u64>;

    /// Increment and return the mailbox change-sequence counter.
    async fn bump_seq(&self, mailbox_id: MailboxId) -> Result<SeqId>;

    /// Meta, message, and keyword rows as one consistent snapshot.
    ///
    /// The default composes the individual fetches; implementations backed
    /// by a real store run all three inside a single transaction.
    async fn fetch_snapshot(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<StateSnapshot> {
        let meta = self.fetch_mailbox_meta(mailbox_id).await?;
        if meta.is_none() {
            return Ok(StateSnapshot::default());
        }
        Ok(StateSnapshot {
            meta,
            messages: self.fetch_messages(mailbox_id, since_seq, max_status).await?,
            keywords: self.fetch_keywords(mailbox_id, since_seq, max_status).await?,
        })
    }
}

#[derive(FromRow)]
struct MetaBaseRow {
    owner_id: i64,
    name: String,
    permission: i16,
    no_select: bool,
    no_inferiors: bool,
    is_subscribed: bool,
    seq: i64,
}

#[derive(FromRow)]
struct CountRow {
    exists_count: i64,
    seen_count: i64,
    recent_count: i64,
}

/// PostgreSQL row source
pub struct DbRowSource {
    pool: DatabasePool,
    purge_threshold: i16,
}

impl DbRowSource {
    pub fn new(pool: DatabasePool, state: &StateConfig) -> Self {
        Self {
            pool,
            purge_threshold: state.purge_threshold,
        }
    }

    async fn meta_on(
        conn: &mut PgConnection,
        mailbox_id: MailboxId,
        purge_threshold: i16,
    ) -> Result<Option<MailboxMetaRow>> {
        let base = sqlx::query_as::<_, MetaBaseRow>(
            "SELECT b.owner_id, b.name, b.permission, b.no_select, b.no_inferiors, b.seq, \
             s.mailbox_id IS NOT NULL AS is_subscribed \
             FROM mailboxes b \
             LEFT JOIN subscription s ON s.mailbox_id = b.mailbox_id \
             WHERE b.mailbox_id = $1",
        )
        .bind(mailbox_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let base = match base {
            Some(base) => base,
            None => return Ok(None),
        };

        let counts = sqlx::query_as::<_, CountRow>(
            "SELECT COUNT(*) FILTER (WHERE status < $2) AS exists_count, \
             COUNT(*) FILTER (WHERE status < $2 AND seen) AS seen_count, \
             COUNT(*) FILTER (WHERE status < $2 AND recent) AS recent_count \
             FROM messages WHERE mailbox_id = $1",
        )
        .bind(mailbox_id)
        .bind(purge_threshold)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // Expunged rows keep contributing to MAX(uid): the next UID must
        // not move backwards when a message is purged.
        let (uidnext,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(uid) + 1, 1) FROM messages WHERE mailbox_id = $1")
                .bind(mailbox_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        let (children,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mailboxes WHERE owner_id = $1 AND name LIKE $2")
                .bind(base.owner_id)
                .bind(format!("{}/%", base.name))
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        debug!(
            mailbox_id,
            seq = base.seq,
            exists = counts.exists_count,
            "fetched mailbox metadata"
        );

        Ok(Some(MailboxMetaRow {
            mailbox_id,
            owner_id: base.owner_id,
            name: base.name,
            permission: base.permission,
            no_select: base.no_select,
            no_inferiors: base.no_inferiors,
            no_children: children == 0,
            is_subscribed: base.is_subscribed,
            seq: base.seq,
            uidnext,
            exists: counts.exists_count,
            unseen: counts.exists_count - counts.seen_count,
            recent: counts.recent_count,
        }))
    }

    async fn messages_on(
        conn: &mut PgConnection,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<MessageRow>> {
        let rows = match since_seq {
            Some(since) => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT m.uid, m.seen, m.answered, m.deleted, m.flagged, m.draft, m.recent, \
                     p.internal_date, COALESCE(p.rfc_size, 0) AS rfc_size, m.seq, m.status, m.phys_id \
                     FROM messages m LEFT JOIN physmessage p ON p.id = m.phys_id \
                     WHERE m.mailbox_id = $1 AND m.status <= $2 AND m.seq >= $3 \
                     ORDER BY m.uid ASC",
                )
                .bind(mailbox_id)
                .bind(max_status)
                .bind(since as i64)
                .fetch_all(&mut *conn)
                .await
            }
            None => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT m.uid, m.seen, m.answered, m.deleted, m.flagged, m.draft, m.recent, \
                     p.internal_date, COALESCE(p.rfc_size, 0) AS rfc_size, m.seq, m.status, m.phys_id \
                     FROM messages m LEFT JOIN physmessage p ON p.id = m.phys_id \
                     WHERE m.mailbox_id = $1 AND m.status <= $2 \
                     ORDER BY m.uid ASC",
                )
                .bind(mailbox_id)
                .bind(max_status)
                .fetch_all(&mut *conn)
                .await
            }
        };

        rows.map_err(|e| Error::Database(e.to_string()))
    }

    async fn keywords_on(
        conn: &mut PgConnection,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<KeywordRow>> {
        let rows = match since_seq {
            Some(since) => {
                sqlx::query_as::<_, KeywordRow>(
                    "SELECT k.uid, k.keyword FROM keywords k \
                     JOIN messages m ON m.uid = k.uid \
                     WHERE m.mailbox_id = $1 AND m.status <= $2 AND m.seq >= $3",
                )
                .bind(mailbox_id)
                .bind(max_status)
                .bind(since as i64)
                .fetch_all(&mut *conn)
                .await
            }
            None => {
                sqlx::query_as::<_, KeywordRow>(
                    "SELECT k.uid, k.keyword FROM keywords k \
                     JOIN messages m ON m.uid = k.uid \
                     WHERE m.mailbox_id = $1 AND m.status <= $2",
                )
                .bind(mailbox_id)
                .bind(max_status)
                .fetch_all(&mut *conn)
                .await
            }
        };

        rows.map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl RowSource for DbRowSource {
    async fn fetch_mailbox_meta(&self, mailbox_id: MailboxId) -> Result<Option<MailboxMetaRow>> {
        // The metadata block is assembled from several queries; read them
        // under one transaction so the counts agree with the base row.
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        let meta = Self::meta_on(&mut tx, mailbox_id, self.purge_threshold).await?;
        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(meta)
    }

    async fn fetch_messages(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<MessageRow>> {
        let mut conn = self
            .pool
            .pool()
            .acquire()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Self::messages_on(&mut conn, mailbox_id, since_seq, max_status).await
    }

    async fn fetch_keywords(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<KeywordRow>> {
        let mut conn = self
            .pool
            .pool()
            .acquire()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Self::keywords_on(&mut conn, mailbox_id, since_seq, max_status).await
    }

    async fn fetch_seq(&self, mailbox_id: MailboxId) -> Result<SeqId> {
        let seq: Option<(i64,)> = sqlx::query_as("SELECT seq FROM mailboxes WHERE mailbox_id = $1")
            .bind(mailbox_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        match seq {
            Some((seq,)) => Ok(seq as SeqId),
            None => Err(Error::NotFound(format!("mailbox {}", mailbox_id))),
        }
    }

    async fn fetch_acl(&self, mailbox_id: MailboxId, user_id: UserId) -> Result<Option<AclRow>> {
        sqlx::query_as::<_, AclRow>(
            "SELECT lookup_flag, read_flag, seen_flag, write_flag, insert_flag, post_flag, \
             create_flag, delete_flag, deleted_flag, expunge_flag, administer_flag \
             FROM acl WHERE mailbox_id = $1 AND user_id = $2",
        )
        .bind(mailbox_id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_purged(&self, uid: Uid) -> Result<()> {
        sqlx::query("UPDATE messages SET status = $2 WHERE uid = $1")
            .bind(uid as i64)
            .bind(i16::from(MessageStatus::Purged))
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn clear_recent_flags(
        &self,
        mailbox_id: MailboxId,
        uids: &[Uid],
        guard_seq: SeqId,
    ) -> Result<u64> {
        let uids: Vec<i64> = uids.iter().map(|uid| *uid as i64).collect();
        let result = sqlx::query(
            "UPDATE messages SET recent = FALSE \
             WHERE mailbox_id = $1 AND uid = ANY($2) AND recent AND seq < $3",
        )
        .bind(mailbox_id)
        .bind(&uids)
        .bind(guard_seq as i64)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn bump_seq(&self, mailbox_id: MailboxId) -> Result<SeqId> {
        let seq: Option<(i64,)> =
            sqlx::query_as("UPDATE mailboxes SET seq = seq + 1 WHERE mailbox_id = $1 RETURNING seq")
                .bind(mailbox_id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        match seq {
            Some((seq,)) => Ok(seq as SeqId),
            None => Err(Error::NotFound(format!("mailbox {}", mailbox_id))),
        }
    }

    async fn fetch_snapshot(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<StateSnapshot> {
        // One read-committed transaction so the three row sets agree.
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let meta = Self::meta_on(&mut tx, mailbox_id, self.purge_threshold).await?;
        let snapshot = match meta {
            Some(meta) => StateSnapshot {
                messages: Self::messages_on(&mut tx, mailbox_id, since_seq, max_status).await?,
                keywords: Self::keywords_on(&mut tx, mailbox_id, since_seq, max_status).await?,
                meta: Some(meta),
            },
            None => StateSnapshot::default(),
        };

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(snapshot)
    }
}
