//! Cold and differential state loading

use super::state::{MailboxState, MessageInfo};
use maildrift_common::config::StateConfig;
use maildrift_common::types::{MailboxId, Permission, SeqId};
use maildrift_common::{Error, Result};
use maildrift_storage::models::{KeywordRow, MailboxMetaRow, MessageRow};
use maildrift_storage::repository::RowSource;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

impl MessageInfo {
    fn from_row(row: &MessageRow, mailbox_id: MailboxId) -> Self {
        Self {
            uid: row.uid as u64,
            mailbox_id,
            phys_id: row.phys_id as u64,
            msn: 0,
            flags: row.flags(),
            keywords: Vec::new(),
            internal_date: row.internal_date_str(),
            rfc_size: row.rfc_size as u64,
            seq: row.seq as SeqId,
            status: row.status,
            expunge_counter: 0,
        }
    }

    /// Overwrite the mutable fields from a fresh row. The keyword list is
    /// cleared here and repopulated from the keyword rows of the same
    /// load.
    fn overwrite(&mut self, row: &MessageRow) {
        self.phys_id = row.phys_id as u64;
        self.flags = row.flags();
        self.internal_date = row.internal_date_str();
        self.rfc_size = row.rfc_size as u64;
        self.seq = row.seq as SeqId;
        self.status = row.status;
        self.keywords.clear();
    }
}

impl MailboxState {
    /// Build a fresh state for a mailbox from scratch.
    pub async fn load_cold(
        rows: &dyn RowSource,
        config: &StateConfig,
        mailbox_id: MailboxId,
    ) -> Result<Self> {
        let mut state = Self::new(mailbox_id, config.clone());

        let snapshot = rows
            .fetch_snapshot(mailbox_id, None, config.purge_threshold - 1)
            .await?;
        let meta = snapshot
            .meta
            .ok_or_else(|| Error::NotFound(format!("mailbox {}", mailbox_id)))?;
        state.apply_meta(&meta);

        for row in &snapshot.messages {
            state
                .messages
                .insert(row.uid as u64, MessageInfo::from_row(row, mailbox_id));
        }
        state.apply_keywords(&snapshot.keywords, None);

        if config.repair_deleted {
            state.repair_deleted(rows, &snapshot.messages).await;
        }

        state.state_seq = state.seq;
        state.remap();

        info!(
            mailbox_id,
            exists = state.uid_index.len(),
            seq = state.seq,
            "cold load complete"
        );

        Ok(state)
    }

    /// Refresh a state against its previous instance, re-reading only the
    /// rows touched since the last watermark. The previous instance is
    /// consumed; callers switch to the returned one.
    pub async fn load_differential(prev: MailboxState, rows: &dyn RowSource) -> Result<Self> {
        if prev.differential_iterations >= prev.config.max_differential_iterations {
            debug!(
                mailbox_id = prev.id,
                iterations = prev.differential_iterations,
                "differential cap reached, forcing cold load"
            );
            let config = prev.config.clone();
            let mailbox_id = prev.id;
            return Self::load_cold(rows, &config, mailbox_id).await;
        }

        let mut state = Self::new(prev.id, prev.config.clone());
        state.messages = prev.messages.clone();
        state.keywords = prev.keywords.clone();
        state.uidnext = prev.uidnext;
        state.state_seq = prev.state_seq;
        state.differential_iterations = prev.differential_iterations + 1;

        // The watermark backs off by one: re-fetching a row whose change
        // raced the previous load is harmless, missing one is not.
        let since = state.state_seq.saturating_sub(1);
        let threshold = state.config.purge_threshold;

        let snapshot = rows
            .fetch_snapshot(state.id, Some(since), threshold)
            .await?;
        let meta = snapshot
            .meta
            .ok_or_else(|| Error::NotFound(format!("mailbox {}", state.id)))?;
        state.apply_meta(&meta);

        let mut touched = BTreeSet::new();
        for row in &snapshot.messages {
            let uid = row.uid as u64;

            if row.status >= threshold {
                if let Some(mut old) = state.messages.remove(&uid) {
                    old.expunge_counter += 1;
                    debug!(uid, cycles = old.expunge_counter, "dropping purged message");
                    state.exists = state.exists.saturating_sub(1);
                }
                continue;
            }

            match state.messages.get_mut(&uid) {
                Some(existing) => existing.overwrite(row),
                None => {
                    state
                        .messages
                        .insert(uid, MessageInfo::from_row(row, state.id));
                }
            }
            touched.insert(uid);
        }
        state.apply_keywords(&snapshot.keywords, Some(&touched));

        state.state_seq = state.seq;
        state.remap();

        debug!(
            mailbox_id = state.id,
            iteration = state.differential_iterations,
            exists = state.uid_index.len(),
            "differential load complete"
        );

        Ok(state)
    }

    /// Fetch only the mailbox metadata block, for LIST-style callers that
    /// never need the message map.
    pub async fn preload(
        rows: &dyn RowSource,
        config: &StateConfig,
        mailbox_id: MailboxId,
    ) -> Result<Self> {
        let mut state = Self::new(mailbox_id, config.clone());
        let meta = rows
            .fetch_mailbox_meta(mailbox_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mailbox {}", mailbox_id)))?;
        state.apply_meta(&meta);
        Ok(state)
    }

    /// Current change-sequence counter of a mailbox, without building any
    /// state. Sessions poll this to decide whether an update is needed.
    pub async fn peek_seq(rows: &dyn RowSource, mailbox_id: MailboxId) -> Result<SeqId> {
        rows.fetch_seq(mailbox_id).await
    }

    /// Re-read the metadata block. When `uidnext` is already known and the
    /// mailbox seq is unchanged since the last load, this is a cheap
    /// confirmation and the block is left as is.
    pub async fn refresh_meta(&mut self, rows: &dyn RowSource) -> Result<()> {
        let seq = rows.fetch_seq(self.id).await?;
        if self.uidnext != 0 && seq == self.seq {
            return Ok(());
        }

        let meta = rows
            .fetch_mailbox_meta(self.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mailbox {}", self.id)))?;
        self.apply_meta(&meta);
        Ok(())
    }

    fn apply_meta(&mut self, meta: &MailboxMetaRow) {
        self.owner = Some(meta.owner_id);
        self.permission = Permission::from_i16(meta.permission);
        self.name = meta.name.clone();
        if self.name.eq_ignore_ascii_case("INBOX") {
            self.is_inbox = true;
            self.is_subscribed = true;
        } else {
            self.is_subscribed = meta.is_subscribed;
        }
        self.is_public = self.name.starts_with("#Public");
        self.is_users = self.name.starts_with("#Users");
        self.no_select = meta.no_select;
        self.no_inferiors = meta.no_inferiors;
        self.no_children = meta.no_children;
        self.seq = meta.seq as SeqId;
        // uidnext never decreases and is never reused
        if (meta.uidnext as u64) > self.uidnext {
            self.uidnext = meta.uidnext as u64;
        }
        self.exists = meta.exists as u32;
        self.unseen = meta.unseen as u32;
        self.recent = meta.recent as u32;
    }

    /// Attach keyword rows to their messages. `touched` restricts the
    /// rebuild to messages the current load actually re-read.
    fn apply_keywords(&mut self, keywords: &[KeywordRow], touched: Option<&BTreeSet<u64>>) {
        if keywords.is_empty() {
            debug!("no keywords");
            return;
        }
        for row in keywords {
            let uid = row.uid as u64;
            if let Some(touched) = touched {
                if !touched.contains(&uid) {
                    continue;
                }
            }
            if let Some(message) = self.messages.get_mut(&uid) {
                message.keywords.push(row.keyword.clone());
                self.add_keyword(&row.keyword);
            }
        }
    }

    /// Best-effort desynchronization repair: rows already flagged
    /// \Deleted but still visible are pushed to purge status, up to the
    /// configured budget. Failures are logged and never fail the load.
    async fn repair_deleted(&self, rows: &dyn RowSource, loaded: &[MessageRow]) {
        let mut budget = self.config.repair_budget;
        for row in loaded {
            if !row.deleted || row.status >= self.config.purge_threshold {
                continue;
            }
            if budget == 0 {
                debug!(mailbox_id = self.id, "repair budget exhausted");
                break;
            }
            match rows.mark_purged(row.uid as u64).await {
                Ok(()) => {
                    budget -= 1;
                    debug!(uid = row.uid, "repaired deleted message to purge status");
                }
                Err(e) => {
                    warn!(uid = row.uid, error = %e, "desync repair failed");
                    break;
                }
            }
        }
    }
}
