//! In-memory row source backing the cache tests

use async_trait::async_trait;
use maildrift_common::types::{MailboxId, SeqId, Uid, UserId};
use maildrift_common::{Error, Result};
use maildrift_storage::models::{AclRow, KeywordRow, MailboxMetaRow, MessageRow};
use maildrift_storage::repository::RowSource;
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) struct FakeRows {
    store: Mutex<Store>,
}

struct Store {
    mailbox_id: MailboxId,
    owner_id: UserId,
    name: String,
    permission: i16,
    purge_threshold: i16,
    seq: i64,
    messages: Vec<MessageRow>,
    keywords: Vec<KeywordRow>,
    acl: HashMap<UserId, AclRow>,
    purged: Vec<Uid>,
    recent_batches: Vec<usize>,
    fail: bool,
    fail_repair: bool,
}

impl FakeRows {
    pub fn new(mailbox_id: MailboxId, owner_id: UserId) -> Self {
        Self {
            store: Mutex::new(Store {
                mailbox_id,
                owner_id,
                name: "testbox".to_string(),
                permission: 2,
                purge_threshold: 2,
                seq: 0,
                messages: Vec::new(),
                keywords: Vec::new(),
                acl: HashMap::new(),
                purged: Vec::new(),
                recent_batches: Vec::new(),
                fail: false,
                fail_repair: false,
            }),
        }
    }

    pub fn message_row(uid: Uid, seq: i64, status: i16) -> MessageRow {
        MessageRow {
            uid: uid as i64,
            seen: false,
            answered: false,
            deleted: false,
            flagged: false,
            draft: false,
            recent: false,
            internal_date: None,
            rfc_size: 1024,
            seq,
            status,
            phys_id: uid as i64 * 10,
        }
    }

    pub fn add_row(&self, row: MessageRow) {
        let mut s = self.store.lock().unwrap();
        s.seq = s.seq.max(row.seq);
        s.messages.push(row);
    }

    pub fn add_message(&self, uid: Uid, seq: i64, status: i16) {
        self.add_row(Self::message_row(uid, seq, status));
    }

    pub fn set_status(&self, uid: Uid, status: i16, seq: i64) {
        let mut s = self.store.lock().unwrap();
        s.seq = s.seq.max(seq);
        if let Some(row) = s.messages.iter_mut().find(|m| m.uid == uid as i64) {
            row.status = status;
            row.seq = seq;
        }
    }

    pub fn set_flags(&self, uid: Uid, seen: bool, recent: bool, deleted: bool) {
        let mut s = self.store.lock().unwrap();
        if let Some(row) = s.messages.iter_mut().find(|m| m.uid == uid as i64) {
            row.seen = seen;
            row.recent = recent;
            row.deleted = deleted;
        }
    }

    pub fn add_keyword(&self, uid: Uid, keyword: &str) {
        let mut s = self.store.lock().unwrap();
        s.keywords.push(KeywordRow {
            uid: uid as i64,
            keyword: keyword.to_string(),
        });
    }

    pub fn remove_keywords(&self, uid: Uid) {
        let mut s = self.store.lock().unwrap();
        s.keywords.retain(|k| k.uid != uid as i64);
    }

    pub fn grant(&self, user_id: UserId, row: AclRow) {
        self.store.lock().unwrap().acl.insert(user_id, row);
    }

    pub fn set_seq(&self, seq: i64) {
        self.store.lock().unwrap().seq = seq;
    }

    pub fn set_name(&self, name: &str) {
        self.store.lock().unwrap().name = name.to_string();
    }

    pub fn set_permission(&self, permission: i16) {
        self.store.lock().unwrap().permission = permission;
    }

    pub fn set_purge_threshold(&self, threshold: i16) {
        self.store.lock().unwrap().purge_threshold = threshold;
    }

    pub fn set_fail(&self, fail: bool) {
        self.store.lock().unwrap().fail = fail;
    }

    pub fn set_fail_repair(&self, fail: bool) {
        self.store.lock().unwrap().fail_repair = fail;
    }

    pub fn purged(&self) -> Vec<Uid> {
        self.store.lock().unwrap().purged.clone()
    }

    pub fn recent_batches(&self) -> Vec<usize> {
        self.store.lock().unwrap().recent_batches.clone()
    }

    pub fn recent_uids(&self) -> Vec<Uid> {
        let s = self.store.lock().unwrap();
        s.messages
            .iter()
            .filter(|m| m.recent)
            .map(|m| m.uid as Uid)
            .collect()
    }
}

fn matching(s: &Store, since_seq: Option<SeqId>, max_status: i16) -> Vec<MessageRow> {
    let mut rows: Vec<MessageRow> = s
        .messages
        .iter()
        .filter(|m| m.status <= max_status)
        .filter(|m| since_seq.map_or(true, |since| m.seq >= since as i64))
        .cloned()
        .collect();
    rows.sort_by_key(|m| m.uid);
    rows
}

#[async_trait]
impl RowSource for FakeRows {
    async fn fetch_mailbox_meta(&self, mailbox_id: MailboxId) -> Result<Option<MailboxMetaRow>> {
        let s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Ok(None);
        }

        let visible: Vec<&MessageRow> =
            s.messages.iter().filter(|m| m.status < s.purge_threshold).collect();
        let exists = visible.len() as i64;
        let seen = visible.iter().filter(|m| m.seen).count() as i64;
        let recent = visible.iter().filter(|m| m.recent).count() as i64;
        let uidnext = s.messages.iter().map(|m| m.uid).max().map_or(1, |uid| uid + 1);

        Ok(Some(MailboxMetaRow {
            mailbox_id,
            owner_id: s.owner_id,
            name: s.name.clone(),
            permission: s.permission,
            no_select: false,
            no_inferiors: false,
            no_children: true,
            is_subscribed: true,
            seq: s.seq,
            uidnext,
            exists,
            unseen: exists - seen,
            recent,
        }))
    }

    async fn fetch_messages(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<MessageRow>> {
        let s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Ok(Vec::new());
        }
        Ok(matching(&s, since_seq, max_status))
    }

    async fn fetch_keywords(
        &self,
        mailbox_id: MailboxId,
        since_seq: Option<SeqId>,
        max_status: i16,
    ) -> Result<Vec<KeywordRow>> {
        let s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Ok(Vec::new());
        }
        let uids: Vec<i64> = matching(&s, since_seq, max_status)
            .iter()
            .map(|m| m.uid)
            .collect();
        Ok(s.keywords
            .iter()
            .filter(|k| uids.contains(&k.uid))
            .cloned()
            .collect())
    }

    async fn fetch_seq(&self, mailbox_id: MailboxId) -> Result<SeqId> {
        let s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Err(Error::NotFound(format!("mailbox {}", mailbox_id)));
        }
        Ok(s.seq as SeqId)
    }

    async fn fetch_acl(&self, mailbox_id: MailboxId, user_id: UserId) -> Result<Option<AclRow>> {
        let s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Ok(None);
        }
        Ok(s.acl.get(&user_id).copied())
    }

    async fn mark_purged(&self, uid: Uid) -> Result<()> {
        let mut s = self.store.lock().unwrap();
        if s.fail || s.fail_repair {
            return Err(Error::Database("injected failure".to_string()));
        }
        if let Some(row) = s.messages.iter_mut().find(|m| m.uid == uid as i64) {
            row.status = 3;
        }
        s.purged.push(uid);
        Ok(())
    }

    async fn clear_recent_flags(
        &self,
        mailbox_id: MailboxId,
        uids: &[Uid],
        guard_seq: SeqId,
    ) -> Result<u64> {
        let mut s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Ok(0);
        }
        s.recent_batches.push(uids.len());
        let mut changed = 0;
        for row in s.messages.iter_mut() {
            if uids.contains(&(row.uid as Uid)) && row.recent && row.seq < guard_seq as i64 {
                row.recent = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn bump_seq(&self, mailbox_id: MailboxId) -> Result<SeqId> {
        let mut s = self.store.lock().unwrap();
        if s.fail {
            return Err(Error::Database("injected failure".to_string()));
        }
        if mailbox_id != s.mailbox_id {
            return Err(Error::NotFound(format!("mailbox {}", mailbox_id)));
        }
        s.seq += 1;
        Ok(s.seq as SeqId)
    }
}
