//! Mailbox state and the UID/MSN remapper

use maildrift_common::config::StateConfig;
use maildrift_common::types::{MailboxId, MessageFlags, Msn, Permission, SeqId, Uid, UserId};
use maildrift_common::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Cached metadata of one message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    /// Message UID, immutable once created
    pub uid: Uid,
    /// Owning mailbox
    pub mailbox_id: MailboxId,
    /// Backing content identifier
    pub phys_id: u64,
    /// Position among visible messages, recomputed on every remap
    pub msn: Msn,
    /// System flags
    pub flags: MessageFlags,
    /// Custom flags attached to this message
    pub keywords: Vec<String>,
    /// Receipt timestamp in IMAP wire format
    pub internal_date: String,
    /// Wire-format byte size
    pub rfc_size: u64,
    /// Mailbox change-sequence value as of this message's last touch
    pub seq: SeqId,
    /// Raw lifecycle status as stored
    pub status: i16,
    /// Consecutive load cycles this message was seen pending purge
    pub expunge_counter: u32,
}

/// In-memory view of one open mailbox.
///
/// Constructed by [`MailboxState::load_cold`] or refreshed from a prior
/// instance by [`MailboxState::load_differential`]; the positional
/// indexes are rebuilt wholesale by [`MailboxState::remap`] after every
/// change to the message map.
#[derive(Debug, Clone)]
pub struct MailboxState {
    pub(crate) id: MailboxId,
    pub(crate) uidnext: Uid,
    pub(crate) owner: Option<UserId>,
    pub(crate) permission: Permission,
    pub(crate) name: String,
    pub(crate) is_subscribed: bool,
    pub(crate) is_public: bool,
    pub(crate) is_users: bool,
    pub(crate) is_inbox: bool,
    pub(crate) no_select: bool,
    pub(crate) no_children: bool,
    pub(crate) no_inferiors: bool,
    pub(crate) seq: SeqId,
    pub(crate) state_seq: SeqId,
    pub(crate) differential_iterations: u32,
    pub(crate) exists: u32,
    pub(crate) unseen: u32,
    pub(crate) recent: u32,
    pub(crate) keywords: BTreeSet<String>,
    pub(crate) messages: BTreeMap<Uid, MessageInfo>,
    pub(crate) uid_index: BTreeMap<Uid, Msn>,
    pub(crate) msn_index: BTreeMap<Msn, Uid>,
    pub(crate) recent_queue: BTreeSet<Uid>,
    pub(crate) config: StateConfig,
}

impl MailboxState {
    pub(crate) fn new(id: MailboxId, config: StateConfig) -> Self {
        Self {
            id,
            uidnext: 0,
            owner: None,
            permission: Permission::ReadOnly,
            name: String::new(),
            is_subscribed: false,
            is_public: false,
            is_users: false,
            is_inbox: false,
            no_select: false,
            no_children: true,
            no_inferiors: false,
            seq: 0,
            state_seq: 0,
            differential_iterations: 0,
            exists: 0,
            unseen: 0,
            recent: 0,
            keywords: BTreeSet::new(),
            messages: BTreeMap::new(),
            uid_index: BTreeMap::new(),
            msn_index: BTreeMap::new(),
            recent_queue: BTreeSet::new(),
            config,
        }
    }

    /// Rebuild the UID->MSN and MSN->UID indexes from scratch.
    ///
    /// MSNs are assigned densely from 1 in ascending UID order over the
    /// visible entries. Removing message k shifts every MSN above it, so
    /// the rebuild is always wholesale, never incremental.
    pub fn remap(&mut self) {
        self.uid_index.clear();
        self.msn_index.clear();

        let threshold = self.config.purge_threshold;
        let mut msn: Msn = 0;
        for (uid, info) in self.messages.iter_mut() {
            if info.status >= threshold {
                continue;
            }
            msn += 1;
            info.msn = msn;
            self.uid_index.insert(*uid, msn);
            self.msn_index.insert(msn, *uid);
        }

        debug!(
            uids = self.uid_index.len(),
            msns = self.msn_index.len(),
            "remapped positional indexes"
        );
    }

    /// Insert a message the session just appended and reindex.
    pub fn add_message(&mut self, uid: Uid, info: MessageInfo) {
        if uid >= self.uidnext {
            self.uidnext = uid + 1;
        }
        self.messages.insert(uid, info);
        self.remap();
    }

    /// Drop a message from the cached view and reindex.
    pub fn remove_uid(&mut self, uid: Uid) -> Result<()> {
        if self.messages.remove(&uid).is_none() {
            warn!(uid, "trying to remove unknown UID");
            return Err(Error::NotFound(format!("uid {}", uid)));
        }

        self.exists = self.exists.saturating_sub(1);
        self.remap();

        Ok(())
    }

    /// Append a keyword to one cached message without a reload.
    pub fn merge_keyword(&mut self, uid: Uid, keyword: &str) {
        if let Some(info) = self.messages.get_mut(&uid) {
            if !info.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                info.keywords.push(keyword.to_string());
            }
        }
        self.add_keyword(keyword);
    }

    /// Number of visible messages.
    ///
    /// The counter lazily self-heals: when the live map holds more
    /// entries than the cached value, the counter is raised to match.
    pub fn exists(&mut self) -> u32 {
        let real = self.messages.len() as u32;
        if real > self.exists {
            self.exists = real;
        }
        self.exists
    }

    /// Pin the exists counter, e.g. to keep EXISTS from shrinking before
    /// an expunge has been announced.
    pub fn set_exists(&mut self, exists: u32) {
        self.exists = exists;
    }

    pub fn unseen(&self) -> u32 {
        self.unseen
    }

    pub fn recent(&self) -> u32 {
        self.recent
    }

    pub fn set_recent(&mut self, recent: u32) {
        self.recent = recent;
    }

    pub fn uidnext(&self) -> Uid {
        self.uidnext
    }

    pub fn mailbox_id(&self) -> MailboxId {
        self.id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seq(&self) -> SeqId {
        self.seq
    }

    /// Differential-load watermark: the mailbox seq as of the last load.
    pub fn state_seq(&self) -> SeqId {
        self.state_seq
    }

    pub fn is_subscribed(&self) -> bool {
        self.is_subscribed
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn is_users(&self) -> bool {
        self.is_users
    }

    pub fn is_inbox(&self) -> bool {
        self.is_inbox
    }

    /// An unsubscribed mailbox is not selectable.
    pub fn no_select(&mut self) -> bool {
        if !self.is_subscribed {
            self.no_select = true;
        }
        self.no_select
    }

    pub fn no_children(&self) -> bool {
        self.no_children
    }

    pub fn no_inferiors(&self) -> bool {
        self.no_inferiors
    }

    /// Whether a custom flag name is known in this mailbox.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    pub fn add_keyword(&mut self, keyword: &str) {
        if !self.has_keyword(keyword) {
            self.keywords.insert(keyword.to_string());
        }
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    /// Space-joined summary of the permanent system flags and the
    /// mailbox's keywords, as announced in the FLAGS response.
    pub fn flags(&self) -> String {
        let mut out = String::from("\\Seen \\Answered \\Deleted \\Flagged \\Draft");
        for keyword in &self.keywords {
            out.push(' ');
            out.push_str(keyword);
        }
        out
    }

    pub fn message_by_uid(&self, uid: Uid) -> Option<&MessageInfo> {
        self.messages.get(&uid)
    }

    pub fn message_by_msn(&self, msn: Msn) -> Option<&MessageInfo> {
        self.msn_index.get(&msn).and_then(|uid| self.messages.get(uid))
    }

    /// MSN of a visible message.
    pub fn msn_of(&self, uid: Uid) -> Option<Msn> {
        self.uid_index.get(&uid).copied()
    }

    /// UID at a given position.
    pub fn uid_at(&self, msn: Msn) -> Option<Uid> {
        self.msn_index.get(&msn).copied()
    }

    /// Release the cached view. Idempotent; dropping the state has the
    /// same effect.
    pub fn close(&mut self) {
        self.messages.clear();
        self.uid_index.clear();
        self.msn_index.clear();
        self.keywords.clear();
        self.recent_queue.clear();
        self.exists = 0;
        self.unseen = 0;
        self.recent = 0;
    }
}
