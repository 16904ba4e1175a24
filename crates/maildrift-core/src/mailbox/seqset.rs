//! IMAP sequence-set resolution

use super::state::MailboxState;
use maildrift_common::{Error, Result};
use std::collections::BTreeMap;
use tracing::warn;

/// Some legacy clients send 0xffffffff where they mean `*`.
const LEGACY_WILDCARD: u64 = 0xffff_ffff;

fn parse_bound(token: &str, hi: u64) -> Result<u64> {
    if token == "*" {
        return Ok(hi);
    }
    match token.parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::InvalidRange(format!("bad bound '{}'", token))),
        Ok(LEGACY_WILDCARD) => Ok(hi),
        Ok(value) => Ok(value),
    }
}

impl MailboxState {
    /// Resolve a sequence-set expression such as `"1:5,7,9:*"` against
    /// the UID or MSN axis.
    ///
    /// Returns a map from requested-axis value to opposite-axis value;
    /// duplicates across tokens collapse naturally. A malformed token
    /// fails the whole call with no partial result. Against an empty
    /// mailbox, a UID-mode token containing `*` still matches: a single
    /// synthetic entry for `uidnext` (with no position assigned) is
    /// returned, since ranges ending in `*` must stay answerable.
    pub fn get_set(&self, expr: &str, by_uid: bool) -> Result<BTreeMap<u64, u64>> {
        let (lo, hi) = if by_uid {
            match (
                self.uid_index.keys().next().copied(),
                self.uid_index.keys().next_back().copied(),
            ) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => (0, 0),
            }
        } else {
            let max_msn = self.msn_index.len() as u64;
            if max_msn == 0 {
                return Err(Error::InvalidRange(
                    "no positions in an empty mailbox".to_string(),
                ));
            }
            if max_msn != self.exists as u64 {
                warn!(
                    exists = self.exists,
                    indexed = max_msn,
                    "mailbox info out of sync"
                );
            }
            (1, max_msn)
        };

        let mut result = BTreeMap::new();

        for token in expr.split(',') {
            if token.is_empty() {
                break;
            }

            if self.uid_index.is_empty() {
                if token.contains('*') {
                    result.insert(self.uidnext, 0);
                    continue;
                }
                return Err(Error::InvalidRange(format!(
                    "'{}' cannot match an empty mailbox",
                    token
                )));
            }

            let (left, right) = match token.split_once(':') {
                Some((left, right)) => (left, Some(right)),
                None => (token, None),
            };

            let mut low = parse_bound(left, hi)?.max(lo);
            let mut high = match right {
                Some(right) => parse_bound(right, hi)?.clamp(lo, hi),
                None => low,
            };
            if low > high {
                std::mem::swap(&mut low, &mut high);
            }

            if by_uid {
                for (&uid, &msn) in self.uid_index.range(low..=high) {
                    result.insert(uid, msn);
                }
            } else {
                for (&msn, &uid) in self.msn_index.range(low..=high) {
                    result.insert(msn, uid);
                }
            }
        }

        Ok(result)
    }
}
