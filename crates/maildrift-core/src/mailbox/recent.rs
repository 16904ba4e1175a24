//! \Recent bookkeeping

use super::state::MailboxState;
use maildrift_common::types::{Permission, Uid};
use maildrift_common::Result;
use maildrift_storage::repository::RowSource;
use tracing::debug;

impl MailboxState {
    /// Queue every cached message currently flagged \Recent for a later
    /// flush. Only meaningful on a read-write selection; EXAMINE must not
    /// consume \Recent.
    pub fn build_recent(&mut self) {
        if self.permission != Permission::ReadWrite {
            return;
        }
        for (uid, message) in &self.messages {
            if message.flags.recent {
                self.recent_queue.insert(*uid);
            }
        }
        debug!(queued = self.recent_queue.len(), "queued recent messages");
    }

    /// Clear the \Recent bit on every cached message and drop the queue.
    pub fn clear_recent(&mut self) {
        for message in self.messages.values_mut() {
            message.flags.recent = false;
        }
        self.recent_queue.clear();
        self.recent = 0;
    }

    /// Write the queued \Recent transitions back to the store.
    ///
    /// The queue is flushed in bounded batches. Each update is guarded so
    /// rows another session touched after this cache's last load keep
    /// their flag; the mailbox seq is bumped once when any batch changed
    /// rows. The queue empties on success regardless of batch count.
    pub async fn flush_recent(&mut self, rows: &dyn RowSource) -> Result<()> {
        if self.recent_queue.is_empty() || self.permission != Permission::ReadWrite {
            return Ok(());
        }

        // the sequence value the bump below will assign
        let guard_seq = self.seq + 1;
        let uids: Vec<Uid> = self.recent_queue.iter().copied().collect();

        let mut changed = 0u64;
        for batch in uids.chunks(self.config.recent_flush_batch.max(1)) {
            changed += rows.clear_recent_flags(self.id, batch, guard_seq).await?;
        }

        if changed > 0 {
            self.seq = rows.bump_seq(self.id).await?;
        }

        self.recent_queue.clear();
        debug!(flushed = uids.len(), changed, "flushed recent queue");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::FakeRows;
    use super::*;
    use maildrift_common::config::StateConfig;
    use pretty_assertions::assert_eq;

    async fn loaded_state(rows: &FakeRows, config: &StateConfig) -> MailboxState {
        MailboxState::load_cold(rows, config, 1).await.unwrap()
    }

    fn recent_rows(count: u64) -> FakeRows {
        let rows = FakeRows::new(1, 7);
        for uid in 1..=count {
            rows.add_message(uid, 2, 0);
            rows.set_flags(uid, false, true, false);
        }
        rows
    }

    #[tokio::test]
    async fn test_build_recent_queues_flagged_messages() {
        let rows = recent_rows(3);
        rows.add_message(4, 2, 0); // not recent

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.build_recent();

        assert_eq!(state.recent_queue.len(), 3);
    }

    #[tokio::test]
    async fn test_build_recent_is_a_noop_when_read_only() {
        let rows = recent_rows(2);
        rows.set_permission(1);

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.build_recent();

        assert!(state.recent_queue.is_empty());
    }

    #[tokio::test]
    async fn test_clear_recent_clears_cache_and_queue() {
        let rows = recent_rows(2);

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.build_recent();
        state.clear_recent();

        assert!(state.recent_queue.is_empty());
        assert_eq!(state.recent(), 0);
        assert!(!state.message_by_uid(1).unwrap().flags.recent);
    }

    #[tokio::test]
    async fn test_flush_recent_batches_and_bumps_seq_once() {
        let mut config = StateConfig::default();
        config.recent_flush_batch = 2;

        let rows = recent_rows(5);
        let mut state = loaded_state(&rows, &config).await;
        let seq_before = state.seq();
        state.build_recent();

        state.flush_recent(&rows).await.unwrap();

        assert_eq!(rows.recent_batches(), vec![2, 2, 1]);
        assert!(rows.recent_uids().is_empty());
        assert_eq!(state.seq(), seq_before + 1);
        assert!(state.recent_queue.is_empty());
    }

    #[tokio::test]
    async fn test_flush_guard_spares_concurrently_flagged_rows() {
        let rows = recent_rows(2);

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.build_recent();

        // another session re-flags uid 2 after our load
        rows.set_status(2, 0, 50);
        rows.set_flags(2, false, true, false);

        state.flush_recent(&rows).await.unwrap();

        assert_eq!(rows.recent_uids(), vec![2]);
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_queue() {
        let rows = recent_rows(2);

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.build_recent();
        rows.set_fail(true);

        assert!(state.flush_recent(&rows).await.is_err());
        assert_eq!(state.recent_queue.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_touches_nothing() {
        let rows = recent_rows(1);

        let mut state = loaded_state(&rows, &StateConfig::default()).await;
        state.flush_recent(&rows).await.unwrap();

        assert!(rows.recent_batches().is_empty());
    }
}
