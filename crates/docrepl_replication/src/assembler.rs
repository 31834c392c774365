//! Batch assembly: choosing which changes a round ships.

use crate::cancel::CancellationSignal;
use crate::config::ReplicationConfig;
use crate::error::ReplicationResult;
use docrepl_protocol::{ChangeItem, DestinationKnowledge, KeyFilter, PayloadPool, PooledPayload};
use tracing::debug;

/// What one round is going to send.
///
/// Document payloads live in pool buffers; dropping the plan, or any item
/// taken out of it, returns them to the pool.
#[derive(Debug)]
pub struct RoundPlan {
    /// Items that survived filtering, in etag order.
    pub items: Vec<ChangeItem<PooledPayload>>,
    /// Etag of the last item considered, shipped or not.
    pub new_last_etag: u64,
    /// True if the round moves the destination forward.
    pub has_progress: bool,
    /// Items read from the feed and counted against the caps.
    pub considered: usize,
    /// Considered items that were withheld.
    pub filtered: usize,
    /// Document payload bytes in `items`.
    pub payload_bytes: usize,
}

impl RoundPlan {
    fn empty(last_sent_etag: u64) -> Self {
        Self {
            items: Vec::new(),
            new_last_etag: last_sent_etag,
            has_progress: false,
            considered: 0,
            filtered: 0,
            payload_bytes: 0,
        }
    }

    /// True if the round advances the etag without shipping anything.
    pub fn is_heartbeat(&self) -> bool {
        self.has_progress && self.items.is_empty()
    }
}

/// Why an item was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    SystemKey,
    AlreadyKnown,
}

/// Turns a merged change feed into a [`RoundPlan`].
///
/// The assembler walks the feed in etag order and stops at the first
/// transaction boundary after either cap is reached, so writes committed
/// together always travel in the same batch. A single transaction larger
/// than the caps is shipped whole.
///
/// Items whose key is local-only, or whose change vector the destination
/// already dominates, are withheld but still advance `new_last_etag`.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    max_items: usize,
    max_bytes: usize,
    filter: KeyFilter,
    pool: PayloadPool,
}

impl BatchAssembler {
    /// Creates an assembler with the caps and key filter from `config`.
    pub fn new(config: &ReplicationConfig, pool: PayloadPool) -> Self {
        Self {
            max_items: config.max_items_per_batch,
            max_bytes: config.max_batch_bytes,
            filter: config.key_filter(),
            pool,
        }
    }

    /// Pool that surviving payloads are copied into.
    pub fn pool(&self) -> &PayloadPool {
        &self.pool
    }

    /// Assembles one round from `feed`.
    ///
    /// `feed` must yield items in ascending etag order; items at or below
    /// `last_sent_etag` are ignored.
    pub fn build_round<I>(
        &self,
        feed: I,
        last_sent_etag: u64,
        knowledge: &DestinationKnowledge,
    ) -> RoundPlan
    where
        I: IntoIterator<Item = ChangeItem>,
    {
        let mut plan = RoundPlan::empty(last_sent_etag);
        let mut last_marker = None;
        for item in feed {
            if !self.consider(&mut plan, &mut last_marker, item, last_sent_etag, knowledge) {
                break;
            }
        }
        plan.has_progress = plan.new_last_etag != last_sent_etag;
        plan
    }

    /// Like [`build_round`](Self::build_round), checking `cancel` before
    /// each item.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Cancelled`](crate::ReplicationError::Cancelled)
    /// if cancellation is requested; the partial plan is dropped.
    pub fn build_round_cancellable<I>(
        &self,
        feed: I,
        last_sent_etag: u64,
        knowledge: &DestinationKnowledge,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<RoundPlan>
    where
        I: IntoIterator<Item = ChangeItem>,
    {
        let mut plan = RoundPlan::empty(last_sent_etag);
        let mut last_marker = None;
        for item in feed {
            cancel.check()?;
            if !self.consider(&mut plan, &mut last_marker, item, last_sent_etag, knowledge) {
                break;
            }
        }
        plan.has_progress = plan.new_last_etag != last_sent_etag;
        Ok(plan)
    }

    /// Adds `item` to the plan. Returns false when the batch is closed.
    fn consider(
        &self,
        plan: &mut RoundPlan,
        last_marker: &mut Option<i16>,
        item: ChangeItem,
        last_sent_etag: u64,
        knowledge: &DestinationKnowledge,
    ) -> bool {
        if item.etag() <= last_sent_etag {
            return true;
        }

        let marker = item.transaction_marker();
        if *last_marker != Some(marker) {
            if plan.considered >= self.max_items || plan.payload_bytes >= self.max_bytes {
                return false;
            }
            *last_marker = Some(marker);
        }

        plan.considered += 1;
        plan.new_last_etag = item.etag();

        if let Some(reason) = self.skip_reason(&item, knowledge) {
            plan.filtered += 1;
            debug!(
                etag = item.etag(),
                key = %String::from_utf8_lossy(item.key()),
                reason = ?reason,
                "withholding item"
            );
            return true;
        }

        let item = item.map_payload(|data| self.pool.copy_from(&data));
        plan.payload_bytes += item.payload_len();
        plan.items.push(item);
        true
    }

    fn skip_reason(&self, item: &ChangeItem, knowledge: &DestinationKnowledge) -> Option<SkipReason> {
        if self.filter.should_skip(item.key()) {
            Some(SkipReason::SystemKey)
        } else if knowledge.has_seen(item.change_vector()) {
            Some(SkipReason::AlreadyKnown)
        } else {
            None
        }
    }
}
