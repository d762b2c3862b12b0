//! Stream-merge reconstruction.
//!
//! Outputs are keyed by their [`OutputId`]; spends by the id of the output
//! they spend (`source`). Both streams arrive in non-decreasing key order, so
//! one merge-join pass pairs every spend with the output it consumes.
//!
//! Two shapes are produced:
//! - [`merge_transactions`]: per-transaction aggregates, outputs sharing a
//!   transaction hash folded together and each spend attached to the
//!   transaction that created the spent output.
//! - [`merge_outputs`]: one entry per output with its spends and lock flag.
//!
//! A spend without a matching output, or keys going backwards, means the
//! writer broke the store contract; both abort through [`raise`].

use std::iter::Peekable;

use serde::Serialize;

use lws_core::error::{ConsistencyViolation, raise};
use lws_core::types::{BlockId, Hash256, Output, OutputId, PaymentId, PublicKey, Spend, SpendMeta};

use crate::lock::LockContext;

/// Received outputs seen so far, ordered by id, each tagged with the result
/// slot its spends attach to.
#[derive(Debug, Default)]
pub struct MetaIndex {
    entries: Vec<(SpendMeta, usize)>,
}

impl MetaIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Insert keeping id order. Appending is the common case.
    pub fn insert(&mut self, meta: SpendMeta, slot: usize) {
        match self.entries.last() {
            Some((last, _)) if last.id >= meta.id => {
                let at = self.entries.partition_point(|(m, _)| m.id < meta.id);
                self.entries.insert(at, (meta, slot));
            }
            _ => self.entries.push((meta, slot)),
        }
    }

    pub fn find(&self, id: OutputId) -> Option<(&SpendMeta, usize)> {
        let at = self.entries.partition_point(|(m, _)| m.id < id);
        match self.entries.get(at) {
            Some((meta, slot)) if meta.id == id => Some((meta, *slot)),
            _ => None,
        }
    }

    /// Like [`find`](Self::find), but a miss is a consistency fault.
    pub fn require(&self, id: OutputId) -> (&SpendMeta, usize) {
        self.find(id)
            .unwrap_or_else(|| raise(ConsistencyViolation::NoReceiveForSpend { output: id }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A spend paired with the output it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpentOutput {
    pub amount: u64,
    pub key_image: Hash256,
    pub tx_pub_key: PublicKey,
    pub out_index: u32,
    pub mixin: u32,
    /// Transaction that spent the output.
    pub spend_height: BlockId,
    pub spend_tx_hash: Hash256,
}

impl SpentOutput {
    pub fn new(meta: &SpendMeta, spend: &Spend) -> Self {
        Self {
            amount: meta.amount,
            key_image: spend.image,
            tx_pub_key: meta.tx_public,
            out_index: meta.index,
            mixin: spend.mixin_count,
            spend_height: spend.link.height,
            spend_tx_hash: spend.link.tx_hash,
        }
    }
}

/// Account-wide running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub received: u64,
    pub sent: u64,
    pub locked: u64,
}

impl Totals {
    fn receive(&mut self, amount: u64, locked: bool) {
        self.received = self.received.saturating_add(amount);
        if locked {
            self.locked = self.locked.saturating_add(amount);
        }
    }

    fn spend(&mut self, amount: u64) {
        self.sent = self.sent.saturating_add(amount);
    }
}

/// Everything the account received in, and spent from, one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub hash: Hash256,
    pub height: BlockId,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub total_received: u64,
    pub total_sent: u64,
    pub locked: bool,
    pub coinbase: bool,
    pub mixin: u32,
    pub payment_id: Option<PaymentId>,
    pub spent_outputs: Vec<SpentOutput>,
}

impl TransactionView {
    fn from_output(output: &Output, locked: bool) -> Self {
        Self {
            hash: output.link.tx_hash,
            height: output.link.height,
            timestamp: output.timestamp,
            unlock_time: output.unlock_time,
            total_received: output.spend_meta.amount,
            total_sent: 0,
            locked,
            coinbase: output.extra.is_coinbase(),
            mixin: output.spend_meta.mixin_count,
            payment_id: output.payment_id,
            spent_outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionMerge {
    pub transactions: Vec<TransactionView>,
    pub totals: Totals,
}

/// One output with its spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputEntry {
    pub output: Output,
    pub spends: Vec<SpentOutput>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputMerge {
    pub outputs: Vec<OutputEntry>,
    pub totals: Totals,
}

/// Advance `trailing` to `next`, raising if the key went backwards.
pub(crate) fn advance_key(trailing: &mut Option<OutputId>, next: OutputId) {
    if let Some(trailing) = *trailing {
        if next < trailing {
            raise(ConsistencyViolation::UnexpectedSortOrder { trailing, next });
        }
    }
    *trailing = Some(next);
}

enum Next {
    Output,
    Spend,
}

fn choose<O, S>(
    outputs: &mut Peekable<O>,
    spends: &mut Peekable<S>,
    trailing: Option<OutputId>,
) -> Option<Next>
where
    O: Iterator<Item = Output>,
    S: Iterator<Item = Spend>,
{
    let next_output = outputs.peek().map(|o| o.spend_meta.id);
    let next_spend = spends.peek().map(|s| s.source);

    if let Some(trailing) = trailing {
        for next in [next_output, next_spend].into_iter().flatten() {
            if next < trailing {
                raise(ConsistencyViolation::UnexpectedSortOrder { trailing, next });
            }
        }
    }

    match (next_output, next_spend) {
        (None, None) => None,
        (Some(_), None) => Some(Next::Output),
        (None, Some(_)) => Some(Next::Spend),
        (Some(o), Some(s)) if o <= s => Some(Next::Output),
        (Some(_), Some(_)) => Some(Next::Spend),
    }
}

/// Fold an account's outputs and spends into per-transaction aggregates.
///
/// Both inputs must be in non-decreasing key order; a key lower than the
/// last one consumed from either side is fatal.
pub fn merge_transactions<O, S>(outputs: O, spends: S, lock: &LockContext) -> TransactionMerge
where
    O: IntoIterator<Item = Output>,
    S: IntoIterator<Item = Spend>,
{
    let mut outputs = outputs.into_iter().peekable();
    let mut spends = spends.into_iter().peekable();
    let mut index = MetaIndex::with_capacity(outputs.size_hint().0);
    let mut transactions: Vec<TransactionView> = Vec::new();
    let mut totals = Totals::default();
    let mut trailing = None;

    while let Some(next) = choose(&mut outputs, &mut spends, trailing) {
        match next {
            Next::Output => {
                let Some(output) = outputs.next() else { break };
                let meta = output.spend_meta;
                let locked = lock.is_output_locked(&output);
                trailing = Some(meta.id);

                match transactions.last_mut() {
                    Some(tx) if tx.hash == output.link.tx_hash => {
                        tx.total_received = tx.total_received.saturating_add(meta.amount);
                        tx.locked |= locked;
                    }
                    _ => transactions.push(TransactionView::from_output(&output, locked)),
                }
                index.insert(meta, transactions.len() - 1);
                totals.receive(meta.amount, locked);
            }
            Next::Spend => {
                let Some(spend) = spends.next() else { break };
                trailing = Some(spend.source);

                let (meta, slot) = index.require(spend.source);
                let tx = &mut transactions[slot];
                tx.total_sent = tx.total_sent.saturating_add(meta.amount);
                tx.spent_outputs.push(SpentOutput::new(meta, &spend));
                totals.spend(meta.amount);
            }
        }
    }

    TransactionMerge { transactions, totals }
}

/// Pair every output with its spends, keeping output order.
///
/// Same ordering contract as [`merge_transactions`].
pub fn merge_outputs<O, S>(outputs: O, spends: S, lock: &LockContext) -> OutputMerge
where
    O: IntoIterator<Item = Output>,
    S: IntoIterator<Item = Spend>,
{
    let mut outputs = outputs.into_iter().peekable();
    let mut spends = spends.into_iter().peekable();
    let mut index = MetaIndex::with_capacity(outputs.size_hint().0);
    let mut entries: Vec<OutputEntry> = Vec::with_capacity(outputs.size_hint().0);
    let mut totals = Totals::default();
    let mut trailing = None;

    while let Some(next) = choose(&mut outputs, &mut spends, trailing) {
        match next {
            Next::Output => {
                let Some(output) = outputs.next() else { break };
                let locked = lock.is_output_locked(&output);
                trailing = Some(output.spend_meta.id);
                totals.receive(output.spend_meta.amount, locked);
                index.insert(output.spend_meta, entries.len());
                entries.push(OutputEntry { output, spends: Vec::new(), locked });
            }
            Next::Spend => {
                let Some(spend) = spends.next() else { break };
                trailing = Some(spend.source);

                let (meta, slot) = index.require(spend.source);
                totals.spend(meta.amount);
                entries[slot].spends.push(SpentOutput::new(meta, &spend));
            }
        }
    }

    OutputMerge { outputs: entries, totals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lws_core::types::{AccountId, Extra, TransactionLink};

    fn output(height: u64, index: u32, amount: u64, tx: u8) -> Output {
        Output {
            spend_meta: SpendMeta {
                id: OutputId::new(height, index),
                amount,
                mixin_count: 4,
                index,
                tx_public: PublicKey([tx; 32]),
            },
            link: TransactionLink { height: BlockId(height), tx_hash: Hash256([tx; 32]) },
            account: AccountId(1),
            timestamp: 100,
            unlock_time: 0,
            tx_prefix_hash: Hash256::ZERO,
            ringct_mask: [0; 32],
            extra: Extra::NONE,
            payment_id: None,
        }
    }

    fn spend(source: OutputId, image: u8) -> Spend {
        Spend {
            source,
            link: TransactionLink { height: BlockId(50), tx_hash: Hash256([0xcc; 32]) },
            image: Hash256([image; 32]),
            mixin_count: 4,
            timestamp: 200,
            unlock_time: 0,
            account: AccountId(1),
        }
    }

    fn lock() -> LockContext {
        LockContext::new(BlockId(1_000), 1_700_000_000)
    }

    #[test]
    fn meta_index_keeps_order() {
        let meta = |h| output(h, 0, h, 1).spend_meta;
        let mut index = MetaIndex::default();
        index.insert(meta(5), 0);
        index.insert(meta(9), 1);
        index.insert(meta(7), 2);
        assert_eq!(index.len(), 3);
        assert_eq!(index.find(OutputId::new(7, 0)).map(|(_, s)| s), Some(2));
        assert_eq!(index.find(OutputId::new(9, 0)).map(|(_, s)| s), Some(1));
        assert!(index.find(OutputId::new(8, 0)).is_none());
        assert!(index.find(OutputId::new(10, 0)).is_none());
    }

    #[test]
    fn advance_key_accepts_repeats() {
        let mut trailing = None;
        for (height, index) in [(3, 0), (3, 0), (3, 1), (8, 0)] {
            let id = OutputId::new(height, index);
            advance_key(&mut trailing, id);
        }
        assert_eq!(trailing, Some(OutputId::new(8, 0)));
    }

    #[test]
    #[should_panic(expected = "unexpected sort order")]
    fn advance_key_rejects_decrease() {
        let mut trailing = Some(OutputId::new(3, 1));
        advance_key(&mut trailing, OutputId::new(3, 0));
    }

    #[test]
    fn outputs_of_one_transaction_fold_together() {
        let outputs = vec![output(10, 0, 10, 0xa), output(10, 1, 5, 0xa), output(11, 0, 7, 0xb)];
        let spends = vec![spend(OutputId::new(10, 0), 1)];
        let merged = merge_transactions(outputs, spends, &lock());

        assert_eq!(merged.transactions.len(), 2);
        let a = &merged.transactions[0];
        assert_eq!((a.hash, a.total_received, a.total_sent), (Hash256([0xa; 32]), 15, 10));
        assert_eq!(a.spent_outputs.len(), 1);
        assert_eq!(a.spent_outputs[0].key_image, Hash256([1; 32]));
        let b = &merged.transactions[1];
        assert_eq!((b.hash, b.total_received, b.total_sent), (Hash256([0xb; 32]), 7, 0));
        assert_eq!(merged.totals, Totals { received: 22, sent: 10, locked: 0 });
    }

    #[test]
    fn spend_attaches_to_creating_transaction() {
        let outputs = vec![output(10, 0, 3, 0xa), output(11, 0, 4, 0xb), output(12, 0, 5, 0xc)];
        let spends = vec![spend(OutputId::new(11, 0), 1), spend(OutputId::new(11, 0), 2)];
        let merged = merge_transactions(outputs, spends, &lock());
        let sent: Vec<u64> = merged.transactions.iter().map(|t| t.total_sent).collect();
        assert_eq!(sent, vec![0, 8, 0]);
    }

    #[test]
    fn locked_outputs_are_totalled() {
        let mut late = output(20, 0, 9, 0xa);
        late.unlock_time = 5_000;
        let mut coinbase = output(990, 0, 1, 0xb);
        coinbase.extra = Extra::COINBASE;
        let outputs = vec![late, coinbase, output(991, 0, 2, 0xc)];
        let merged = merge_transactions(outputs, Vec::new(), &lock());
        assert_eq!(merged.totals.locked, 10);
        let flags: Vec<bool> = merged.transactions.iter().map(|t| t.locked).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert!(merged.transactions[1].coinbase);
    }

    #[test]
    fn empty_streams() {
        let merged = merge_transactions(Vec::new(), Vec::new(), &lock());
        assert!(merged.transactions.is_empty());
        assert_eq!(merged.totals, Totals::default());
    }

    #[test]
    #[should_panic(expected = "no receive for spend")]
    fn orphan_spend_is_fatal() {
        let outputs = vec![output(10, 0, 3, 0xa), output(12, 0, 5, 0xc)];
        merge_transactions(outputs, vec![spend(OutputId::new(11, 0), 1)], &lock());
    }

    #[test]
    #[should_panic(expected = "unexpected sort order")]
    fn decreasing_outputs_are_fatal() {
        let outputs = vec![output(12, 0, 3, 0xa), output(10, 0, 5, 0xc)];
        merge_transactions(outputs, Vec::new(), &lock());
    }

    #[test]
    #[should_panic(expected = "unexpected sort order")]
    fn decreasing_spends_are_fatal() {
        let outputs = vec![output(10, 0, 3, 0xa), output(12, 0, 5, 0xc)];
        let spends = vec![spend(OutputId::new(12, 0), 1), spend(OutputId::new(10, 0), 2)];
        merge_transactions(outputs, spends, &lock());
    }

    #[test]
    fn flat_merge_attaches_spends_per_output() {
        let outputs = vec![output(10, 0, 10, 0xa), output(10, 1, 5, 0xa), output(11, 0, 7, 0xb)];
        let spends = vec![spend(OutputId::new(10, 0), 1), spend(OutputId::new(11, 0), 2)];
        let merged = merge_outputs(outputs, spends, &lock());
        let counts: Vec<usize> = merged.outputs.iter().map(|e| e.spends.len()).collect();
        assert_eq!(counts, vec![1, 0, 1]);
        assert_eq!(merged.totals, Totals { received: 22, sent: 17, locked: 0 });
    }

    #[test]
    #[should_panic(expected = "no receive for spend")]
    fn flat_merge_orphan_spend_is_fatal() {
        merge_outputs(vec![output(10, 0, 1, 0xa)], vec![spend(OutputId::new(9, 0), 1)], &lock());
    }

    #[test]
    #[should_panic(expected = "unexpected sort order")]
    fn flat_merge_decreasing_outputs_are_fatal() {
        let outputs = vec![output(20, 0, 1, 0xa), output(10, 0, 2, 0xb)];
        let spends = vec![spend(OutputId::new(20, 0), 1), spend(OutputId::new(10, 0), 2)];
        merge_outputs(outputs, spends, &lock());
    }

    #[test]
    #[should_panic(expected = "unexpected sort order")]
    fn flat_merge_decreasing_spends_are_fatal() {
        let outputs = vec![output(10, 0, 3, 0xa), output(12, 0, 5, 0xc)];
        let spends = vec![spend(OutputId::new(12, 0), 1), spend(OutputId::new(10, 0), 2)];
        merge_outputs(outputs, spends, &lock());
    }
}
