//! Per-transaction history of an account.

use serde::Serialize;

use lws_core::error::Expect;
use lws_core::types::{Account, BlockId};
use lws_db::StorageReader;

use crate::lock::LockContext;
use crate::merge::{TransactionView, merge_transactions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressTxs {
    pub total_received: u64,
    pub total_sent: u64,
    pub locked_funds: u64,
    pub scanned_height: BlockId,
    pub start_height: BlockId,
    pub blockchain_height: BlockId,
    pub transactions: Vec<TransactionView>,
}

pub fn address_txs(
    reader: &StorageReader<'_>,
    account: &Account,
    lock: &LockContext,
) -> Expect<AddressTxs> {
    let mut outputs = reader.get_outputs(account.id)?;
    let mut spends = reader.get_spends(account.id)?;

    let merged = merge_transactions(outputs.make_iterator(), spends.make_iterator(), lock);
    outputs.status()?;
    spends.status()?;

    tracing::debug!(id = %account.id, transactions = merged.transactions.len(), "address txs");

    Ok(AddressTxs {
        total_received: merged.totals.received,
        total_sent: merged.totals.sent,
        locked_funds: merged.totals.locked,
        scanned_height: account.scan_height,
        start_height: account.start_height,
        blockchain_height: lock.last_block,
        transactions: merged.transactions,
    })
}
