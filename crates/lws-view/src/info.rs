//! Address summary: totals and spent outputs, without full output decode.

use serde::Serialize;

use lws_core::error::Expect;
use lws_core::types::{Account, BlockId, OutputExtra, OutputLink, OutputSpendMeta, OutputUnlockTime};
use lws_db::StorageReader;

use crate::lock::LockContext;
use crate::merge::{MetaIndex, SpentOutput, Totals, advance_key};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub locked_funds: u64,
    pub total_received: u64,
    pub total_sent: u64,
    pub scanned_height: BlockId,
    pub start_height: BlockId,
    pub blockchain_height: BlockId,
    pub spent_outputs: Vec<SpentOutput>,
}

/// Summarise `account` as of the reader's snapshot.
///
/// Outputs are read through field projections; only the spend metadata,
/// unlock time, link and extra bytes of each row are decoded. Either stream
/// going backwards in key order is a consistency fault.
pub fn address_info(
    reader: &StorageReader<'_>,
    account: &Account,
    lock: &LockContext,
) -> Expect<AddressInfo> {
    let mut outputs = reader.get_outputs(account.id)?;
    let mut index = MetaIndex::with_capacity(usize::try_from(outputs.count()).unwrap_or(0));
    let mut totals = Totals::default();
    let mut trailing = None;

    {
        let mut it = outputs.make_iterator();
        while let Some(meta) = it.get_value::<OutputSpendMeta>() {
            let (Some(unlock_time), Some(link), Some(extra)) = (
                it.get_value::<OutputUnlockTime>(),
                it.get_value::<OutputLink>(),
                it.get_value::<OutputExtra>(),
            ) else {
                break;
            };

            advance_key(&mut trailing, meta.id);
            totals.received = totals.received.saturating_add(meta.amount);
            if lock.is_locked(unlock_time, link.height, extra) {
                totals.locked = totals.locked.saturating_add(meta.amount);
            }
            index.insert(meta, 0);
            it.advance();
        }
    }
    outputs.status()?;

    let mut spends = reader.get_spends(account.id)?;
    let mut trailing = None;
    let spent_outputs: Vec<SpentOutput> = spends
        .make_iterator()
        .map(|spend| {
            advance_key(&mut trailing, spend.source);
            let (meta, _) = index.require(spend.source);
            totals.sent = totals.sent.saturating_add(meta.amount);
            SpentOutput::new(meta, &spend)
        })
        .collect();
    spends.status()?;

    tracing::debug!(
        id = %account.id,
        outputs = index.len(),
        spends = spent_outputs.len(),
        "address info"
    );

    Ok(AddressInfo {
        locked_funds: totals.locked,
        total_received: totals.received,
        total_sent: totals.sent,
        scanned_height: account.scan_height,
        start_height: account.start_height,
        blockchain_height: lock.last_block,
        spent_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lws_core::types::{
        AccountAddress, AccountId, BlockInfo, Extra, Hash256, Output, OutputId, PublicKey, Spend,
        SpendMeta, TransactionLink, ViewKey,
    };
    use lws_db::Storage;

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("light_wallet_server")).unwrap();
        (store, dir)
    }

    fn output(account: AccountId, id: OutputId, amount: u64, unlock_time: u64) -> Output {
        Output {
            spend_meta: SpendMeta {
                id,
                amount,
                mixin_count: 2,
                index: id.index(),
                tx_public: PublicKey([9; 32]),
            },
            link: TransactionLink {
                height: BlockId(id.height()),
                tx_hash: Hash256([id.height() as u8; 32]),
            },
            account,
            timestamp: 10,
            unlock_time,
            tx_prefix_hash: Hash256::ZERO,
            ringct_mask: [0; 32],
            extra: Extra::NONE,
            payment_id: None,
        }
    }

    #[test]
    fn totals_and_spent_outputs() {
        let (store, _dir) = temp_store();
        let address =
            AccountAddress { spend_public: PublicKey([1; 32]), view_public: PublicKey([2; 32]) };
        let id = store.add_account(&address, &ViewKey::default(), BlockId(0)).unwrap();

        let received =
            [output(id, OutputId::new(3, 0), 40, 0), output(id, OutputId::new(4, 0), 2, 100)];
        let block = BlockInfo { id: BlockId(4), hash: Hash256([4; 32]) };
        store.sync_block(&block, &received, &[], &[]).unwrap();
        let spend = Spend {
            source: OutputId::new(3, 0),
            link: TransactionLink { height: BlockId(5), tx_hash: Hash256([0x55; 32]) },
            image: Hash256([0x77; 32]),
            mixin_count: 2,
            timestamp: 20,
            unlock_time: 0,
            account: id,
        };
        let block = BlockInfo { id: BlockId(5), hash: Hash256([5; 32]) };
        store.sync_block(&block, &[], &[spend], &[]).unwrap();

        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address).unwrap();
        let lock = LockContext::new(reader.get_last_block().unwrap().id, 1_700_000_000);
        let info = address_info(&reader, &account, &lock).unwrap();

        assert_eq!(info.total_received, 42);
        assert_eq!(info.total_sent, 40);
        assert_eq!(info.locked_funds, 2);
        assert_eq!(info.blockchain_height, BlockId(5));
        assert_eq!(info.spent_outputs.len(), 1);
        assert_eq!(info.spent_outputs[0].key_image, Hash256([0x77; 32]));
        assert_eq!(info.spent_outputs[0].spend_tx_hash, Hash256([0x55; 32]));
    }
}
