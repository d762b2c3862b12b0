//! Flat per-output views: every received output with its spends, key
//! images, one-time public key and, for RingCT outputs, the client-facing
//! commitment fields.

use serde::Serialize;

use lws_core::crypto::{RctFields, derive_public_key, generate_key_derivation, reconstruct_ringct};
use lws_core::error::{Expect, LwsError};
use lws_core::types::{
    Account, BlockId, Hash256, KeyImageValue, Output, OutputId, PaymentId, PublicKey,
};
use lws_db::StorageReader;

use crate::lock::LockContext;
use crate::merge::{SpentOutput, Totals, merge_outputs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputView {
    pub id: OutputId,
    pub amount: u64,
    pub index: u32,
    pub mixin: u32,
    pub height: BlockId,
    pub tx_hash: Hash256,
    pub tx_prefix_hash: Hash256,
    pub tx_pub_key: PublicKey,
    pub timestamp: u64,
    pub unlock_time: u64,
    pub coinbase: bool,
    pub payment_id: Option<PaymentId>,
    /// One-time output key `H_s(aR ‖ i)·G + B`.
    pub public_key: PublicKey,
    pub rct: Option<RctFields>,
    pub key_images: Vec<Hash256>,
    pub spends: Vec<SpentOutput>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputViews {
    pub outputs: Vec<OutputView>,
    pub totals: Totals,
}

/// Filter for [`unspent_outputs`]. Missing fields take permissive defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnspentRequest {
    /// Minimum sum the selected outputs must reach.
    pub amount: u64,
    pub mixin: Option<u32>,
    pub use_dust: Option<bool>,
    pub dust_threshold: Option<u64>,
}

impl UnspentRequest {
    /// Outputs below this amount are skipped.
    pub fn threshold(&self) -> u64 {
        if self.use_dust.unwrap_or(false) {
            return 0;
        }
        self.dust_threshold.unwrap_or(0)
    }

    pub fn min_mixin(&self) -> u32 {
        self.mixin.unwrap_or(0)
    }

    pub fn accepts(&self, output: &Output) -> bool {
        output.spend_meta.amount >= self.threshold()
            && output.spend_meta.mixin_count >= self.min_mixin()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnspentOutputs {
    /// Sum of the selected outputs.
    pub amount: u64,
    pub outputs: Vec<OutputView>,
}

fn key_images(reader: &StorageReader<'_>, id: OutputId) -> Expect<Vec<Hash256>> {
    let mut images = reader.get_images(id)?;
    let values = images.make_field_iterator::<KeyImageValue>().collect();
    images.status()?;
    Ok(values)
}

fn build_view(
    reader: &StorageReader<'_>,
    account: &Account,
    output: &Output,
    spends: Vec<SpentOutput>,
    locked: bool,
) -> Expect<OutputView> {
    let meta = &output.spend_meta;
    let derivation = generate_key_derivation(&meta.tx_public, &account.view_key)?;
    let public_key = derive_public_key(&derivation, meta.index, &account.address.spend_public)?;
    let rct = match output.extra.is_ringct() {
        true => Some(reconstruct_ringct(output, &account.view_key)?),
        false => None,
    };

    Ok(OutputView {
        id: meta.id,
        amount: meta.amount,
        index: meta.index,
        mixin: meta.mixin_count,
        height: output.link.height,
        tx_hash: output.link.tx_hash,
        tx_prefix_hash: output.tx_prefix_hash,
        tx_pub_key: meta.tx_public,
        timestamp: output.timestamp,
        unlock_time: output.unlock_time,
        coinbase: output.extra.is_coinbase(),
        payment_id: output.payment_id,
        public_key,
        rct,
        key_images: key_images(reader, meta.id)?,
        spends,
        locked,
    })
}

/// Every output of `account` with its spends attached.
pub fn output_view(
    reader: &StorageReader<'_>,
    account: &Account,
    lock: &LockContext,
) -> Expect<OutputViews> {
    let mut outputs = reader.get_outputs(account.id)?;
    let mut spends = reader.get_spends(account.id)?;
    let merged = merge_outputs(outputs.make_iterator(), spends.make_iterator(), lock);
    outputs.status()?;
    spends.status()?;

    let views = merged
        .outputs
        .into_iter()
        .map(|entry| build_view(reader, account, &entry.output, entry.spends, entry.locked))
        .collect::<Expect<Vec<_>>>()?;

    tracing::debug!(id = %account.id, outputs = views.len(), "output view");
    Ok(OutputViews { outputs: views, totals: merged.totals })
}

/// Outputs a client may select as transaction inputs.
///
/// Spent outputs are not removed: the client decides spentness from the
/// returned key images. Fails with `NoSuchAccount` when the selected outputs
/// sum to less than `request.amount`.
pub fn unspent_outputs(
    reader: &StorageReader<'_>,
    account: &Account,
    lock: &LockContext,
    request: &UnspentRequest,
) -> Expect<UnspentOutputs> {
    let mut stream = reader.get_outputs(account.id)?;
    let mut amount = 0u64;
    let mut views = Vec::new();

    for output in stream.make_iterator() {
        if !request.accepts(&output) {
            continue;
        }
        amount = amount.saturating_add(output.spend_meta.amount);
        let locked = lock.is_output_locked(&output);
        views.push(build_view(reader, account, &output, Vec::new(), locked)?);
    }
    stream.status()?;

    tracing::debug!(
        id = %account.id,
        selected = views.len(),
        amount,
        requested = request.amount,
        "unspent outputs"
    );

    if amount < request.amount {
        return Err(LwsError::NoSuchAccount.into());
    }
    Ok(UnspentOutputs { amount, outputs: views })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lws_core::crypto::{basepoint, secret_key_to_public_key};
    use lws_core::error::CommonError;
    use lws_core::types::{
        AccountAddress, AccountId, BlockInfo, Extra, KeyImage, Spend, SpendMeta, TransactionLink,
        ViewKey,
    };
    use lws_db::Storage;

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("light_wallet_server")).unwrap();
        (store, dir)
    }

    fn view_key() -> ViewKey {
        let mut secret = [0u8; 32];
        secret[0] = 7;
        ViewKey::new(secret)
    }

    fn address() -> AccountAddress {
        AccountAddress {
            spend_public: basepoint(),
            view_public: secret_key_to_public_key(&view_key()).unwrap(),
        }
    }

    fn output(
        account: AccountId,
        id: OutputId,
        amount: u64,
        mixin_count: u32,
        extra: Extra,
    ) -> Output {
        Output {
            spend_meta: SpendMeta {
                id,
                amount,
                mixin_count,
                index: id.index(),
                tx_public: basepoint(),
            },
            link: TransactionLink {
                height: BlockId(id.height()),
                tx_hash: Hash256([id.height() as u8; 32]),
            },
            account,
            timestamp: 10,
            unlock_time: 0,
            tx_prefix_hash: Hash256([0xab; 32]),
            ringct_mask: [3; 32],
            extra,
            payment_id: None,
        }
    }

    /// Account with outputs of 5 (mixin 1), 50 (mixin 4, RingCT) and 500
    /// (mixin 8); the 50 output is spent.
    fn fixture(store: &Storage) -> AccountId {
        let id = store.add_account(&address(), &view_key(), BlockId(0)).unwrap();
        let outputs = [
            output(id, OutputId::new(10, 0), 5, 1, Extra::NONE),
            output(id, OutputId::new(10, 1), 50, 4, Extra::RINGCT),
            output(id, OutputId::new(11, 0), 500, 8, Extra::NONE),
        ];
        let block = BlockInfo { id: BlockId(11), hash: Hash256([11; 32]) };
        store.sync_block(&block, &outputs, &[], &[]).unwrap();

        let link = TransactionLink { height: BlockId(12), tx_hash: Hash256([0x12; 32]) };
        let spend = Spend {
            source: OutputId::new(10, 1),
            link,
            image: Hash256([0x99; 32]),
            mixin_count: 4,
            timestamp: 20,
            unlock_time: 0,
            account: id,
        };
        let image = KeyImage {
            output: OutputId::new(10, 1),
            account: id,
            image: Hash256([0x99; 32]),
            link,
        };
        let block = BlockInfo { id: BlockId(12), hash: Hash256([12; 32]) };
        store.sync_block(&block, &[], &[spend], &[image]).unwrap();
        id
    }

    fn lock() -> LockContext {
        LockContext::new(BlockId(12), 1_700_000_000)
    }

    #[test]
    fn flat_view_derives_keys_and_ringct_fields() {
        let (store, _dir) = temp_store();
        fixture(&store);
        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address()).unwrap();
        let views = output_view(&reader, &account, &lock()).unwrap();

        assert_eq!(views.outputs.len(), 3);
        assert_eq!(views.totals, Totals { received: 555, sent: 50, locked: 0 });

        let spent = &views.outputs[1];
        assert_eq!(spent.spends.len(), 1);
        assert_eq!(spent.key_images, vec![Hash256([0x99; 32])]);
        let rct = spent.rct.as_ref().unwrap();
        let stored = output(account.id, spent.id, 50, 4, Extra::RINGCT);
        assert_eq!(rct, &reconstruct_ringct(&stored, &view_key()).unwrap());
        assert!(views.outputs[0].rct.is_none());

        let derivation = generate_key_derivation(&basepoint(), &view_key()).unwrap();
        let expected = derive_public_key(&derivation, 1, &basepoint()).unwrap();
        assert_eq!(spent.public_key, expected);
        assert_ne!(views.outputs[0].public_key, expected);
    }

    #[test]
    fn unspent_filters_by_dust_and_mixin() {
        let (store, _dir) = temp_store();
        fixture(&store);
        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address()).unwrap();

        let all = unspent_outputs(&reader, &account, &lock(), &UnspentRequest::default()).unwrap();
        assert_eq!(all.amount, 555);
        assert_eq!(all.outputs.len(), 3, "spent outputs are still returned");

        let request =
            UnspentRequest { amount: 0, mixin: Some(4), use_dust: None, dust_threshold: Some(100) };
        let filtered = unspent_outputs(&reader, &account, &lock(), &request).unwrap();
        assert_eq!(filtered.amount, 500);

        let dust = UnspentRequest { use_dust: Some(true), ..request };
        let with_dust = unspent_outputs(&reader, &account, &lock(), &dust).unwrap();
        assert_eq!(with_dust.amount, 550);
    }

    #[test]
    fn unspent_below_requested_amount_is_no_such_account() {
        let (store, _dir) = temp_store();
        fixture(&store);
        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address()).unwrap();

        let request = UnspentRequest { amount: 556, ..UnspentRequest::default() };
        let err = unspent_outputs(&reader, &account, &lock(), &request).unwrap_err();
        assert_eq!(err, LwsError::NoSuchAccount.into());
    }

    #[test]
    fn invalid_tx_public_key_is_crypto_failure() {
        let (store, _dir) = temp_store();
        let id = store.add_account(&address(), &view_key(), BlockId(0)).unwrap();
        let off_curve = (0u8..=255)
            .map(|b| {
                let mut bytes = [0u8; 32];
                bytes[0] = 2;
                bytes[1] = b;
                PublicKey(bytes)
            })
            .find(|key| generate_key_derivation(key, &view_key()).is_err())
            .expect("some encoding is off the curve");
        let mut bad = output(id, OutputId::new(3, 0), 1, 0, Extra::NONE);
        bad.spend_meta.tx_public = off_curve;
        let block = BlockInfo { id: BlockId(3), hash: Hash256([3; 32]) };
        store.sync_block(&block, &[bad], &[], &[]).unwrap();

        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address()).unwrap();
        let err = output_view(&reader, &account, &lock()).unwrap_err();
        assert_eq!(err, CommonError::CryptoFailure.into());
    }
}
