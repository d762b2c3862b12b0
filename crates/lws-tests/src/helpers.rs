//! Shared fixtures for integration tests.

use lws_core::crypto::{basepoint, secret_key_to_public_key};
use lws_core::types::{
    AccountAddress, AccountId, BlockId, BlockInfo, Extra, Hash256, Output, OutputId, PublicKey,
    Spend, SpendMeta, TransactionLink, ViewKey,
};
use lws_db::Storage;

/// Fresh store in a temporary directory. Keep the `TempDir` alive.
pub fn temp_store() -> (Storage, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Storage::open(dir.path().join("light_wallet_server")).unwrap();
    (store, dir)
}

/// View secret whose scalar value is `seed`.
pub fn view_key(seed: u8) -> ViewKey {
    let mut secret = [0u8; 32];
    secret[0] = seed;
    ViewKey::new(secret)
}

/// Address whose view public key matches [`view_key`] for the same seed.
pub fn address(seed: u8) -> AccountAddress {
    AccountAddress {
        spend_public: basepoint(),
        view_public: secret_key_to_public_key(&view_key(seed)).unwrap(),
    }
}

/// Transaction hash derived from a single tag byte.
pub fn tx(tag: u8) -> Hash256 {
    Hash256([tag; 32])
}

pub fn block(height: u64) -> BlockInfo {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&height.to_be_bytes());
    BlockInfo { id: BlockId(height), hash: Hash256(hash) }
}

/// Plain output of `amount` at `id`, created by transaction `tx_hash`.
pub fn make_output(account: AccountId, id: OutputId, amount: u64, tx_hash: Hash256) -> Output {
    Output {
        spend_meta: SpendMeta {
            id,
            amount,
            mixin_count: 10,
            index: id.index(),
            tx_public: basepoint(),
        },
        link: TransactionLink { height: BlockId(id.height()), tx_hash },
        account,
        timestamp: 1_600_000_000,
        unlock_time: 0,
        tx_prefix_hash: Hash256::ZERO,
        ringct_mask: [0; 32],
        extra: Extra::NONE,
        payment_id: None,
    }
}

/// Spend of `source` with key image `image`, included at `height`.
pub fn make_spend(account: AccountId, source: OutputId, image: u8, height: u64) -> Spend {
    Spend {
        source,
        link: TransactionLink { height: BlockId(height), tx_hash: tx(0xee) },
        image: Hash256([image; 32]),
        mixin_count: 10,
        timestamp: 1_600_000_100,
        unlock_time: 0,
        account,
    }
}

/// Public key unused by any fixture.
pub fn other_key(seed: u8) -> PublicKey {
    PublicKey([seed; 32])
}
