//! Column families and key layouts.
//!
//! Keys are fixed-width big-endian concatenations, so RocksDB's bytewise
//! ordering equals numeric order. One-to-many relations are expressed as a
//! group prefix (for example the account id) followed by the member's own
//! sort key; the number of members per group is kept in [`CF_COUNTS`].

use lws_core::error::{Error, StorageError};
use lws_core::record::Record;
use lws_core::types::{
    AccountAddress, AccountId, AccountStatus, BlockId, Hash256, OutputId, RequestKind,
};

// --- Column family names ---

/// `status ‖ account_id → Account`
pub const CF_ACCOUNTS: &str = "accounts";
/// `address → AccountLookup`
pub const CF_ACCOUNTS_BY_ADDRESS: &str = "accounts_by_address";
/// `account_id ‖ output_id → Output`
pub const CF_OUTPUTS: &str = "outputs";
/// `account_id ‖ source ‖ key_image → Spend`
pub const CF_SPENDS: &str = "spends";
/// `output_id ‖ key_image → KeyImage`
pub const CF_IMAGES: &str = "images";
/// `height → BlockInfo`
pub const CF_BLOCKS: &str = "blocks";
/// `kind ‖ address → RequestInfo`
pub const CF_REQUESTS: &str = "requests";
/// `table tag ‖ group key → u64`
pub const CF_COUNTS: &str = "counts";
pub const CF_METADATA: &str = "metadata";

pub const ALL_CFS: &[&str] = &[
    CF_ACCOUNTS,
    CF_ACCOUNTS_BY_ADDRESS,
    CF_OUTPUTS,
    CF_SPENDS,
    CF_IMAGES,
    CF_BLOCKS,
    CF_REQUESTS,
    CF_COUNTS,
    CF_METADATA,
];

// --- Metadata keys ---

pub const META_NEXT_ACCOUNT_ID: &[u8] = b"next_account_id";

/// Table tag used as the first byte of a [`CF_COUNTS`] key.
pub fn count_tag(table: &str) -> u8 {
    match table {
        CF_ACCOUNTS => 1,
        CF_OUTPUTS => 2,
        CF_SPENDS => 3,
        CF_IMAGES => 4,
        _ => 0,
    }
}

pub fn count_key(table: &str, group: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + group.len());
    key.push(count_tag(table));
    key.extend_from_slice(group);
    key
}

pub fn account_prefix(status: AccountStatus) -> Vec<u8> {
    status.to_bytes()
}

pub fn account_key(status: AccountStatus, id: AccountId) -> Vec<u8> {
    let mut key = status.to_bytes();
    id.write_to(&mut key);
    key
}

pub fn address_key(address: &AccountAddress) -> Vec<u8> {
    address.to_bytes()
}

/// Group prefix shared by an account's outputs and spends.
pub fn account_group(id: AccountId) -> Vec<u8> {
    id.to_bytes()
}

pub fn output_key(account: AccountId, id: OutputId) -> Vec<u8> {
    let mut key = account.to_bytes();
    id.write_to(&mut key);
    key
}

pub fn spend_key(account: AccountId, source: OutputId, image: &Hash256) -> Vec<u8> {
    let mut key = account.to_bytes();
    source.write_to(&mut key);
    image.write_to(&mut key);
    key
}

pub fn image_group(output: OutputId) -> Vec<u8> {
    output.to_bytes()
}

pub fn image_key(output: OutputId, image: &Hash256) -> Vec<u8> {
    let mut key = output.to_bytes();
    image.write_to(&mut key);
    key
}

pub fn height_key(height: BlockId) -> [u8; 8] {
    height.0.to_be_bytes()
}

pub fn request_key(kind: RequestKind, address: &AccountAddress) -> Vec<u8> {
    let mut key = kind.to_bytes();
    address.write_to(&mut key);
    key
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when no such key exists.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

/// Map a RocksDB failure into the storage error category.
pub fn backend(e: rocksdb::Error) -> Error {
    let err = match e.kind() {
        rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain => StorageError::Busy,
        rocksdb::ErrorKind::TimedOut => StorageError::TimedOut,
        _ => StorageError::Backend(e.to_string()),
    };
    err.into()
}
