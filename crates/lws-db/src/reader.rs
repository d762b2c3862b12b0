//! Snapshot-bound read sessions.

use rocksdb::{ColumnFamily, DB, SnapshotWithThreadMode};

use lws_core::error::{Expect, LwsError, StorageError};
use lws_core::record::{Record, decode_checked};
use lws_core::types::{
    Account, AccountAddress, AccountId, AccountLookup, AccountStatus, BlockInfo, KeyImage, Output,
    OutputId, RequestInfo, RequestKind, Spend,
};

use crate::schema::{
    CF_ACCOUNTS, CF_ACCOUNTS_BY_ADDRESS, CF_BLOCKS, CF_COUNTS, CF_IMAGES, CF_OUTPUTS, CF_REQUESTS,
    CF_SPENDS, account_group, account_key, account_prefix, address_key, backend, count_key,
    image_group, request_key,
};
use crate::stream::{KeyStream, ValueStream};

/// A read session over one point-in-time view of the store.
///
/// Writes committed after the reader was opened are never visible through
/// it. Every stream it returns borrows it.
pub struct StorageReader<'a> {
    db: &'a DB,
    snapshot: SnapshotWithThreadMode<'a, DB>,
}

impl<'a> StorageReader<'a> {
    pub(crate) fn new(db: &'a DB) -> Self {
        Self { db, snapshot: db.snapshot() }
    }

    fn cf(&self, name: &str) -> Expect<&'a ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| StorageError::MissingTable(name.to_string()).into())
    }

    fn get(&self, table: &str, key: &[u8]) -> Expect<Option<Vec<u8>>> {
        let cf = self.cf(table)?;
        self.snapshot.get_cf(cf, key).map_err(backend)
    }

    fn count(&self, table: &str, group: &[u8]) -> Expect<u64> {
        match self.get(CF_COUNTS, &count_key(table, group))? {
            Some(bytes) => Ok(decode_checked::<u64>(CF_COUNTS, &bytes)),
            None => Ok(0),
        }
    }

    fn value_stream<V: Record>(
        &self,
        table: &'static str,
        prefix: Vec<u8>,
    ) -> Expect<ValueStream<'_, V>> {
        let cf = self.cf(table)?;
        let count = self.count(table, &prefix)?;
        Ok(ValueStream::new(self.snapshot.raw_iterator_cf(cf), table, prefix, count))
    }

    /// Look up an account by address. Hidden accounts are returned as-is;
    /// visibility is the caller's decision.
    pub fn get_account(&self, address: &AccountAddress) -> Expect<(AccountStatus, Account)> {
        let lookup = match self.get(CF_ACCOUNTS_BY_ADDRESS, &address_key(address))? {
            Some(bytes) => decode_checked::<AccountLookup>(CF_ACCOUNTS_BY_ADDRESS, &bytes),
            None => return Err(LwsError::NoSuchAccount.into()),
        };
        self.get_account_row(lookup.status, lookup.id)
    }

    pub fn get_account_by_id(&self, id: AccountId) -> Expect<(AccountStatus, Account)> {
        for status in AccountStatus::ALL {
            if let Some(bytes) = self.get(CF_ACCOUNTS, &account_key(status, id))? {
                return Ok((status, decode_checked::<Account>(CF_ACCOUNTS, &bytes)));
            }
        }
        Err(LwsError::NoSuchAccount.into())
    }

    fn get_account_row(
        &self,
        status: AccountStatus,
        id: AccountId,
    ) -> Expect<(AccountStatus, Account)> {
        match self.get(CF_ACCOUNTS, &account_key(status, id))? {
            Some(bytes) => Ok((status, decode_checked::<Account>(CF_ACCOUNTS, &bytes))),
            None => Err(LwsError::NoSuchAccount.into()),
        }
    }

    /// Outputs received by `id`, in chain order.
    pub fn get_outputs(&self, id: AccountId) -> Expect<ValueStream<'_, Output>> {
        self.value_stream(CF_OUTPUTS, account_group(id))
    }

    /// Spends of outputs owned by `id`, in order of the spent output.
    pub fn get_spends(&self, id: AccountId) -> Expect<ValueStream<'_, Spend>> {
        self.value_stream(CF_SPENDS, account_group(id))
    }

    pub fn get_images(&self, output: OutputId) -> Expect<ValueStream<'_, KeyImage>> {
        self.value_stream(CF_IMAGES, image_group(output))
    }

    /// The most recently synced block.
    pub fn get_last_block(&self) -> Expect<BlockInfo> {
        let cf = self.cf(CF_BLOCKS)?;
        let mut iter = self.snapshot.raw_iterator_cf(cf);
        iter.seek_to_last();
        match iter.value() {
            Some(bytes) => Ok(decode_checked::<BlockInfo>(CF_BLOCKS, bytes)),
            None => {
                iter.status().map_err(backend)?;
                Err(StorageError::NotFound.into())
            }
        }
    }

    /// A pending request. Absence is `StorageError::NotFound`, which matches
    /// [`Condition::NoEntry`](lws_core::error::Condition::NoEntry).
    pub fn get_request(&self, kind: RequestKind, address: &AccountAddress) -> Expect<RequestInfo> {
        match self.get(CF_REQUESTS, &request_key(kind, address))? {
            Some(bytes) => Ok(decode_checked::<RequestInfo>(CF_REQUESTS, &bytes)),
            None => Err(StorageError::NotFound.into()),
        }
    }

    /// Every account grouped by status, hidden ones included.
    pub fn get_accounts(&self) -> Expect<KeyStream<'_, AccountStatus, Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        Ok(KeyStream::new(self.snapshot.raw_iterator_cf(cf), CF_ACCOUNTS, Vec::new()))
    }

    pub fn get_accounts_by_status(
        &self,
        status: AccountStatus,
    ) -> Expect<ValueStream<'_, Account>> {
        self.value_stream(CF_ACCOUNTS, account_prefix(status))
    }

    /// End the session and release the snapshot.
    pub fn finish_read(self) {}
}
