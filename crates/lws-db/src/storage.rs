//! RocksDB-backed account store.
//!
//! [`Storage`] is the single writer. Every mutation is one atomic
//! [`WriteBatch`] taken under a writer lock, so readers always observe either
//! all or none of a block. Readers are opened with [`Storage::start_read`] and
//! never block the writer.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};

use lws_core::error::{Expect, LwsError, StorageError};
use lws_core::record::{Record, decode_checked};
use lws_core::types::{
    Account, AccountAddress, AccountId, AccountLookup, AccountStatus, BlockId, BlockInfo, KeyImage,
    Output, RequestInfo, RequestKind, Spend, ViewKey,
};

use crate::config::LwsConfig;
use crate::reader::StorageReader;
use crate::schema::{
    ALL_CFS, CF_ACCOUNTS, CF_ACCOUNTS_BY_ADDRESS, CF_BLOCKS, CF_COUNTS, CF_IMAGES, CF_METADATA,
    CF_OUTPUTS, CF_REQUESTS, CF_SPENDS, META_NEXT_ACCOUNT_ID, account_group, account_key,
    account_prefix, address_key, backend, count_key, height_key, image_group, image_key, output_key,
    request_key, spend_key,
};

struct Inner {
    db: DB,
    write_lock: Mutex<()>,
}

/// Handle to the account store. Cheap to clone; clones share one database.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

/// Pending count adjustments for one batch, keyed by counts-table key.
#[derive(Default)]
struct CountDeltas(HashMap<Vec<u8>, i64>);

impl CountDeltas {
    fn add(&mut self, table: &str, group: &[u8], delta: i64) {
        *self.0.entry(count_key(table, group)).or_default() += delta;
    }
}

impl Storage {
    /// Open or create a store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Expect<Self> {
        Self::open_inner(path.as_ref(), true, None)
    }

    /// Open the store described by `config`.
    pub fn open_with(config: &LwsConfig) -> Expect<Self> {
        Self::open_inner(&config.db_path(), config.create_if_missing, Some(config.max_open_files))
    }

    fn open_inner(
        path: &Path,
        create_if_missing: bool,
        max_open_files: Option<i32>,
    ) -> Expect<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(create_if_missing);
        db_opts.create_missing_column_families(true);
        if let Some(max) = max_open_files {
            db_opts.set_max_open_files(max);
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors).map_err(backend)?;
        tracing::info!(path = %path.display(), "opened light-wallet store");

        Ok(Self { inner: Arc::new(Inner { db, write_lock: Mutex::new(()) }) })
    }

    /// Begin a read session over a snapshot of the current state.
    pub fn start_read(&self) -> Expect<StorageReader<'_>> {
        Ok(StorageReader::new(&self.inner.db))
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Expect<&ColumnFamily> {
        self.inner
            .db
            .cf_handle(name)
            .ok_or_else(|| StorageError::MissingTable(name.to_string()).into())
    }

    fn get(&self, table: &str, key: &[u8]) -> Expect<Option<Vec<u8>>> {
        let cf = self.cf_handle(table)?;
        self.inner.db.get_cf(cf, key).map_err(backend)
    }

    fn exists(&self, table: &str, key: &[u8]) -> Expect<bool> {
        Ok(self.get(table, key)?.is_some())
    }

    fn write(&self, batch: WriteBatch) -> Expect<()> {
        self.inner.db.write(batch).map_err(backend)
    }

    fn apply_counts(&self, batch: &mut WriteBatch, deltas: CountDeltas) -> Expect<()> {
        let cf = self.cf_handle(CF_COUNTS)?;
        for (key, delta) in deltas.0 {
            if delta == 0 {
                continue;
            }
            let current = match self.get(CF_COUNTS, &key)? {
                Some(bytes) => decode_checked::<u64>(CF_COUNTS, &bytes),
                None => 0,
            };
            let updated = current.saturating_add_signed(delta);
            if updated == 0 {
                batch.delete_cf(cf, &key);
            } else {
                batch.put_cf(cf, &key, updated.to_bytes());
            }
        }
        Ok(())
    }

    fn lookup(&self, address: &AccountAddress) -> Expect<AccountLookup> {
        match self.get(CF_ACCOUNTS_BY_ADDRESS, &address_key(address))? {
            Some(bytes) => Ok(decode_checked::<AccountLookup>(CF_ACCOUNTS_BY_ADDRESS, &bytes)),
            None => Err(LwsError::NoSuchAccount.into()),
        }
    }

    fn locate(&self, address: &AccountAddress) -> Expect<(AccountLookup, Account)> {
        let lookup = self.lookup(address)?;
        match self.get(CF_ACCOUNTS, &account_key(lookup.status, lookup.id))? {
            Some(bytes) => Ok((lookup, decode_checked::<Account>(CF_ACCOUNTS, &bytes))),
            None => Err(LwsError::NoSuchAccount.into()),
        }
    }

    fn next_account_id(&self) -> Expect<AccountId> {
        match self.get(CF_METADATA, META_NEXT_ACCOUNT_ID)? {
            Some(bytes) => Ok(decode_checked::<AccountId>(CF_METADATA, &bytes)),
            None => Ok(AccountId(1)),
        }
    }

    // --- Accounts ---

    /// Create an active account. Fails with `AccountExists` if the address
    /// is already registered, whatever its status. A pending creation
    /// request for the address is consumed.
    pub fn add_account(
        &self,
        address: &AccountAddress,
        view_key: &ViewKey,
        start_height: BlockId,
    ) -> Expect<AccountId> {
        let _guard = self.inner.write_lock.lock();

        if self.exists(CF_ACCOUNTS_BY_ADDRESS, &address_key(address))? {
            tracing::warn!(%address, "rejected duplicate account");
            return Err(LwsError::AccountExists.into());
        }

        let id = self.next_account_id()?;
        let next = id
            .0
            .checked_add(1)
            .map(AccountId)
            .ok_or_else(|| StorageError::Backend("account id space exhausted".into()))?;
        let now = unix_now()?;
        let account = Account {
            id,
            address: *address,
            view_key: view_key.clone(),
            scan_height: start_height,
            start_height,
            access_time: now,
            creation_time: now,
        };
        let status = AccountStatus::Active;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_ACCOUNTS)?, account_key(status, id), account.to_bytes());
        batch.put_cf(
            self.cf_handle(CF_ACCOUNTS_BY_ADDRESS)?,
            address_key(address),
            AccountLookup { id, status }.to_bytes(),
        );
        batch.put_cf(self.cf_handle(CF_METADATA)?, META_NEXT_ACCOUNT_ID, next.to_bytes());
        batch.delete_cf(self.cf_handle(CF_REQUESTS)?, request_key(RequestKind::Create, address));

        let mut deltas = CountDeltas::default();
        deltas.add(CF_ACCOUNTS, &account_prefix(status), 1);
        self.apply_counts(&mut batch, deltas)?;
        self.write(batch)?;

        tracing::info!(%id, start_height = start_height.0, "created account");
        Ok(id)
    }

    /// Move an account to `status`. Hiding an account removes it from every
    /// non-administrative read without deleting its history.
    pub fn change_status(&self, address: &AccountAddress, status: AccountStatus) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        let (lookup, account) = self.locate(address)?;
        if lookup.status == status {
            return Ok(());
        }

        let accounts = self.cf_handle(CF_ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(accounts, account_key(lookup.status, lookup.id));
        batch.put_cf(accounts, account_key(status, lookup.id), account.to_bytes());
        batch.put_cf(
            self.cf_handle(CF_ACCOUNTS_BY_ADDRESS)?,
            address_key(address),
            AccountLookup { id: lookup.id, status }.to_bytes(),
        );

        let mut deltas = CountDeltas::default();
        deltas.add(CF_ACCOUNTS, &account_prefix(lookup.status), -1);
        deltas.add(CF_ACCOUNTS, &account_prefix(status), 1);
        self.apply_counts(&mut batch, deltas)?;
        self.write(batch)?;

        tracing::info!(id = %lookup.id, ?status, "changed account status");
        Ok(())
    }

    /// Record how far the scanner has processed an account.
    pub fn update_scan_height(&self, address: &AccountAddress, height: BlockId) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        let (lookup, mut account) = self.locate(address)?;
        account.scan_height = height;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf_handle(CF_ACCOUNTS)?,
            account_key(lookup.status, lookup.id),
            account.to_bytes(),
        );
        self.write(batch)
    }

    /// Record a client access.
    pub fn update_access_time(&self, address: &AccountAddress) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        let (lookup, mut account) = self.locate(address)?;
        account.access_time = unix_now()?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf_handle(CF_ACCOUNTS)?,
            account_key(lookup.status, lookup.id),
            account.to_bytes(),
        );
        self.write(batch)
    }

    // --- Chain data ---

    /// Append one block's worth of account data atomically.
    ///
    /// `block.id` must be above the last synced block; anything else means
    /// the chain moved under the scanner and is reported as a reorg.
    /// Rewriting an existing row does not change its group count.
    pub fn sync_block(
        &self,
        block: &BlockInfo,
        outputs: &[Output],
        spends: &[Spend],
        images: &[KeyImage],
    ) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        let blocks = self.cf_handle(CF_BLOCKS)?;
        let mut iter = self.inner.db.raw_iterator_cf(blocks);
        iter.seek_to_last();
        if let Some(bytes) = iter.value() {
            let last = decode_checked::<BlockInfo>(CF_BLOCKS, bytes);
            if block.id <= last.id {
                tracing::warn!(
                    height = block.id.0,
                    last = last.id.0,
                    "rejected block at or below last synced"
                );
                return Err(LwsError::BlockchainReorg.into());
            }
        }
        iter.status().map_err(backend)?;
        drop(iter);

        let mut batch = WriteBatch::default();
        let mut deltas = CountDeltas::default();
        let mut written = HashSet::new();

        let cf = self.cf_handle(CF_OUTPUTS)?;
        for output in outputs {
            let key = output_key(output.account, output.spend_meta.id);
            if !self.exists(CF_OUTPUTS, &key)? && written.insert((CF_OUTPUTS, key.clone())) {
                deltas.add(CF_OUTPUTS, &account_group(output.account), 1);
            }
            batch.put_cf(cf, &key, output.to_bytes());
        }

        let cf = self.cf_handle(CF_SPENDS)?;
        for spend in spends {
            let key = spend_key(spend.account, spend.source, &spend.image);
            if !self.exists(CF_SPENDS, &key)? && written.insert((CF_SPENDS, key.clone())) {
                deltas.add(CF_SPENDS, &account_group(spend.account), 1);
            }
            batch.put_cf(cf, &key, spend.to_bytes());
        }

        let cf = self.cf_handle(CF_IMAGES)?;
        for image in images {
            let key = image_key(image.output, &image.image);
            if !self.exists(CF_IMAGES, &key)? && written.insert((CF_IMAGES, key.clone())) {
                deltas.add(CF_IMAGES, &image_group(image.output), 1);
            }
            batch.put_cf(cf, &key, image.to_bytes());
        }

        batch.put_cf(blocks, height_key(block.id), block.to_bytes());
        self.apply_counts(&mut batch, deltas)?;
        self.write(batch)?;

        tracing::debug!(
            height = block.id.0,
            outputs = outputs.len(),
            spends = spends.len(),
            images = images.len(),
            "synced block"
        );
        Ok(())
    }

    // --- Requests ---

    /// Queue an account creation request.
    pub fn creation_request(
        &self,
        address: &AccountAddress,
        view_key: &ViewKey,
        start_height: BlockId,
    ) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        if self.exists(CF_ACCOUNTS_BY_ADDRESS, &address_key(address))? {
            return Err(LwsError::AccountExists.into());
        }
        self.put_request(RequestKind::Create, address, view_key.clone(), start_height)
    }

    /// Queue a rescan of an existing account from `start_height`.
    pub fn import_request(&self, address: &AccountAddress, start_height: BlockId) -> Expect<()> {
        let _guard = self.inner.write_lock.lock();

        self.lookup(address)?;
        self.put_request(RequestKind::ImportScan, address, ViewKey::default(), start_height)
    }

    fn put_request(
        &self,
        kind: RequestKind,
        address: &AccountAddress,
        view_key: ViewKey,
        start_height: BlockId,
    ) -> Expect<()> {
        let key = request_key(kind, address);
        if self.exists(CF_REQUESTS, &key)? {
            tracing::warn!(%address, ?kind, "rejected duplicate request");
            return Err(LwsError::DuplicateRequest.into());
        }

        let info =
            RequestInfo { address: *address, view_key, start_height, creation_time: unix_now()? };
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_REQUESTS)?, &key, info.to_bytes());
        self.write(batch)
    }
}

/// Current Unix time in seconds.
fn unix_now() -> Expect<u64> {
    u64::try_from(chrono::Utc::now().timestamp())
        .map_err(|_| LwsError::SystemClockInvalidRange.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lws_core::error::{Condition, ExpectExt};
    use lws_core::types::{Extra, Hash256, OutputId, PublicKey, SpendMeta, TransactionLink};

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("light_wallet_server")).unwrap();
        (store, dir)
    }

    fn address(seed: u8) -> AccountAddress {
        AccountAddress {
            spend_public: PublicKey([seed; 32]),
            view_public: PublicKey([seed ^ 0xff; 32]),
        }
    }

    fn block(height: u64) -> BlockInfo {
        BlockInfo { id: BlockId(height), hash: Hash256([height as u8; 32]) }
    }

    fn output(account: AccountId, height: u64, index: u32, amount: u64) -> Output {
        Output {
            spend_meta: SpendMeta {
                id: OutputId::new(height, index),
                amount,
                mixin_count: 0,
                index: 0,
                tx_public: PublicKey([1; 32]),
            },
            link: TransactionLink { height: BlockId(height), tx_hash: Hash256([index as u8; 32]) },
            account,
            timestamp: 0,
            unlock_time: 0,
            tx_prefix_hash: Hash256::ZERO,
            ringct_mask: [0; 32],
            extra: Extra::NONE,
            payment_id: None,
        }
    }

    #[test]
    fn add_account_assigns_sequential_ids() {
        let (store, _dir) = temp_store();
        let a = store.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap();
        let b = store.add_account(&address(2), &ViewKey::default(), BlockId(0)).unwrap();
        assert_eq!(a, AccountId(1));
        assert_eq!(b, AccountId(2));
    }

    #[test]
    fn add_account_rejects_duplicate() {
        let (store, _dir) = temp_store();
        store.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap();
        let err = store.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap_err();
        assert!(
            matches!(err, lws_core::Error::Lws(LwsError::AccountExists)),
            "expected AccountExists, got: {err:?}"
        );
    }

    #[test]
    fn change_status_moves_account_between_groups() {
        let (store, _dir) = temp_store();
        store.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap();
        store.change_status(&address(1), AccountStatus::Hidden).unwrap();

        let reader = store.start_read().unwrap();
        let (status, _) = reader.get_account(&address(1)).unwrap();
        assert_eq!(status, AccountStatus::Hidden);
        assert_eq!(reader.get_accounts_by_status(AccountStatus::Active).unwrap().count(), 0);
        assert_eq!(reader.get_accounts_by_status(AccountStatus::Hidden).unwrap().count(), 1);
    }

    #[test]
    fn change_status_of_unknown_account() {
        let (store, _dir) = temp_store();
        let err = store.change_status(&address(9), AccountStatus::Inactive).unwrap_err();
        assert_eq!(err, LwsError::NoSuchAccount.into());
    }

    #[test]
    fn update_scan_height_persists() {
        let (store, _dir) = temp_store();
        store.add_account(&address(1), &ViewKey::default(), BlockId(5)).unwrap();
        store.update_scan_height(&address(1), BlockId(50)).unwrap();
        store.update_access_time(&address(1)).unwrap();
        let reader = store.start_read().unwrap();
        let (_, account) = reader.get_account(&address(1)).unwrap();
        assert_eq!(account.scan_height, BlockId(50));
        assert_eq!(account.start_height, BlockId(5));
    }

    #[test]
    fn sync_block_rejects_non_advancing_height() {
        let (store, _dir) = temp_store();
        store.sync_block(&block(10), &[], &[], &[]).unwrap();
        let err = store.sync_block(&block(10), &[], &[], &[]).unwrap_err();
        assert_eq!(err, LwsError::BlockchainReorg.into());
        let err = store.sync_block(&block(9), &[], &[], &[]).unwrap_err();
        assert_eq!(err, LwsError::BlockchainReorg.into());
        store.sync_block(&block(11), &[], &[], &[]).unwrap();

        let reader = store.start_read().unwrap();
        assert_eq!(reader.get_last_block().unwrap(), block(11));
    }

    #[test]
    fn sync_block_counts_outputs_once() {
        let (store, _dir) = temp_store();
        let id = store.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap();
        let out = output(id, 10, 0, 100);
        store.sync_block(&block(10), &[out, out], &[], &[]).unwrap();
        store.sync_block(&block(11), &[out, output(id, 11, 0, 5)], &[], &[]).unwrap();

        let reader = store.start_read().unwrap();
        let mut outputs = reader.get_outputs(id).unwrap();
        assert_eq!(outputs.count(), 2);
        let amounts: Vec<u64> = outputs.make_iterator().map(|o| o.spend_meta.amount).collect();
        assert_eq!(amounts, vec![100, 5]);
    }

    #[test]
    fn creation_request_conflicts() {
        let (store, _dir) = temp_store();
        store.creation_request(&address(1), &ViewKey::new([3; 32]), BlockId(0)).unwrap();
        let err =
            store.creation_request(&address(1), &ViewKey::new([3; 32]), BlockId(0)).unwrap_err();
        assert_eq!(err, LwsError::DuplicateRequest.into());

        let reader = store.start_read().unwrap();
        let request = reader.get_request(RequestKind::Create, &address(1)).unwrap();
        assert_eq!(request.view_key, ViewKey::new([3; 32]));
        reader.finish_read();

        store.add_account(&address(1), &ViewKey::new([3; 32]), BlockId(0)).unwrap();
        let reader = store.start_read().unwrap();
        assert!(reader.get_request(RequestKind::Create, &address(1)).matches(Condition::NoEntry));
        reader.finish_read();

        let err =
            store.creation_request(&address(1), &ViewKey::new([3; 32]), BlockId(0)).unwrap_err();
        assert_eq!(err, LwsError::AccountExists.into());
    }

    #[test]
    fn import_request_requires_account() {
        let (store, _dir) = temp_store();
        let err = store.import_request(&address(1), BlockId(0)).unwrap_err();
        assert_eq!(err, LwsError::NoSuchAccount.into());

        store.add_account(&address(1), &ViewKey::default(), BlockId(100)).unwrap();
        store.import_request(&address(1), BlockId(0)).unwrap();
        let err = store.import_request(&address(1), BlockId(0)).unwrap_err();
        assert_eq!(err, LwsError::DuplicateRequest.into());
    }

    #[test]
    fn clones_share_the_database() {
        let (store, _dir) = temp_store();
        let other = store.clone();
        other.add_account(&address(1), &ViewKey::default(), BlockId(0)).unwrap();
        let reader = store.start_read().unwrap();
        assert!(reader.get_account(&address(1)).is_ok());
    }
}
