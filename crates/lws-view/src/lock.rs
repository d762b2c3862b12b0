//! Spendability of received outputs.
//!
//! An `unlock_time` above [`MAX_BLOCK_NUMBER`] is a Unix timestamp compared
//! with the wall clock; otherwise it is a block height compared with the last
//! synced block. Coinbase outputs are additionally locked for
//! [`COINBASE_MATURITY_WINDOW`] blocks after their own height.

use lws_core::constants::{COINBASE_MATURITY_WINDOW, MAX_BLOCK_NUMBER};
use lws_core::error::{Expect, LwsError};
use lws_core::types::{BlockId, Extra, Output};
use lws_db::StorageReader;

/// Chain tip and wall clock that lock status is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockContext {
    pub last_block: BlockId,
    /// Unix seconds.
    pub now: u64,
}

impl LockContext {
    pub fn new(last_block: BlockId, now: u64) -> Self {
        Self { last_block, now }
    }

    /// Evaluate against the system clock.
    pub fn current(last_block: BlockId) -> Expect<Self> {
        let now = u64::try_from(chrono::Utc::now().timestamp())
            .map_err(|_| LwsError::SystemClockInvalidRange)?;
        Ok(Self::new(last_block, now))
    }

    /// Evaluate against the reader's last synced block and the system clock.
    pub fn for_reader(reader: &StorageReader<'_>) -> Expect<Self> {
        Self::current(reader.get_last_block()?.id)
    }

    pub fn is_unlock_time_locked(&self, unlock_time: u64) -> bool {
        if unlock_time > MAX_BLOCK_NUMBER {
            return unlock_time > self.now;
        }
        BlockId(unlock_time) > self.last_block
    }

    pub fn is_locked(&self, unlock_time: u64, height: BlockId, extra: Extra) -> bool {
        if self.is_unlock_time_locked(unlock_time) {
            return true;
        }
        extra.is_coinbase() && height.0.saturating_add(COINBASE_MATURITY_WINDOW) > self.last_block.0
    }

    pub fn is_output_locked(&self, output: &Output) -> bool {
        self.is_locked(output.unlock_time, output.link.height, output.extra)
    }
}
