//! # lws-view
//! Wallet views reconstructed from an account's output and spend streams.
//!
//! Every entry point takes an open [`StorageReader`](lws_db::StorageReader)
//! and returns owned, serialisable results, so the reader can be released as
//! soon as the view is built.

pub mod account;
pub mod info;
pub mod lock;
pub mod merge;
pub mod outputs;
pub mod txs;

pub use account::open_account;
pub use info::{AddressInfo, address_info};
pub use lock::LockContext;
pub use merge::{MetaIndex, SpentOutput, Totals, TransactionView, merge_outputs, merge_transactions};
pub use outputs::{
    OutputView, OutputViews, UnspentOutputs, UnspentRequest, output_view, unspent_outputs,
};
pub use txs::{AddressTxs, address_txs};
