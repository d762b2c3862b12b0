//! Chain constants shared by the scanner and the view engine.

/// Unlock times above this value are Unix timestamps; at or below it they are
/// block heights.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

/// Blocks a coinbase output must age before it can be spent.
pub const COINBASE_MATURITY_WINDOW: u64 = 60;
