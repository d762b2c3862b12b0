//! Integration tests for the light-wallet view engine.
//!
//! Exercises the store, the snapshot reader and the view reconstruction
//! together: ordering of persisted streams, merge results, fatal consistency
//! faults, account visibility and snapshot isolation.

pub mod helpers;
