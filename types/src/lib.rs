//! Common types used throughout parlor.
//!
//! `execution` holds the persisted records (accounts and the keys/values they are stored
//! under) and `casino` holds the blackjack table vocabulary shared by the engine and the
//! front-end.

pub mod casino;
pub mod execution;

pub use execution::{Account, AccountId, Key, Value};
