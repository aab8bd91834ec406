//! Blackjack table rules: hand evaluation and the card source.

pub mod blackjack;
mod shoe;

pub use shoe::{RandomShoe, Shoe};
