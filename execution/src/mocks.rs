//! Test helpers: a shoe that deals a preset sequence of cards.

use crate::casino::Shoe;
use parlor_types::casino::{Card, Rank, Suit};
use std::collections::VecDeque;

/// Deals cards in the order given. Panics once exhausted.
pub struct StackedShoe {
    cards: VecDeque<Card>,
}

impl StackedShoe {
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self {
        Self {
            cards: cards.into_iter().collect(),
        }
    }

    /// Stack by rank only (suits rotate for readability in logs).
    pub fn ranks(ranks: &[Rank]) -> Self {
        Self::new(
            ranks
                .iter()
                .enumerate()
                .map(|(i, &rank)| Card::new(rank, Suit::ALL[i % Suit::ALL.len()])),
        )
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl Shoe for StackedShoe {
    fn draw(&mut self) -> Card {
        self.cards.pop_front().expect("stacked shoe exhausted")
    }
}

/// Order in which the engine deals the opening cards: player, dealer, player, dealer.
pub fn deal(player: [Rank; 2], dealer: [Rank; 2]) -> Vec<Rank> {
    vec![player[0], dealer[0], player[1], dealer[1]]
}
