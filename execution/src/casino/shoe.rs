use parlor_types::casino::{Card, Rank, Suit};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of cards for a table.
pub trait Shoe: Send {
    fn draw(&mut self) -> Card;
}

/// Infinite shoe: every draw is uniform over the 52 cards of a deck.
pub struct RandomShoe {
    rng: StdRng,
}

impl RandomShoe {
    /// Seeded shoes replay the same card sequence.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Shoe for RandomShoe {
    fn draw(&mut self) -> Card {
        let rank = Rank::ALL[self.rng.gen_range(0..Rank::ALL.len())];
        let suit = Suit::ALL[self.rng.gen_range(0..Suit::ALL.len())];
        Card::new(rank, suit)
    }
}
