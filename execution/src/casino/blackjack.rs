//! Blackjack hand evaluation.
//!
//! House rules:
//! - Infinite shoe (every draw is uniform over 52 cards)
//! - Dealer stands on all 17s, including soft 17
//! - Blackjack pays 3:2, no insurance, no surrender, no split

use super::Shoe;
use parlor_types::casino::{Card, GameResult, Rank, DEALER_STAND_TOTAL};

/// Calculate the value of a blackjack hand, and whether an Ace still counts as 11.
pub fn hand_value(cards: &[Card]) -> (u8, bool) {
    let mut value: u16 = 0;
    let mut aces: u8 = 0;

    for card in cards {
        if card.rank == Rank::Ace {
            aces += 1;
        }
        value += card.value() as u16;
    }

    while value > 21 && aces > 0 {
        value -= 10;
        aces -= 1;
    }

    let is_soft = aces > 0 && value <= 21;
    (value.min(255) as u8, is_soft)
}

/// Check if hand is a blackjack (21 with 2 cards).
pub fn is_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards).0 == 21
}

pub fn is_bust(cards: &[Card]) -> bool {
    hand_value(cards).0 > 21
}

pub fn dealer_should_draw(cards: &[Card]) -> bool {
    hand_value(cards).0 < DEALER_STAND_TOTAL
}

/// Draw dealer cards until the dealer stands.
pub fn dealer_play(dealer: &mut Vec<Card>, shoe: &mut dyn Shoe) {
    while dealer_should_draw(dealer) {
        dealer.push(shoe.draw());
    }
}

/// Compare finished hands. The player must not be bust.
pub fn settle(player: &[Card], dealer: &[Card]) -> GameResult {
    let (player_value, _) = hand_value(player);
    let (dealer_value, _) = hand_value(dealer);
    if dealer_value > 21 || player_value > dealer_value {
        GameResult::PlayerWin
    } else if player_value == dealer_value {
        GameResult::Push
    } else {
        GameResult::DealerWin
    }
}

/// Result of the initial deal when either side holds a natural.
pub fn natural(player: &[Card], dealer: &[Card]) -> Option<GameResult> {
    match (is_blackjack(player), is_blackjack(dealer)) {
        (true, true) => Some(GameResult::Push),
        (true, false) => Some(GameResult::PlayerBlackjack),
        (false, true) => Some(GameResult::DealerWin),
        (false, false) => None,
    }
}
