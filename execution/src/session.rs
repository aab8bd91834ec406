use crate::casino::blackjack::hand_value;
use parlor_types::casino::{Card, Cause, Phase, SessionSnapshot};

/// A game in progress at one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: u64,
    /// Total amount at stake (doubled by a double down).
    pub wager: i64,
    pub player: Vec<Card>,
    pub dealer: Vec<Card>,
    pub phase: Phase,
    /// Only offered on the opening two cards, before any action.
    pub can_double_down: bool,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn new(id: u64, wager: i64, player: Vec<Card>, dealer: Vec<Card>, now: u64, ttl: u64) -> Self {
        Self {
            id,
            wager,
            player,
            dealer,
            phase: Phase::Playing,
            can_double_down: true,
            created_at: now,
            expires_at: now.saturating_add(ttl),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    /// View of the game as shown to the player. The hole card stays hidden until resolved.
    pub fn snapshot(&self, payout: Option<i64>, cause: Option<Cause>) -> SessionSnapshot {
        let (player_value, player_soft) = hand_value(&self.player);
        let playing = self.is_playing();
        let dealer_hand = self
            .dealer
            .iter()
            .enumerate()
            .map(|(i, card)| (!(playing && i == 0)).then_some(*card))
            .collect();
        let dealer_value = (!playing).then(|| hand_value(&self.dealer).0);
        SessionSnapshot {
            session_id: self.id,
            wager: self.wager,
            player_hand: self.player.clone(),
            player_value,
            player_soft,
            dealer_hand,
            dealer_value,
            phase: self.phase,
            can_double_down: playing && self.can_double_down,
            payout,
            cause,
            expires_at: self.expires_at,
        }
    }
}
