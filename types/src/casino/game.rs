use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, ReadExt, Write};
use std::fmt;

use super::{format_cards, Card};

/// Outcome of a finished blackjack hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameResult {
    PlayerBlackjack = 0,
    PlayerWin = 1,
    Push = 2,
    DealerWin = 3,
    PlayerBust = 4,
}

impl GameResult {
    /// Total credited back for a (final) wager, stake included.
    ///
    /// Blackjack pays 3:2 rounded down, a win pays 1:1, a push returns the stake.
    /// Returns `None` if the amount does not fit in an `i64`.
    pub fn payout(self, wager: i64) -> Option<i64> {
        match self {
            GameResult::PlayerBlackjack => wager
                .checked_mul(2)
                .and_then(|w| w.checked_add(wager / 2)),
            GameResult::PlayerWin => wager.checked_mul(2),
            GameResult::Push => Some(wager),
            GameResult::DealerWin | GameResult::PlayerBust => Some(0),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            GameResult::PlayerBlackjack => "Blackjack! You win",
            GameResult::PlayerWin => "You win",
            GameResult::Push => "Push",
            GameResult::DealerWin => "Dealer wins",
            GameResult::PlayerBust => "Bust! Dealer wins",
        }
    }
}

impl Write for GameResult {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameResult {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::PlayerBlackjack),
            1 => Ok(Self::PlayerWin),
            2 => Ok(Self::Push),
            3 => Ok(Self::DealerWin),
            4 => Ok(Self::PlayerBust),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameResult {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Playing,
    Resolved(GameResult),
}

/// What drove a session to its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cause {
    /// A player action (or a natural on the deal).
    Action,
    /// The expiry timer fired while the game was still in play.
    Expired,
    /// The table was closed with the game still in play.
    Shutdown,
}

/// Read-only view of a game handed to the front-end.
///
/// While the game is in play the dealer's first card is hidden and the dealer total is
/// withheld.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: u64,
    pub wager: i64,
    pub player_hand: Vec<Card>,
    pub player_value: u8,
    pub player_soft: bool,
    pub dealer_hand: Vec<Option<Card>>,
    pub dealer_value: Option<u8>,
    pub phase: Phase,
    pub can_double_down: bool,
    pub payout: Option<i64>,
    pub cause: Option<Cause>,
    pub expires_at: u64,
}

impl SessionSnapshot {
    pub fn result(&self) -> Option<GameResult> {
        match self.phase {
            Phase::Playing => None,
            Phase::Resolved(result) => Some(result),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.phase, Phase::Resolved(_))
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🃏 Blackjack (bet {})", self.wager)?;

        let dealer = self
            .dealer_hand
            .iter()
            .map(|card| match card {
                Some(card) => card.to_string(),
                None => "🂠".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        match self.dealer_value {
            Some(value) => writeln!(f, "Dealer: {dealer} ({value})")?,
            None => writeln!(f, "Dealer: {dealer}")?,
        }

        let soft = if self.player_soft { "soft " } else { "" };
        write!(
            f,
            "You: {} ({soft}{})",
            format_cards(&self.player_hand),
            self.player_value
        )?;

        match self.phase {
            Phase::Playing => {
                if self.can_double_down {
                    write!(f, "\n!hit, !stand or !double")
                } else {
                    write!(f, "\n!hit or !stand")
                }
            }
            Phase::Resolved(result) => {
                match self.cause {
                    Some(Cause::Expired) => write!(f, "\nGame expired, wager returned.")?,
                    Some(Cause::Shutdown) => write!(f, "\nTable closed, wager returned.")?,
                    _ => write!(f, "\n{}.", result.describe())?,
                }
                if let Some(payout) = self.payout {
                    write!(f, " Payout: {payout}")?;
                }
                Ok(())
            }
        }
    }
}
