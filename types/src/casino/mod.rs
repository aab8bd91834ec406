//! Casino domain types.
//!
//! Defines cards, game results, session snapshots, the balance leaderboard and the
//! constants used by the execution layer and the front-end.

mod card;
mod codec;
mod constants;
mod game;
mod leaderboard;

pub use card::*;
pub use codec::{read_string, string_encode_size, write_string};
pub use constants::*;
pub use game::*;
pub use leaderboard::*;
