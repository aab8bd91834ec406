/// Maximum length (in bytes) of an account identifier
pub const MAX_ID_LENGTH: usize = 128;

/// Minimum time between two daily claims by the same account
pub const DAILY_CLAIM_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Amount granted by a daily claim unless configured otherwise
pub const DEFAULT_DAILY_AMOUNT: i64 = 100;

/// Game session expiry in seconds
pub const SESSION_EXPIRY_SECS: u64 = 120;

/// Number of accounts tracked by the leaderboard
pub const LEADERBOARD_SIZE: usize = 10;

/// Dealer draws while below this total (stands on all 17s)
pub const DEALER_STAND_TOTAL: u8 = 17;

/// Cards in a single deck
pub const DECK_SIZE: u8 = 52;
