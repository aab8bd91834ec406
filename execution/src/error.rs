/// Errors returned by ledger and table operations.
///
/// Every variant leaves state untouched unless noted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("amount must be positive (got {0})")]
    InvalidAmount(i64),
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },
    #[error("a game is already in progress")]
    AlreadyActive,
    #[error("no game in progress")]
    NoActiveSession,
    #[error("action not allowed: {0}")]
    ActionNotAllowed(&'static str),
    #[error("daily reward already claimed, {remaining}s remaining")]
    Cooldown { remaining: u64 },
    #[error("invalid account id")]
    InvalidAccount,
    #[error("balance overflow")]
    Overflow,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
