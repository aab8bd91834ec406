//! Chat commands.
//!
//! [Dispatcher::handle] turns one chat message into at most one [Reply]. Messages that
//! are not commands we know are ignored so other bots in the same chat can answer them.

use crate::{identity::IdentityResolver, messenger::Reply};
use commonware_runtime::{Clock, Metrics, Spawner};
use parlor_execution::{Engine, Error, Expiry, State, TableKey};
use parlor_types::{casino::SessionSnapshot, execution::AccountId};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{debug, error};

const HELP: &str = "Commands:\n\
!balance [name] - show a balance\n\
!daily - claim your daily coins\n\
!give <name> <amount> - send coins\n\
!topbal - richest players\n\
!blackjack <bet> - start a game\n\
!hit, !stand, !double - play your game";

/// A parsed chat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Balance { who: Option<String> },
    Daily,
    Give { to: String, amount: i64 },
    Top,
    Blackjack { wager: i64 },
    Hit,
    Stand,
    Double,
    Mint { to: String, amount: i64 },
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ParseError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("{0:?} is not a whole number.")]
    Amount(String),
}

fn amount(value: &str) -> Result<i64, ParseError> {
    value
        .parse::<i64>()
        .map_err(|_| ParseError::Amount(value.to_string()))
}

impl Command {
    /// `None` if `text` is not one of our commands.
    pub fn parse(text: &str) -> Option<Result<Self, ParseError>> {
        let mut words = text.split_whitespace();
        let name = words.next()?.strip_prefix('!')?.to_lowercase();
        let args: Vec<&str> = words.collect();
        let command = match name.as_str() {
            "help" => Ok(Self::Help),
            "balance" | "bal" => Ok(Self::Balance {
                who: args.first().map(|who| who.to_string()),
            }),
            "daily" => Ok(Self::Daily),
            "give" => match args.as_slice() {
                [to, value] => amount(value).map(|amount| Self::Give {
                    to: to.to_string(),
                    amount,
                }),
                _ => Err(ParseError::Usage("!give <name> <amount>")),
            },
            "topbal" => Ok(Self::Top),
            "blackjack" | "bj" => match args.as_slice() {
                [value] => amount(value).map(|wager| Self::Blackjack { wager }),
                _ => Err(ParseError::Usage("!blackjack <bet>")),
            },
            "hit" => Ok(Self::Hit),
            "stand" => Ok(Self::Stand),
            "double" => Ok(Self::Double),
            "mint" => match args.as_slice() {
                [to, value] => amount(value).map(|amount| Self::Mint {
                    to: to.to_string(),
                    amount,
                }),
                _ => Err(ParseError::Usage("!mint <name> <amount>")),
            },
            _ => return None,
        };
        Some(command)
    }
}

/// Text shown for a failed operation.
pub fn describe(err: &Error) -> String {
    match err {
        Error::InvalidAmount(_) => "Amount must be a positive number.".to_string(),
        Error::InsufficientFunds { balance, requested } => {
            format!("Not enough coins: you have {balance}, you need {requested}.")
        }
        Error::AlreadyActive => {
            "You already have a game running here. Use !hit, !stand or !double.".to_string()
        }
        Error::NoActiveSession => {
            "You have no game running here. Start one with !blackjack <bet>.".to_string()
        }
        Error::ActionNotAllowed(reason) => {
            let mut chars = reason.chars();
            match chars.next() {
                Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
                None => "Not allowed.".to_string(),
            }
        }
        Error::Cooldown { remaining } => {
            let hours = remaining / 3_600;
            let minutes = (remaining % 3_600) / 60;
            format!("Daily already claimed. Come back in {hours}h {minutes}m.")
        }
        Error::InvalidAccount => "That account id cannot be used.".to_string(),
        Error::Overflow => "That amount is too large.".to_string(),
        Error::Storage(err) => {
            error!(?err, "storage failure");
            "Something went wrong, try again later.".to_string()
        }
    }
}

/// Runs chat commands against an [Engine].
pub struct Dispatcher<E, S>
where
    E: Spawner + Clock + Metrics + Clone + Send + Sync + 'static,
    S: State + 'static,
{
    engine: Engine<E, S>,
    identities: Arc<dyn IdentityResolver>,
    admins: HashSet<AccountId>,
    daily_amount: i64,
}

impl<E, S> Dispatcher<E, S>
where
    E: Spawner + Clock + Metrics + Clone + Send + Sync + 'static,
    S: State + 'static,
{
    pub fn new(
        engine: Engine<E, S>,
        identities: Arc<dyn IdentityResolver>,
        admins: impl IntoIterator<Item = AccountId>,
        daily_amount: i64,
    ) -> Self {
        Self {
            engine,
            identities,
            admins: admins.into_iter().collect(),
            daily_amount,
        }
    }

    pub fn engine(&self) -> &Engine<E, S> {
        &self.engine
    }

    /// Handle a message from `sender` in `chat`.
    pub async fn handle(&self, chat: &str, sender: &AccountId, text: &str) -> Option<Reply> {
        let command = match Command::parse(text)? {
            Ok(command) => command,
            Err(err) => return Some(Reply::text(chat, err.to_string())),
        };
        debug!(chat, sender = %sender, ?command, "command");
        let reply = match self.execute(chat, sender, command).await {
            Ok(reply) => reply,
            Err(err) => Reply::text(chat, describe(&err)),
        };
        Some(reply)
    }

    /// Notice for a game the timer resolved.
    pub fn expired(&self, expiry: &Expiry) -> Reply {
        self.game(&expiry.key, &expiry.snapshot)
    }

    fn game(&self, key: &TableKey, snapshot: &SessionSnapshot) -> Reply {
        let label = self.identities.label(&key.player);
        Reply::threaded(
            &key.chat,
            key.to_string(),
            snapshot.is_resolved(),
            format!("{label}\n{snapshot}"),
        )
    }

    async fn execute(&self, chat: &str, sender: &AccountId, command: Command) -> Result<Reply, Error> {
        if !sender.is_valid() {
            return Err(Error::InvalidAccount);
        }
        let ledger = self.engine.ledger();
        let reply = match command {
            Command::Help => Reply::text(chat, HELP),
            Command::Balance { who } => {
                let id = match who {
                    Some(who) => match self.identities.lookup(&who) {
                        Some(id) => id,
                        None => return Ok(unknown(chat, &who)),
                    },
                    None => sender.clone(),
                };
                let balance = ledger.balance(&id).await?;
                Reply::text(chat, format!("{}: {balance} coins", self.identities.label(&id)))
            }
            Command::Daily => {
                let balance = ledger
                    .claim_daily(sender, self.engine.now(), self.daily_amount)
                    .await?;
                Reply::text(
                    chat,
                    format!("+{} coins! Balance: {balance}", self.daily_amount),
                )
            }
            Command::Give { to, amount } => {
                let Some(recipient) = self.identities.lookup(&to) else {
                    return Ok(unknown(chat, &to));
                };
                let (balance, _) = ledger.transfer(sender, &recipient, amount).await?;
                Reply::text(
                    chat,
                    format!(
                        "Sent {amount} coins to {}. Balance: {balance}",
                        self.identities.label(&recipient)
                    ),
                )
            }
            Command::Top => {
                let entries = ledger.top().await?;
                if entries.is_empty() {
                    Reply::text(chat, "No balances yet.")
                } else {
                    let lines: Vec<String> = entries
                        .iter()
                        .map(|entry| {
                            format!(
                                "{}. {}: {}",
                                entry.rank,
                                self.identities.label(&entry.account),
                                entry.balance
                            )
                        })
                        .collect();
                    Reply::text(chat, format!("🏆 Top balances\n{}", lines.join("\n")))
                }
            }
            Command::Blackjack { wager } => {
                let snapshot = self.engine.start(chat, sender, wager).await?;
                self.game(&TableKey::new(chat, sender.clone()), &snapshot)
            }
            Command::Hit | Command::Stand | Command::Double => {
                let key = TableKey::new(chat, sender.clone());
                let snapshot = match command {
                    Command::Hit => self.engine.hit(&key).await?,
                    Command::Stand => self.engine.stand(&key).await?,
                    _ => self.engine.double_down(&key).await?,
                };
                self.game(&key, &snapshot)
            }
            Command::Mint { to, amount } => {
                if !self.admins.contains(sender) {
                    return Ok(Reply::text(chat, "Only admins can mint coins."));
                }
                let Some(recipient) = self.identities.lookup(&to) else {
                    return Ok(unknown(chat, &to));
                };
                let balance = ledger.mint(&recipient, amount).await?;
                Reply::text(
                    chat,
                    format!(
                        "Adjusted {} by {amount}. Balance: {balance}",
                        self.identities.label(&recipient)
                    ),
                )
            }
        };
        Ok(reply)
    }
}

fn unknown(chat: &str, who: &str) -> Reply {
    Reply::text(chat, format!("I don't know who {who} is."))
}
