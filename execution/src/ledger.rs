//! Balance ledger.
//!
//! All balance changes go through [Ledger]. Each operation is a read-modify-write performed
//! while holding the store lock, and every account write carries the refreshed leaderboard
//! in the same batch.

use crate::{
    state::{load_account, load_leaderboard, State, Status},
    Error, Result,
};
use parlor_types::{
    casino::{LeaderboardEntry, DAILY_CLAIM_COOLDOWN_SECS},
    execution::{Account, AccountId, Key, Value},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct Ledger<S: State> {
    state: Arc<Mutex<S>>,
}

impl<S: State> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S: State> Ledger<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Return the account, creating it with a zero balance if it does not exist.
    pub async fn ensure(&self, id: &AccountId) -> Result<Account> {
        let mut state = self.state.lock().await;
        if let Some(account) = load_account(&*state, id).await? {
            return Ok(account);
        }
        let account = Account::default();
        commit(&mut *state, vec![(id, account.clone())]).await?;
        debug!(account = %id, "created account");
        Ok(account)
    }

    /// Current balance. Unknown accounts read as zero and are not written.
    pub async fn balance(&self, id: &AccountId) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(load_account(&*state, id).await?.unwrap_or_default().balance)
    }

    /// Remove `amount` from the account. Never takes a balance below zero.
    pub async fn debit(&self, id: &AccountId, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        let mut account = load_account(&*state, id).await?.unwrap_or_default();
        if account.balance < amount {
            return Err(Error::InsufficientFunds {
                balance: account.balance,
                requested: amount,
            });
        }
        account.balance -= amount;
        let balance = account.balance;
        commit(&mut *state, vec![(id, account)]).await?;
        debug!(account = %id, amount, balance, "debited");
        Ok(balance)
    }

    pub async fn credit(&self, id: &AccountId, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        let mut account = load_account(&*state, id).await?.unwrap_or_default();
        account.balance = account.balance.checked_add(amount).ok_or(Error::Overflow)?;
        let balance = account.balance;
        commit(&mut *state, vec![(id, account)]).await?;
        debug!(account = %id, amount, balance, "credited");
        Ok(balance)
    }

    /// Move `amount` between two accounts. Both sides are written in one batch.
    pub async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: i64,
    ) -> Result<(i64, i64)> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        if from == to {
            return Err(Error::ActionNotAllowed("cannot transfer to yourself"));
        }
        let mut state = self.state.lock().await;
        let mut sender = load_account(&*state, from).await?.unwrap_or_default();
        let mut receiver = load_account(&*state, to).await?.unwrap_or_default();
        if sender.balance < amount {
            return Err(Error::InsufficientFunds {
                balance: sender.balance,
                requested: amount,
            });
        }
        receiver.balance = receiver.balance.checked_add(amount).ok_or(Error::Overflow)?;
        sender.balance -= amount;
        let balances = (sender.balance, receiver.balance);
        commit(&mut *state, vec![(from, sender), (to, receiver)]).await?;
        debug!(from = %from, to = %to, amount, "transferred");
        Ok(balances)
    }

    /// Grant `amount` if the account has never claimed or its last claim is at least a
    /// day old (`now` is unix seconds).
    pub async fn claim_daily(&self, id: &AccountId, now: u64, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let mut state = self.state.lock().await;
        let mut account = load_account(&*state, id).await?.unwrap_or_default();
        if let Some(last) = account.last_daily_claim {
            let elapsed = now.saturating_sub(last);
            if elapsed < DAILY_CLAIM_COOLDOWN_SECS {
                return Err(Error::Cooldown {
                    remaining: DAILY_CLAIM_COOLDOWN_SECS - elapsed,
                });
            }
        }
        account.balance = account.balance.checked_add(amount).ok_or(Error::Overflow)?;
        account.last_daily_claim = Some(now);
        let balance = account.balance;
        commit(&mut *state, vec![(id, account)]).await?;
        debug!(account = %id, amount, balance, "claimed daily reward");
        Ok(balance)
    }

    /// Administrative adjustment. Unlike [Ledger::debit] this may leave a negative balance.
    pub async fn mint(&self, id: &AccountId, delta: i64) -> Result<i64> {
        if delta == 0 {
            return Err(Error::InvalidAmount(delta));
        }
        let mut state = self.state.lock().await;
        let mut account = load_account(&*state, id).await?.unwrap_or_default();
        account.balance = account.balance.checked_add(delta).ok_or(Error::Overflow)?;
        let balance = account.balance;
        commit(&mut *state, vec![(id, account)]).await?;
        debug!(account = %id, delta, balance, "minted");
        Ok(balance)
    }

    /// Richest accounts, highest balance first.
    pub async fn top(&self) -> Result<Vec<LeaderboardEntry>> {
        let state = self.state.lock().await;
        Ok(load_leaderboard(&*state).await?.entries)
    }
}

async fn commit<S: State>(state: &mut S, accounts: Vec<(&AccountId, Account)>) -> Result<()> {
    // An id the store cannot decode would make the whole store unreadable
    if accounts.iter().any(|(id, _)| !id.is_valid()) {
        return Err(Error::InvalidAccount);
    }
    let mut leaderboard = load_leaderboard(state).await?;
    let mut changes = Vec::with_capacity(accounts.len() + 1);
    for (id, account) in accounts {
        leaderboard.update(id, account.balance);
        changes.push((
            Key::Account(id.clone()),
            Status::Update(Value::Account(account)),
        ));
    }
    changes.push((Key::Leaderboard, Status::Update(Value::Leaderboard(leaderboard))));
    state.apply(changes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Memory;
    use parlor_types::casino::MAX_ID_LENGTH;
    use commonware_runtime::{deterministic, Metrics, Runner, Spawner};

    fn id(name: &str) -> AccountId {
        AccountId::new(name)
    }

    #[test]
    fn test_new_account_starts_at_zero() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            assert_eq!(ledger.balance(&id("alice")).await.unwrap(), 0);
            let account = ledger.ensure(&id("alice")).await.unwrap();
            assert_eq!(account, Account::default());
        });
    }

    #[test]
    fn test_balance_lookup_creates_nothing() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            assert_eq!(ledger.balance(&id("bob")).await.unwrap(), 0);
            ledger.ensure(&id("carol")).await.unwrap();
            assert!(ledger.top().await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_rejects_unstorable_ids() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let long = AccountId::new("x".repeat(MAX_ID_LENGTH + 1));
            let empty = AccountId::new("");
            let alice = id("alice");
            ledger.credit(&alice, 100).await.unwrap();

            assert!(matches!(ledger.credit(&long, 10).await, Err(Error::InvalidAccount)));
            assert!(matches!(ledger.ensure(&empty).await, Err(Error::InvalidAccount)));
            assert!(matches!(
                ledger.transfer(&alice, &long, 10).await,
                Err(Error::InvalidAccount)
            ));
            assert_eq!(ledger.balance(&alice).await.unwrap(), 100);
            assert_eq!(ledger.balance(&long).await.unwrap(), 0);

            // Longest id that still fits
            let edge = AccountId::new("x".repeat(MAX_ID_LENGTH));
            assert_eq!(ledger.credit(&edge, 10).await.unwrap(), 10);
        });
    }

    #[test]
    fn test_debit_and_credit() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let alice = id("alice");
            assert_eq!(ledger.credit(&alice, 100).await.unwrap(), 100);
            assert_eq!(ledger.debit(&alice, 40).await.unwrap(), 60);
            assert_eq!(ledger.debit(&alice, 60).await.unwrap(), 0);

            assert!(matches!(
                ledger.debit(&alice, 1).await,
                Err(Error::InsufficientFunds {
                    balance: 0,
                    requested: 1
                })
            ));
            assert!(matches!(
                ledger.debit(&alice, 0).await,
                Err(Error::InvalidAmount(0))
            ));
            assert!(matches!(
                ledger.credit(&alice, -5).await,
                Err(Error::InvalidAmount(-5))
            ));
            assert_eq!(ledger.balance(&alice).await.unwrap(), 0);
        });
    }

    #[test]
    fn test_credit_overflow_leaves_balance() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let alice = id("alice");
            ledger.credit(&alice, i64::MAX).await.unwrap();
            assert!(matches!(ledger.credit(&alice, 1).await, Err(Error::Overflow)));
            assert_eq!(ledger.balance(&alice).await.unwrap(), i64::MAX);
        });
    }

    #[test]
    fn test_transfer() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let (alice, bob) = (id("alice"), id("bob"));
            ledger.credit(&alice, 100).await.unwrap();

            assert_eq!(ledger.transfer(&alice, &bob, 30).await.unwrap(), (70, 30));
            assert!(matches!(
                ledger.transfer(&alice, &bob, 71).await,
                Err(Error::InsufficientFunds { .. })
            ));
            assert!(matches!(
                ledger.transfer(&alice, &alice, 10).await,
                Err(Error::ActionNotAllowed(_))
            ));
            assert!(matches!(
                ledger.transfer(&alice, &bob, 0).await,
                Err(Error::InvalidAmount(0))
            ));
            assert_eq!(ledger.balance(&alice).await.unwrap(), 70);
            assert_eq!(ledger.balance(&bob).await.unwrap(), 30);
        });
    }

    #[test]
    fn test_daily_cooldown() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let alice = id("alice");
            let day = DAILY_CLAIM_COOLDOWN_SECS;

            assert_eq!(ledger.claim_daily(&alice, 1_000, 100).await.unwrap(), 100);
            assert!(matches!(
                ledger.claim_daily(&alice, 1_000 + day - 1, 100).await,
                Err(Error::Cooldown { remaining: 1 })
            ));
            assert_eq!(ledger.balance(&alice).await.unwrap(), 100);
            assert_eq!(
                ledger.claim_daily(&alice, 1_000 + day, 100).await.unwrap(),
                200
            );
            let account = ledger.ensure(&alice).await.unwrap();
            assert_eq!(account.last_daily_claim, Some(1_000 + day));
        });
    }

    #[test]
    fn test_mint_has_no_floor() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let alice = id("alice");
            assert_eq!(ledger.mint(&alice, -50).await.unwrap(), -50);
            assert!(matches!(
                ledger.debit(&alice, 1).await,
                Err(Error::InsufficientFunds { balance: -50, .. })
            ));
            assert_eq!(ledger.mint(&alice, 75).await.unwrap(), 25);
            assert!(matches!(
                ledger.mint(&alice, 0).await,
                Err(Error::InvalidAmount(0))
            ));
        });
    }

    #[test]
    fn test_leaderboard_tracks_writes() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let ledger = Ledger::new(Memory::default());
            let (alice, bob, carol) = (id("alice"), id("bob"), id("carol"));
            ledger.credit(&alice, 50).await.unwrap();
            ledger.credit(&bob, 80).await.unwrap();
            ledger.credit(&carol, 10).await.unwrap();
            ledger.transfer(&bob, &carol, 75).await.unwrap();

            let top = ledger.top().await.unwrap();
            let order: Vec<_> = top.iter().map(|e| e.account.as_str()).collect();
            assert_eq!(order, vec!["carol", "alice", "bob"]);
            assert_eq!(top[0].balance, 85);
            assert_eq!(top[2].rank, 3);
        });
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let ledger = Ledger::new(Memory::default());
            let alice = id("alice");
            ledger.credit(&alice, 100).await.unwrap();

            let mut handles = Vec::new();
            for i in 0..10 {
                let ledger = ledger.clone();
                let alice = alice.clone();
                handles.push(
                    context
                        .with_label(&format!("debit_{i}"))
                        .spawn(move |_| async move { ledger.debit(&alice, 30).await.is_ok() }),
                );
            }
            let mut successes = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    successes += 1;
                }
            }
            assert_eq!(successes, 3);
            assert_eq!(ledger.balance(&alice).await.unwrap(), 10);
        });
    }
}
