//! Blackjack tables on top of the [Ledger].
//!
//! A wager is debited when the game starts (and again on a double down). The game is then
//! paid out exactly once, by [Engine::resolve], whichever of a player action, the expiry
//! timer or a shutdown gets there first. Every path that touches a game holds that table's
//! [Seat] for its whole duration, so a racing timer finds the game already gone.

use crate::{
    casino::{
        blackjack::{dealer_play, hand_value, is_bust, natural, settle},
        Shoe,
    },
    ledger::Ledger,
    registry::{CreateError, Registry, Seat, TableKey},
    scheduler::Scheduler,
    session::Session,
    state::State,
    Error, Result,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use futures::channel::mpsc;
use parlor_types::{
    casino::{Card, Cause, GameResult, Phase, SessionSnapshot, SESSION_EXPIRY_SECS},
    execution::AccountId,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, SystemTime},
};
use tracing::{debug, info, warn};

/// Table configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a game may sit idle before it is refunded.
    pub session_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(SESSION_EXPIRY_SECS),
        }
    }
}

/// A game resolved by its expiry timer rather than by the player.
#[derive(Clone, Debug)]
pub struct Expiry {
    pub key: TableKey,
    pub snapshot: SessionSnapshot,
}

struct Inner<E: Spawner + Clock + Metrics, S: State> {
    context: E,
    ledger: Ledger<S>,
    shoe: Mutex<Box<dyn Shoe>>,
    registry: Registry<Session>,
    scheduler: Scheduler<E>,
    next_id: AtomicU64,
    expiries: mpsc::UnboundedSender<Expiry>,
}

pub struct Engine<E: Spawner + Clock + Metrics, S: State> {
    inner: Arc<Inner<E, S>>,
}

impl<E: Spawner + Clock + Metrics, S: State> Clone for Engine<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn unix_seconds(now: SystemTime) -> u64 {
    match now.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    }
}

/// The game held by `seat`, if it is still being played.
fn playing(seat: &mut Seat<Session>) -> Result<&mut Session> {
    match seat.get_mut() {
        Some(session) if session.is_playing() => Ok(session),
        _ => Err(Error::NoActiveSession),
    }
}

impl<E, S> Engine<E, S>
where
    E: Spawner + Clock + Metrics + Clone + Send + Sync + 'static,
    S: State + 'static,
{
    /// Create an engine. Games resolved by their timer are published on the returned
    /// receiver.
    pub fn new(
        context: E,
        ledger: Ledger<S>,
        shoe: Box<dyn Shoe>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (expiries, receiver) = mpsc::unbounded();
        let scheduler = Scheduler::new(context.with_label("scheduler"), config.session_ttl);
        let engine = Self {
            inner: Arc::new(Inner {
                context,
                ledger,
                shoe: Mutex::new(shoe),
                registry: Registry::new(),
                scheduler,
                next_id: AtomicU64::new(1),
                expiries,
            }),
        };
        (engine, receiver)
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.inner.ledger
    }

    /// Number of games in progress.
    pub fn active_sessions(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of armed expiry timers.
    pub fn pending_expiries(&self) -> usize {
        self.inner.scheduler.pending()
    }

    /// Current unix time (seconds) according to the runtime clock.
    pub fn now(&self) -> u64 {
        unix_seconds(self.inner.context.current())
    }

    fn draw(&self) -> Card {
        let mut shoe = self.inner.shoe.lock().unwrap_or_else(PoisonError::into_inner);
        shoe.draw()
    }

    /// Opening cards, dealt player, dealer, player, dealer.
    fn deal(&self) -> (Vec<Card>, Vec<Card>) {
        let mut shoe = self.inner.shoe.lock().unwrap_or_else(PoisonError::into_inner);
        let mut player = Vec::with_capacity(2);
        let mut dealer = Vec::with_capacity(2);
        for _ in 0..2 {
            player.push(shoe.draw());
            dealer.push(shoe.draw());
        }
        (player, dealer)
    }

    fn dealer_turn(&self, dealer: &mut Vec<Card>) {
        let mut shoe = self.inner.shoe.lock().unwrap_or_else(PoisonError::into_inner);
        dealer_play(dealer, &mut **shoe);
    }

    fn arm(&self, key: TableKey, session: u64) {
        let engine = self.clone();
        let task_key = key.clone();
        self.inner.scheduler.schedule(key, session, move || async move {
            engine.expire(task_key, session).await;
        });
    }

    /// Debit `wager` and deal a new game for `player` in `chat`.
    ///
    /// Fails without side effects if the wager is not positive, a game is already running
    /// at this table, or the player cannot cover the wager. A natural on either side is
    /// settled immediately.
    pub async fn start(&self, chat: &str, player: &AccountId, wager: i64) -> Result<SessionSnapshot> {
        if wager <= 0 {
            return Err(Error::InvalidAmount(wager));
        }
        let key = TableKey::new(chat, player.clone());
        let ttl = self.inner.scheduler.ttl().as_secs();
        let mut seat = self
            .inner
            .registry
            .try_create(&key, || async {
                self.inner.ledger.debit(player, wager).await?;
                let (player_cards, dealer_cards) = self.deal();
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                Ok::<_, Error>(Session::new(
                    id,
                    wager,
                    player_cards,
                    dealer_cards,
                    self.now(),
                    ttl,
                ))
            })
            .await
            .map_err(|err| match err {
                CreateError::AlreadyActive => Error::AlreadyActive,
                CreateError::Factory(err) => err,
            })?;

        let session = playing(&mut seat)?;
        let id = session.id;
        let opening = natural(&session.player, &session.dealer);
        let snapshot = session.snapshot(None, None);
        info!(table = %key, session = id, wager, "game started");

        // Armed before any settlement so a failed payout is still refunded later
        self.arm(key, id);
        if let Some(result) = opening {
            return self.resolve(&mut seat, result, Cause::Action).await;
        }
        Ok(snapshot)
    }

    /// Draw one card. Going over 21 loses the game.
    pub async fn hit(&self, key: &TableKey) -> Result<SessionSnapshot> {
        let mut seat = self.inner.registry.seat(key).await;
        let session = playing(&mut seat)?;
        session.player.push(self.draw());
        session.can_double_down = false;
        if is_bust(&session.player) {
            return self
                .resolve(&mut seat, GameResult::PlayerBust, Cause::Action)
                .await;
        }
        Ok(session.snapshot(None, None))
    }

    /// Stop drawing. The dealer plays out and the game is settled.
    pub async fn stand(&self, key: &TableKey) -> Result<SessionSnapshot> {
        let mut seat = self.inner.registry.seat(key).await;
        let session = playing(&mut seat)?;
        self.dealer_turn(&mut session.dealer);
        let result = settle(&session.player, &session.dealer);
        self.resolve(&mut seat, result, Cause::Action).await
    }

    /// Double the wager, take exactly one card, then settle.
    pub async fn double_down(&self, key: &TableKey) -> Result<SessionSnapshot> {
        let mut seat = self.inner.registry.seat(key).await;
        let session = playing(&mut seat)?;
        if !session.can_double_down {
            return Err(Error::ActionNotAllowed(
                "double down is only allowed on your first two cards",
            ));
        }
        let doubled = session.wager.checked_mul(2).ok_or(Error::Overflow)?;
        self.inner.ledger.debit(&key.player, session.wager).await?;
        session.wager = doubled;
        session.can_double_down = false;
        session.player.push(self.draw());
        let result = if is_bust(&session.player) {
            GameResult::PlayerBust
        } else {
            self.dealer_turn(&mut session.dealer);
            settle(&session.player, &session.dealer)
        };
        info!(table = %key, session = session.id, wager = doubled, "doubled down");
        self.resolve(&mut seat, result, Cause::Action).await
    }

    /// Current view of the game at `key`, if one is running.
    pub async fn session(&self, key: &TableKey) -> Option<SessionSnapshot> {
        let seat = self.inner.registry.seat(key).await;
        seat.get().map(|session| session.snapshot(None, None))
    }

    /// Timer entry point: refund `session_id` at `key` if it is still being played.
    pub async fn expire(&self, key: TableKey, session_id: u64) -> Option<SessionSnapshot> {
        let mut seat = self.inner.registry.seat(&key).await;
        match seat.get() {
            Some(session) if session.id == session_id && session.is_playing() => {}
            _ => {
                debug!(table = %key, session = session_id, "stale expiry ignored");
                return None;
            }
        }
        match self.resolve(&mut seat, GameResult::Push, Cause::Expired).await {
            Ok(snapshot) => {
                let expiry = Expiry {
                    key: key.clone(),
                    snapshot: snapshot.clone(),
                };
                if self.inner.expiries.unbounded_send(expiry).is_err() {
                    debug!(table = %key, "expiry receiver dropped");
                }
                Some(snapshot)
            }
            Err(err) => {
                warn!(table = %key, session = session_id, ?err, "failed to expire game, retrying later");
                self.arm(key, session_id);
                None
            }
        }
    }

    /// Refund every game still in progress.
    pub async fn shutdown(&self) -> Vec<(TableKey, SessionSnapshot)> {
        let mut refunded = Vec::new();
        for key in self.inner.registry.keys() {
            let mut seat = self.inner.registry.seat(&key).await;
            if playing(&mut seat).is_err() {
                continue;
            }
            match self.resolve(&mut seat, GameResult::Push, Cause::Shutdown).await {
                Ok(snapshot) => refunded.push((key, snapshot)),
                Err(err) => warn!(table = %key, ?err, "failed to refund game on shutdown"),
            }
        }
        refunded
    }

    /// The single point where a game ends: pay out, then retire the game.
    ///
    /// The payout is credited while the game is still registered, so if the credit fails
    /// the game stays in play and can be resolved again.
    async fn resolve(
        &self,
        seat: &mut Seat<Session>,
        result: GameResult,
        cause: Cause,
    ) -> Result<SessionSnapshot> {
        let key = seat.key().clone();
        let session = playing(seat)?;
        let payout = result.payout(session.wager).ok_or(Error::Overflow)?;
        if payout > 0 {
            self.inner.ledger.credit(&key.player, payout).await?;
        }

        session.phase = Phase::Resolved(result);
        let snapshot = session.snapshot(Some(payout), Some(cause));
        let id = session.id;
        let (player_value, _) = hand_value(&session.player);
        seat.take();
        self.inner.scheduler.cancel(&key, id);
        info!(
            table = %key,
            session = id,
            ?result,
            ?cause,
            payout,
            player_value,
            dealer_value = ?snapshot.dealer_value,
            "game resolved"
        );
        Ok(snapshot)
    }
}
