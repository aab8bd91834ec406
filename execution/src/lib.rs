//! Parlor execution layer.
//!
//! This crate holds the balance ledger and the blackjack tables that spend from it:
//! - [Ledger]: accounts, transfers, daily rewards and the balance leaderboard, over a
//!   pluggable [State] store ([Memory] or [Disk]).
//! - [casino]: hand evaluation and the card [casino::Shoe].
//! - [Registry] and [Scheduler]: one live game per (chat, player) and its expiry timer.
//! - [Engine]: the game lifecycle, tying the pieces together.
//!
//! ## Money invariants
//! - A game debits its wager when it starts and its extra wager on a double down.
//! - A game credits its payout exactly once, when it is resolved (by an action, its
//!   expiry, or a shutdown refund), and nothing else a game does touches the ledger.
//! - A table key holds at most one game at a time.
//!
//! ## Minimal table (example)
//! ```rust,ignore
//! use commonware_runtime::{deterministic, Runner};
//! use parlor_execution::{casino::RandomShoe, Engine, EngineConfig, Ledger, Memory};
//! use parlor_types::execution::AccountId;
//!
//! deterministic::Runner::default().start(|context| async move {
//!     let ledger = Ledger::new(Memory::default());
//!     let alice = AccountId::new("alice");
//!     ledger.credit(&alice, 100).await.unwrap();
//!
//!     let (engine, _expiries) = Engine::new(
//!         context,
//!         ledger,
//!         Box::new(RandomShoe::new(Some(1))),
//!         EngineConfig::default(),
//!     );
//!     let game = engine.start("lobby", &alice, 10).await.unwrap();
//!     println!("{game}");
//! });
//! ```

pub mod casino;
mod engine;
mod error;
mod ledger;
mod registry;
mod scheduler;
mod session;
mod state;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


pub use engine::{Engine, EngineConfig, Expiry};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use registry::{CreateError, Registry, Seat, TableKey};
pub use scheduler::Scheduler;
pub use session::Session;
pub use state::{Disk, Memory, State, Status};
