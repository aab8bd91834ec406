//! Outbound chat messages.
//!
//! A reply may belong to a thread (one per blackjack table). The first message of a
//! thread is posted, later ones edit it in place, and a closing message releases the
//! thread so the next game at that table starts a fresh one.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

/// A status message that is updated in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    /// Last update for this thread.
    pub closed: bool,
}

/// Something to say in a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub chat: String,
    pub thread: Option<Thread>,
    pub text: String,
}

impl Reply {
    pub fn text(chat: &str, text: impl Into<String>) -> Self {
        Self {
            chat: chat.to_string(),
            thread: None,
            text: text.into(),
        }
    }

    pub fn threaded(chat: &str, thread: impl Into<String>, closed: bool, text: impl Into<String>) -> Self {
        Self {
            chat: chat.to_string(),
            thread: Some(Thread {
                id: thread.into(),
                closed,
            }),
            text: text.into(),
        }
    }
}

/// Delivery of replies to the chat platform.
pub trait Messenger: Send + Sync {
    /// Post (or, for a known thread, edit) a message. Returns the platform message id.
    fn deliver(&self, chat: &str, thread: Option<&Thread>, text: &str) -> Result<u64>;

    fn send(&self, reply: &Reply) -> Result<u64> {
        self.deliver(&reply.chat, reply.thread.as_ref(), &reply.text)
    }
}

struct ConsoleState<W> {
    out: W,
    next_id: u64,
    threads: HashMap<(String, String), u64>,
}

/// Writes messages to a line-oriented sink (stdout by default).
pub struct Console<W: Write + Send> {
    state: Mutex<ConsoleState<W>>,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                out,
                next_id: 1,
                threads: HashMap::new(),
            }),
        }
    }

    /// Threads with a message still being edited.
    pub fn open_threads(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .threads
            .len()
    }

    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}

impl<W: Write + Send> Messenger for Console<W> {
    fn deliver(&self, chat: &str, thread: Option<&Thread>, text: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = thread.and_then(|thread| {
            state
                .threads
                .get(&(chat.to_string(), thread.id.clone()))
                .copied()
        });
        let (id, edited) = match existing {
            Some(id) => (id, true),
            None => {
                let id = state.next_id;
                state.next_id += 1;
                (id, false)
            }
        };
        if let Some(thread) = thread {
            let slot = (chat.to_string(), thread.id.clone());
            if thread.closed {
                state.threads.remove(&slot);
            } else {
                state.threads.insert(slot, id);
            }
        }

        let marker = if edited { " (edited)" } else { "" };
        writeln!(state.out, "[{chat}] #{id}{marker}").context("failed to write message")?;
        for line in text.lines() {
            writeln!(state.out, "  {line}").context("failed to write message")?;
        }
        state.out.flush().context("failed to flush output")?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_messages_get_new_ids() {
        let console = Console::new(Vec::new());
        assert_eq!(console.send(&Reply::text("lobby", "hello")).unwrap(), 1);
        assert_eq!(console.send(&Reply::text("lobby", "again")).unwrap(), 2);
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "[lobby] #1\n  hello\n[lobby] #2\n  again\n");
    }

    #[test]
    fn test_thread_is_edited_until_closed() {
        let console = Console::new(Vec::new());
        let first = console
            .send(&Reply::threaded("lobby", "lobby/alice", false, "dealt"))
            .unwrap();
        let update = console
            .send(&Reply::threaded("lobby", "lobby/alice", false, "hit"))
            .unwrap();
        assert_eq!(first, update);
        assert_eq!(console.open_threads(), 1);

        let last = console
            .send(&Reply::threaded("lobby", "lobby/alice", true, "won"))
            .unwrap();
        assert_eq!(last, first);
        assert_eq!(console.open_threads(), 0);

        // Next game posts a new status message
        let next = console
            .send(&Reply::threaded("lobby", "lobby/alice", false, "dealt"))
            .unwrap();
        assert_ne!(next, first);

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("[lobby] #1 (edited)\n  won\n"));
    }

    #[test]
    fn test_threads_are_scoped_per_chat() {
        let console = Console::new(Vec::new());
        let a = console
            .send(&Reply::threaded("a", "t", false, "one"))
            .unwrap();
        let b = console
            .send(&Reply::threaded("b", "t", false, "two"))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(console.open_threads(), 2);
    }
}
