use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};

use super::LEADERBOARD_SIZE;
use crate::execution::AccountId;

/// Leaderboard entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub account: AccountId,
    pub balance: i64,
    pub rank: u32,
}

impl Write for LeaderboardEntry {
    fn write(&self, writer: &mut impl BufMut) {
        self.account.write(writer);
        self.balance.write(writer);
        self.rank.write(writer);
    }
}

impl Read for LeaderboardEntry {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            account: AccountId::read(reader)?,
            balance: i64::read(reader)?,
            rank: u32::read(reader)?,
        })
    }
}

impl EncodeSize for LeaderboardEntry {
    fn encode_size(&self) -> usize {
        self.account.encode_size() + self.balance.encode_size() + self.rank.encode_size()
    }
}

/// Richest accounts, sorted by balance (highest first).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Record the latest balance of an account. Accounts without a positive balance are
    /// not ranked.
    pub fn update(&mut self, account: &AccountId, balance: i64) {
        if let Some(idx) = self.entries.iter().position(|e| &e.account == account) {
            self.entries.remove(idx);
        }
        if balance <= 0 {
            self.rerank();
            return;
        }

        // Full board and not better than the last entry
        if self.entries.len() >= LEADERBOARD_SIZE {
            if let Some(last) = self.entries.last() {
                if balance <= last.balance {
                    return;
                }
            }
        }

        // Ties keep their existing order (the newcomer goes after them)
        let insert_pos = self.entries.partition_point(|e| e.balance >= balance);
        self.entries.insert(
            insert_pos,
            LeaderboardEntry {
                account: account.clone(),
                balance,
                rank: 0,
            },
        );

        self.entries.truncate(LEADERBOARD_SIZE);
        self.rerank();
    }

    fn rerank(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.rank = (i + 1) as u32;
        }
    }
}

impl Write for Leaderboard {
    fn write(&self, writer: &mut impl BufMut) {
        self.entries.write(writer);
    }
}

impl Read for Leaderboard {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            entries: Vec::<LeaderboardEntry>::read_range(reader, 0..=LEADERBOARD_SIZE)?,
        })
    }
}

impl EncodeSize for Leaderboard {
    fn encode_size(&self) -> usize {
        self.entries.encode_size()
    }
}
