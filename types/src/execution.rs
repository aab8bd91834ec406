use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use std::fmt;

use crate::casino::{read_string, string_encode_size, write_string, Leaderboard, MAX_ID_LENGTH};

/// Stable identifier of a chat participant, as handed to us by the identity layer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Like [AccountId::new], but refuses ids that cannot be stored: empty ones and
    /// ones longer than [MAX_ID_LENGTH] bytes.
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let id = Self(id.into());
        id.is_valid().then_some(id)
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= MAX_ID_LENGTH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Write for AccountId {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.0, writer);
    }
}

impl Read for AccountId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(read_string(reader, MAX_ID_LENGTH)?))
    }
}

impl EncodeSize for AccountId {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.0)
    }
}

/// Balance record of a single account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: i64,
    /// Unix seconds of the last successful daily claim.
    pub last_daily_claim: Option<u64>,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.balance.write(writer);
        self.last_daily_claim.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            balance: i64::read(reader)?,
            last_daily_claim: Option::<u64>::read(reader)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.balance.encode_size() + self.last_daily_claim.encode_size()
    }
}

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Account balance (tag 0)
    Account(AccountId),
    /// Balance leaderboard (tag 1)
    Leaderboard,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(id) => {
                0u8.write(writer);
                id.write(writer);
            }
            Self::Leaderboard => 1u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(AccountId::read(reader)?),
            1 => Self::Leaderboard,
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Account(id) => id.encode_size(),
            Self::Leaderboard => 0,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Value {
    /// Account balance (tag 0)
    Account(Account),
    /// Balance leaderboard (tag 1)
    Leaderboard(Leaderboard),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Leaderboard(board) => {
                1u8.write(writer);
                board.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Leaderboard(Leaderboard::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Account(account) => account.encode_size(),
            Self::Leaderboard(board) => board.encode_size(),
        }
    }
}
