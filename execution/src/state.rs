use anyhow::{anyhow, Context as _, Result};
use commonware_codec::{EncodeSize, FixedSize, ReadExt, Write};
use commonware_cryptography::{
    sha256::{Digest, Sha256},
    Hasher,
};
use commonware_runtime::{Blob, Storage};
use parlor_types::{
    casino::Leaderboard,
    execution::{Account, AccountId, Key, Value},
};
use std::{collections::HashMap, future::Future};
use tracing::{debug, warn};

/// Key/value store backing the ledger.
pub trait State: Send + Sync {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>> + Send;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = Result<()>> + Send;
    fn delete(&mut self, key: &Key) -> impl Future<Output = Result<()>> + Send;

    /// Apply a batch of changes. Stores that can commit atomically override this.
    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = Result<()>> + Send {
        async move {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await?,
                    Status::Delete => self.delete(&key).await?,
                }
            }
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct Memory {
    state: HashMap<Key, Value>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}

/// Blob names of the two snapshot slots.
const SLOTS: [&[u8]; 2] = [b"snapshot-0", b"snapshot-1"];

/// Store persisted as whole snapshots in a runtime [Storage] partition.
///
/// Each snapshot is framed as `[version:u64][len:u32][payload][sha256(header || payload)]`
/// where the payload is `[count:u32]` followed by `count` encoded `(Key, Value)` pairs.
/// Snapshot `n` is written to slot `n % 2` and synced before it counts as committed, so
/// the previous snapshot is left untouched until the next one is durable.
pub struct Disk<B: Blob> {
    slots: [B; 2],
    version: u64,
    state: HashMap<Key, Value>,
}

enum Slot {
    Empty,
    Torn,
    Intact(u64, HashMap<Key, Value>),
}

impl<B: Blob> Disk<B> {
    /// Load the newest intact snapshot in `partition`, or start empty if there is none.
    pub async fn open<E: Storage<Blob = B>>(context: &E, partition: &str) -> Result<Self> {
        let (first, first_len) = context
            .open(partition, SLOTS[0])
            .await
            .with_context(|| format!("open {partition} slot 0"))?;
        let (second, second_len) = context
            .open(partition, SLOTS[1])
            .await
            .with_context(|| format!("open {partition} slot 1"))?;
        let loaded = [
            load_slot(&first, first_len)
                .await
                .with_context(|| format!("load {partition} slot 0"))?,
            load_slot(&second, second_len)
                .await
                .with_context(|| format!("load {partition} slot 1"))?,
        ];

        let mut version = 0;
        let mut state = HashMap::new();
        let mut torn = 0;
        for (slot, loaded) in loaded.into_iter().enumerate() {
            match loaded {
                Slot::Empty => {}
                Slot::Torn => {
                    warn!(partition, slot, "ignoring incomplete snapshot");
                    torn += 1;
                }
                Slot::Intact(found, snapshot) if found > version => {
                    version = found;
                    state = snapshot;
                }
                Slot::Intact(..) => {}
            }
        }
        if torn == SLOTS.len() {
            return Err(anyhow!("no intact snapshot in {partition}"));
        }
        debug!(partition, version, records = state.len(), "opened snapshot");
        Ok(Self {
            slots: [first, second],
            version,
            state,
        })
    }

    /// Version of the last committed snapshot (0 if nothing was ever written).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    async fn persist(&mut self) -> Result<()> {
        let version = self.version + 1;
        let record = encode_record(version, &encode_snapshot(&self.state));
        let len = record.len() as u64;
        let blob = &self.slots[(version % 2) as usize];
        blob.write_at(record, 0).await.context("write snapshot")?;
        blob.resize(len).await.context("resize snapshot")?;
        blob.sync().await.context("sync snapshot")?;
        self.version = version;
        Ok(())
    }
}

impl<B: Blob> State for Disk<B> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        let previous = self.state.insert(key.clone(), value);
        if let Err(err) = self.persist().await {
            match previous {
                Some(previous) => self.state.insert(key, previous),
                None => self.state.remove(&key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        let Some(previous) = self.state.remove(key) else {
            return Ok(());
        };
        if let Err(err) = self.persist().await {
            self.state.insert(key.clone(), previous);
            return Err(err);
        }
        Ok(())
    }

    async fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        let mut undo = Vec::with_capacity(changes.len());
        for (key, status) in changes {
            let previous = match status {
                Status::Update(value) => self.state.insert(key.clone(), value),
                Status::Delete => self.state.remove(&key),
            };
            undo.push((key, previous));
        }
        if let Err(err) = self.persist().await {
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(previous) => self.state.insert(key, previous),
                    None => self.state.remove(&key),
                };
            }
            return Err(err);
        }
        Ok(())
    }
}

async fn load_slot<B: Blob>(blob: &B, len: u64) -> Result<Slot> {
    if len == 0 {
        return Ok(Slot::Empty);
    }
    let buf = blob
        .read_at(vec![0u8; usize::try_from(len)?], 0)
        .await
        .context("read snapshot")?;
    let bytes: Vec<u8> = buf.into();
    let Some((version, payload)) = decode_record(&bytes) else {
        return Ok(Slot::Torn);
    };
    // A payload that passed its checksum but does not decode is not a torn write
    let state = decode_snapshot(payload).with_context(|| format!("decode snapshot {version}"))?;
    Ok(Slot::Intact(version, state))
}

fn encode_record(version: u64, payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(u64::SIZE + u32::SIZE + payload.len() + Digest::SIZE);
    version.write(&mut record);
    (payload.len() as u32).write(&mut record);
    record.extend_from_slice(payload);
    let checksum = Sha256::hash(&record);
    checksum.write(&mut record);
    record
}

/// Version and payload of a complete record, `None` if it is truncated or fails its checksum.
fn decode_record(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let mut reader = bytes;
    let version = u64::read(&mut reader).ok()?;
    let len = u32::read(&mut reader).ok()? as usize;
    if reader.len() < len {
        return None;
    }
    let header = bytes.len() - reader.len();
    let (payload, mut rest) = reader.split_at(len);
    let checksum = Digest::read(&mut rest).ok()?;
    (Sha256::hash(&bytes[..header + len]) == checksum).then_some((version, payload))
}

fn encode_snapshot(state: &HashMap<Key, Value>) -> Vec<u8> {
    // Sorted so identical state always produces identical bytes
    let mut entries: Vec<_> = state.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let size = 4 + entries
        .iter()
        .map(|(k, v)| k.encode_size() + v.encode_size())
        .sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    (entries.len() as u32).write(&mut buf);
    for (key, value) in entries {
        key.write(&mut buf);
        value.write(&mut buf);
    }
    buf
}

fn decode_snapshot(mut bytes: &[u8]) -> Result<HashMap<Key, Value>> {
    let count = u32::read(&mut bytes).map_err(|err| anyhow!("entry count: {err}"))?;
    let mut state = HashMap::new();
    for i in 0..count {
        let key = Key::read(&mut bytes).map_err(|err| anyhow!("key {i}: {err}"))?;
        let value = Value::read(&mut bytes).map_err(|err| anyhow!("value {i}: {err}"))?;
        state.insert(key, value);
    }
    if !bytes.is_empty() {
        return Err(anyhow!("{} trailing bytes", bytes.len()));
    }
    Ok(state)
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

pub(crate) async fn load_account<S: State>(state: &S, id: &AccountId) -> Result<Option<Account>> {
    Ok(match state.get(&Key::Account(id.clone())).await? {
        Some(Value::Account(account)) => Some(account),
        _ => None,
    })
}

pub(crate) async fn load_leaderboard<S: State>(state: &S) -> Result<Leaderboard> {
    Ok(match state.get(&Key::Leaderboard).await? {
        Some(Value::Leaderboard(board)) => board,
        _ => Leaderboard::default(),
    })
}
