use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2017-01-01T00:00:00Z in milliseconds.
const TWEPOCH: i64 = 1_483_228_800_000;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_MAX: i64 = (1 << WORKER_ID_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;

/// Snowflake-style unique ID generator: 41-bit millisecond timestamp,
/// 10-bit worker id, 12-bit per-millisecond sequence.
///
/// Upload and file identifiers are generated through this so they are
/// unique, roughly sortable by creation time, and safe across workers
/// that are configured with distinct worker ids.
#[derive(Debug)]
pub struct IdGenerator {
    worker_id: i64,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    timestamp: i64,
    sequence: i64,
}

impl IdGenerator {
    pub fn new(worker_id: i64) -> anyhow::Result<Self> {
        if !(0..=WORKER_ID_MAX).contains(&worker_id) {
            anyhow::bail!("worker id must be between 0 and {}", WORKER_ID_MAX);
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(State {
                timestamp: 0,
                sequence: 0,
            }),
        })
    }

    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock().expect("id generator lock poisoned");

        let mut now = Self::millis();
        if state.timestamp == now {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // sequence exhausted for this millisecond; spin to the next one
                while now <= state.timestamp {
                    now = Self::millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.timestamp = now;

        let id = ((now - TWEPOCH) << TIMESTAMP_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence;
        id as u64
    }

    fn millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as i64
    }
}

/// Serializes snowflake ids as strings. They exceed the 53-bit safe
/// integer range of JSON consumers, so the wire format is a string.
pub mod string_id {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
