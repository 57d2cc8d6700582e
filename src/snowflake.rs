use rand::Rng;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

// 2022-01-01T00:00:00Z
const EPOCH: u64 = 1640995200000;
const WORKER_ID_BITS: u64 = 5;
const DATACENTER_ID_BITS: u64 = 5;
const SEQUENCE_BITS: u64 = 12;

const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;
const MAX_DATACENTER_ID: u64 = (1 << DATACENTER_ID_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

const WORKER_ID_SHIFT: u64 = SEQUENCE_BITS;
const DATACENTER_ID_SHIFT: u64 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u64 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

const ID_SUFFIX_LEN: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("worker id must be between 0 and 31, got {0}")]
    InvalidWorkerId(u64),
    #[error("datacenter id must be between 0 and 31, got {0}")]
    InvalidDatacenterId(u64),
    #[error("clock moved backwards by {0}ms")]
    ClockMovedBackwards(u64),
    #[error("system time is before the unix epoch")]
    TimeBeforeEpoch,
    #[error("id generator lock poisoned")]
    Poisoned,
}

pub struct SnowflakeGenerator {
    worker_id: u64,
    datacenter_id: u64,
    sequence: u64,
    last_timestamp: u64,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u64, datacenter_id: u64) -> Result<Self, SnowflakeError> {
        if worker_id > MAX_WORKER_ID {
            return Err(SnowflakeError::InvalidWorkerId(worker_id));
        }
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(SnowflakeError::InvalidDatacenterId(datacenter_id));
        }

        Ok(Self {
            worker_id,
            datacenter_id,
            sequence: 0,
            last_timestamp: 0,
        })
    }

    pub fn generate(&mut self) -> Result<i64, SnowflakeError> {
        let mut timestamp = current_timestamp()?;

        if timestamp < self.last_timestamp {
            return Err(SnowflakeError::ClockMovedBackwards(
                self.last_timestamp - timestamp,
            ));
        }

        if timestamp == self.last_timestamp {
            self.sequence = (self.sequence + 1) & MAX_SEQUENCE;
            if self.sequence == 0 {
                while timestamp <= self.last_timestamp {
                    timestamp = current_timestamp()?;
                }
            }
        } else {
            self.sequence = 0;
        }

        self.last_timestamp = timestamp;

        let id = (millis_since_epoch(timestamp)? << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_ID_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | self.sequence;

        Ok(id as i64)
    }
}

fn millis_since_epoch(timestamp: u64) -> Result<u64, SnowflakeError> {
    timestamp
        .checked_sub(EPOCH)
        .ok_or(SnowflakeError::TimeBeforeEpoch)
}

fn current_timestamp() -> Result<u64, SnowflakeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| SnowflakeError::TimeBeforeEpoch)
}

/// Shared, lock-guarded generator for row oids and public ids.
pub struct IdGenerator(Mutex<SnowflakeGenerator>);

impl IdGenerator {
    pub fn new(worker_id: u64, datacenter_id: u64) -> Result<Self, SnowflakeError> {
        Ok(Self(Mutex::new(SnowflakeGenerator::new(
            worker_id,
            datacenter_id,
        )?)))
    }

    pub fn generate(&self) -> Result<i64, SnowflakeError> {
        self.0
            .lock()
            .map_err(|_| SnowflakeError::Poisoned)?
            .generate()
    }

    /// Returns a fresh `(oid, public id)` pair for a row of the given kind.
    pub fn next(&self, prefix: &str) -> Result<(i64, String), SnowflakeError> {
        let oid = self.generate()?;
        Ok((oid, generate_prefixed_id(prefix, oid)))
    }
}

pub fn generate_prefixed_id(prefix: &str, oid: i64) -> String {
    let random_suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}_{:x}{}", prefix, oid, random_suffix)
}
