//! Hashing of bucketing keys into shards.
use md5;

/// Number of shards the [0, 100) traffic range is divided into (0.01% resolution).
pub const TOTAL_SHARDS: u64 = 10_000;

/// Maps an input to a shard in `0..total_shards`. Implementations must be pure.
pub trait Sharder {
    /// Shard of `input`.
    fn get_shard(&self, input: &str, total_shards: u64) -> u64;

    /// Shard of a bucketing key within one experiment. Salting with the experiment id keeps
    /// assignments of the same visitor independent across experiments.
    fn experiment_shard(&self, experiment_id: &str, bucket_key: &str) -> u64 {
        self.get_shard(&format!("{experiment_id}-{bucket_key}"), TOTAL_SHARDS)
    }
}

/// The default sharder: the first four bytes of the MD5 digest, big-endian, modulo shard count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        u64::from(value) % total_shards
    }
}

/// Sharder with fixed answers, for tests that need to land on an exact shard.
#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, u64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        self.0.get(input).copied().unwrap_or(0) % total_shards
    }
}
