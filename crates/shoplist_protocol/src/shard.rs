//! Shard assignment.

const HASH_BASE: u64 = 31;
const HASH_MOD: u64 = 1_000_000_007;

/// Polynomial rolling hash of `uid`.
///
/// Each byte enters the hash as a signed value, and the intermediate sum
/// wraps in 64 bits before the reduction, so bytes above 0x7f subtract.
/// The value depends only on the bytes of `uid`, so every node and client
/// computes the same hash regardless of platform.
#[must_use]
pub fn list_hash(uid: &str) -> u64 {
    uid.bytes().fold(0u64, |hash, b| {
        let byte = i64::from(i8::from_ne_bytes([b]));
        hash.wrapping_mul(HASH_BASE).wrapping_add_signed(byte) % HASH_MOD
    })
}

/// Returns the shard owning the list `uid` in a cluster of `num_shards`.
///
/// A shard count of zero is treated as one.
#[must_use]
pub fn shard_for(uid: &str, num_shards: u32) -> u32 {
    let shards = u64::from(num_shards.max(1));
    // Always < num_shards, so the cast cannot truncate
    (list_hash(uid) % shards) as u32
}
