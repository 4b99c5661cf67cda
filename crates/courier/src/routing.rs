/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Consistent-hash routing of routing keys onto buckets.
//!
//! Every event sharing a routing key must flow through the same ordered
//! channel (or log partition), so the mapping has to be stable across calls
//! and across process restarts. The key is digested with SHA-256 and the
//! digest is placed with jump consistent hashing; growing the bucket count
//! only moves the minimal share of keys.

use sha2::{Digest, Sha256};

/// Maps routing keys onto `[0, bucket_count)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionRouter;

impl PartitionRouter {
    /// Returns the bucket for `key` among `bucket_count` buckets.
    ///
    /// A `bucket_count` of zero is treated as one bucket.
    pub fn route(key: &str, bucket_count: usize) -> usize {
        let buckets = bucket_count.max(1) as i64;
        jump_consistent_hash(key_digest(key), buckets) as usize
    }
}

/// First eight bytes of the SHA-256 digest of the key, big-endian.
fn key_digest(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Lamping & Veach jump consistent hash.
fn jump_consistent_hash(mut key: u64, buckets: i64) -> i64 {
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < buckets {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        let scale = (1i64 << 31) as f64 / ((key >> 33) + 1) as f64;
        j = ((b + 1) as f64 * scale) as i64;
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_route_is_deterministic() {
        for n in 1..16 {
            let first = PartitionRouter::route("loan-42", n);
            for _ in 0..10 {
                assert_eq!(PartitionRouter::route("loan-42", n), first);
            }
            assert!(first < n);
        }
    }

    #[test]
    fn test_route_is_stable_across_processes() {
        // SHA-256 based digests are fixed, so these values never drift
        // between runs or builds.
        assert_eq!(key_digest(""), 0xe3b0c44298fc1c14);
        assert_eq!(key_digest("abc"), 0xba7816bf8f01cfea);
    }

    #[test]
    fn test_single_bucket_and_zero_buckets() {
        assert_eq!(PartitionRouter::route("anything", 1), 0);
        assert_eq!(PartitionRouter::route("anything", 0), 0);
    }

    #[test]
    fn test_route_distributes_keys() {
        let buckets = 8;
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for i in 0..8000 {
            *counts
                .entry(PartitionRouter::route(&format!("client-{}", i), buckets))
                .or_default() += 1;
        }

        assert_eq!(counts.len(), buckets);
        for (bucket, count) in counts {
            assert!(
                (700..1300).contains(&count),
                "bucket {} received {} keys",
                bucket,
                count
            );
        }
    }

    #[test]
    fn test_growing_bucket_count_moves_few_keys() {
        let moved = (0..2000)
            .filter(|i| {
                let key = format!("tenant-{}", i);
                PartitionRouter::route(&key, 10) != PartitionRouter::route(&key, 11)
            })
            .count();

        // Ideal share is 1/11 of the keys.
        assert!(moved < 400, "{} keys moved", moved);
    }
}
