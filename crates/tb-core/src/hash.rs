//! Hash map aliases for the index
//!
//! Keys are short byte strings (hosts, domains) and packed integers, looked
//! up once per bucket level on every request. xxHash64 hashes those faster
//! than the default SipHash.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

/// Hasher builder used by every map in the index and tries.
pub type FastHasher = BuildHasherDefault<XxHash64>;

/// `HashMap` keyed with [`FastHasher`].
pub type FastHashMap<K, V> = HashMap<K, V, FastHasher>;

/// Child-map key for a trie node: node id in the high bits, first byte low.
#[inline]
pub const fn child_key(node: u32, first_byte: u8) -> u64 {
    ((node as u64) << 8) | first_byte as u64
}
