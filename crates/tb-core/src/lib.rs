//! TrieBlock Core Library
//!
//! This crate provides the matching engine for the TrieBlock filter-list
//! engine: compiled rule types, the bucketed rule index, the pattern trie and
//! the request matcher.
//!
//! # Architecture
//!
//! Static rules are routed by exception flag, party, referrer domain, target
//! domain and resource type into buckets; every bucket holds one
//! [`PatternTrie`](trie::PatternTrie) with all of its URL patterns. A query
//! walks only the buckets that can apply, most specific first, and the first
//! rule found decides the request. Exceptions always win over blocking rules.
//!
//! # Modules
//!
//! - `types`: Rule, token and verdict types
//! - `url`: URL parsing for hosts, origins and `^` separators
//! - `hash`: Fast hash maps used by the index
//! - `trie`: Pattern trie storage and matching
//! - `index`: Bucketed rule index
//! - `matcher`: Request matching and rule-text reconstruction
//! - `ruleset`: Immutable compiled rule set
//! - `shared`: Lock-free hot-swap of the active rule set

pub mod hash;
pub mod index;
pub mod matcher;
pub mod ruleset;
pub mod shared;
pub mod trie;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use index::RuleIndex;
pub use matcher::{MatchContext, Matcher, RuleMatch};
pub use ruleset::{RuleSet, RuleSetStats};
pub use shared::{BuildTicket, SharedRuleSet};
pub use types::{
    Collapse, CommentRule, MatchInfo, Party, ResourceType, ResourceTypes, Rule, RuleKind, RuleSource, StaticRule,
    Token, Verdict,
};
