//! Immutable compiled rule set

use serde::Serialize;
use serde_json::Value;

use crate::index::RuleIndex;
use crate::matcher::Matcher;
use crate::types::{MatchInfo, ResourceType, Verdict};

/// Size figures for a built rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuleSetStats {
    pub static_rules: usize,
    pub tries: usize,
    pub trie_nodes: usize,
}

/// A compiled, read-only rule set. Share it behind an `Arc`; queries never
/// mutate it.
#[derive(Debug, Default)]
pub struct RuleSet {
    index: RuleIndex,
}

impl RuleSet {
    pub fn new(index: RuleIndex) -> Self {
        Self { index }
    }

    /// A rule set that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &RuleIndex {
        &self.index
    }

    pub fn stats(&self) -> RuleSetStats {
        RuleSetStats {
            static_rules: self.index.static_rule_count(),
            tries: self.index.trie_count(),
            trie_nodes: self.index.node_count(),
        }
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(self)
    }

    /// The blocking rule for a request, or `None` when it is allowed.
    pub fn find_rule(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Option<MatchInfo> {
        self.matcher().find_rule(target_url, referrer_url, resource_type)
    }

    pub fn match_request(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Verdict {
        self.matcher().match_request(target_url, referrer_url, resource_type)
    }

    /// Debug dump of every bucket and trie.
    pub fn rule_tree(&self) -> Value {
        self.index.to_json()
    }
}
