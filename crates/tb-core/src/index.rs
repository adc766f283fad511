//! Rule index
//!
//! Compiled rules are routed into nested buckets so a query only walks the
//! tries that can apply to it:
//!
//! ```text
//! exception flag -> party -> referrer domain -> target domain -> resource type -> PatternTrie
//! ```
//!
//! The empty key at the referrer and target levels means "not domain
//! specific"; [`ResourceType::AllRequests`] is the untyped bucket.

use serde_json::{json, Map, Value};

use crate::hash::FastHashMap;
use crate::trie::{PatternTrie, TerminalInfo};
use crate::types::{Party, ResourceType, RuleSource, StaticRule};

/// Key for buckets that are not tied to a domain.
pub(crate) const ANY_DOMAIN: &[u8] = b"";

pub type TypeBuckets = FastHashMap<ResourceType, PatternTrie>;

/// Target-domain level of the index.
#[derive(Debug, Default)]
pub struct TargetBuckets {
    pub(crate) by_host: FastHashMap<Box<[u8]>, TypeBuckets>,
    /// Lengths of the non-empty anchors present, longest first
    pub(crate) anchor_lengths: Vec<usize>,
}

pub type ReferrerBuckets = FastHashMap<Box<[u8]>, TargetBuckets>;
pub type PartyBuckets = FastHashMap<Party, ReferrerBuckets>;

/// All compiled static rules of a rule set.
#[derive(Debug, Default)]
pub struct RuleIndex {
    pub(crate) blocking: PartyBuckets,
    pub(crate) exceptions: PartyBuckets,
    static_rules: usize,
}

impl RuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of static rules inserted.
    pub fn static_rule_count(&self) -> usize {
        self.static_rules
    }

    /// Number of leaf tries.
    pub fn trie_count(&self) -> usize {
        self.tries().count()
    }

    /// Total trie nodes, roots included.
    pub fn node_count(&self) -> usize {
        self.tries().map(PatternTrie::node_count).sum()
    }

    fn tries(&self) -> impl Iterator<Item = &PatternTrie> {
        self.blocking
            .values()
            .chain(self.exceptions.values())
            .flat_map(|referrers| referrers.values())
            .flat_map(|targets| targets.by_host.values())
            .flat_map(|types| types.values())
    }

    /// Route a compiled rule to every bucket it belongs to.
    pub fn insert(&mut self, rule: &StaticRule, source: RuleSource) {
        let terminal = TerminalInfo::for_rule(rule, source);
        let parties = if rule.is_exception {
            &mut self.exceptions
        } else {
            &mut self.blocking
        };
        let referrers = parties.entry(rule.party).or_default();

        if rule.referrer_domains.is_empty() {
            let targets = referrers.entry(Box::default()).or_default();
            insert_into_targets(targets, rule, &terminal);
        } else {
            for domain in &rule.referrer_domains {
                let targets = referrers.entry(domain.clone()).or_default();
                insert_into_targets(targets, rule, &terminal);
            }
        }

        self.static_rules += 1;
    }

    /// JSON view of the whole index for debugging.
    pub fn to_json(&self) -> Value {
        json!({
            "rules": party_json(&self.blocking),
            "exceptions": party_json(&self.exceptions),
        })
    }
}

fn insert_into_targets(targets: &mut TargetBuckets, rule: &StaticRule, terminal: &TerminalInfo) {
    let host: Box<[u8]> = rule.target_domain_anchor.clone().unwrap_or_default();
    if !host.is_empty() && !targets.anchor_lengths.contains(&host.len()) {
        targets.anchor_lengths.push(host.len());
        targets.anchor_lengths.sort_unstable_by(|a, b| b.cmp(a));
    }

    let types = targets.by_host.entry(host).or_default();
    if rule.resource_types.is_empty() {
        types
            .entry(ResourceType::AllRequests)
            .or_default()
            .append(rule, terminal.clone());
    } else {
        for ty in rule.resource_types.types() {
            types.entry(ty).or_default().append(rule, terminal.clone());
        }
    }
}

fn party_json(parties: &PartyBuckets) -> Value {
    let mut out = Map::new();
    for (party, referrers) in parties {
        let mut referrer_obj = Map::new();
        for (referrer, targets) in referrers {
            let mut target_obj = Map::new();
            for (target, types) in &targets.by_host {
                let mut type_obj = Map::new();
                for (ty, trie) in types {
                    type_obj.insert(ty.name().to_string(), trie.to_json());
                }
                target_obj.insert(domain_label(target, "any target host"), Value::Object(type_obj));
            }
            referrer_obj.insert(domain_label(referrer, "any ref host"), Value::Object(target_obj));
        }
        out.insert(party.label().to_string(), Value::Object(referrer_obj));
    }
    Value::Object(out)
}

fn domain_label(domain: &[u8], empty: &str) -> String {
    if domain.is_empty() {
        empty.to_string()
    } else {
        String::from_utf8_lossy(domain).into_owned()
    }
}
