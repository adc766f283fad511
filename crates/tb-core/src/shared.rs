//! Hot-swappable rule set
//!
//! Readers load the current [`RuleSet`] without locking. Rebuilds run on
//! their own threads and publish through [`SharedRuleSet::publish`]; a build
//! older than the published set is discarded. An abandoned build is simply
//! never published and holds nothing back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use log::{debug, info};

use crate::ruleset::RuleSet;
use crate::types::{MatchInfo, ResourceType, Verdict};

/// Generation handed out when a rebuild starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BuildTicket(u64);

impl BuildTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// The active rule set of a running blocker.
pub struct SharedRuleSet {
    current: ArcSwap<RuleSet>,
    next_generation: AtomicU64,
    /// Generation of the published set; guards the compare-and-store
    published: Mutex<u64>,
}

impl Default for SharedRuleSet {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}

impl SharedRuleSet {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(rules),
            next_generation: AtomicU64::new(1),
            published: Mutex::new(0),
        }
    }

    /// Snapshot of the active rule set. Stays valid across swaps.
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    pub fn find_rule(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Option<MatchInfo> {
        self.current.load().find_rule(target_url, referrer_url, resource_type)
    }

    pub fn match_request(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Verdict {
        self.current.load().match_request(target_url, referrer_url, resource_type)
    }

    /// Reserve a generation for a rebuild about to start.
    pub fn begin_build(&self) -> BuildTicket {
        BuildTicket(self.next_generation.fetch_add(1, Ordering::Relaxed))
    }

    /// Install a finished build unless a newer one was published already.
    /// Returns whether the set was installed.
    pub fn publish(&self, ticket: BuildTicket, rules: RuleSet) -> bool {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if ticket.0 <= *published {
            debug!("discarding rule set build {}, build {} is newer", ticket.0, *published);
            return false;
        }

        *published = ticket.0;
        info!("publishing rule set build {} ({} static rules)", ticket.0, rules.stats().static_rules);
        self.current.store(Arc::new(rules));
        true
    }

    /// Install a rule set unconditionally.
    pub fn replace(&self, rules: RuleSet) {
        let ticket = self.begin_build();
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        *published = ticket.0;
        self.current.store(Arc::new(rules));
    }
}

impl std::fmt::Debug for SharedRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRuleSet")
            .field("stats", &self.current.load().stats())
            .finish()
    }
}
