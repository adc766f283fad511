//! Core Matching Engine
//!
//! This is the hot path - every request goes through here. Exceptions are
//! probed before blocking rules and the first rule found wins; within each
//! side the most specific bucket is tried first.

use std::collections::HashSet;

use log::trace;

use crate::index::{PartyBuckets, ReferrerBuckets, TargetBuckets, TypeBuckets, ANY_DOMAIN};
use crate::ruleset::RuleSet;
use crate::trie::{TerminalInfo, TrieMatch};
use crate::types::{MatchInfo, Party, ResourceType, Token, Verdict};
use crate::url::{host_suffixes, ParsedUrl};

// =============================================================================
// Match Context
// =============================================================================

/// Everything a trie walk needs to know about one request.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub resource_type: ResourceType,
    pub party: Party,
    /// Bytes the pattern is matched against; re-rooted after a domain anchor
    pub target_url: &'a [u8],
    pub(crate) full_url: &'a [u8],
    pub target_host: &'a [u8],
    pub target_host_start: usize,
    pub target_host_end: usize,
    /// Referrer host and its dotted suffixes, most specific first
    pub referrer_hosts: &'a [&'a [u8]],
    pub(crate) ignored_lists: Option<&'a HashSet<usize>>,
}

impl<'a> MatchContext<'a> {
    #[inline]
    pub fn is_list_ignored(&self, list_index: usize) -> bool {
        self.ignored_lists.is_some_and(|ignored| ignored.contains(&list_index))
    }

    /// Same request, matched from `offset` of the full URL onward.
    #[inline]
    fn rerooted(&self, offset: usize) -> Self {
        Self {
            target_url: &self.full_url[offset..],
            ..*self
        }
    }

    #[cfg(test)]
    pub(crate) fn for_url(url: &'a [u8], resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            party: Party::ThirdParty,
            target_url: url,
            full_url: url,
            target_host: &[],
            target_host_start: 0,
            target_host_end: 0,
            referrer_hosts: &[],
            ignored_lists: None,
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Runs requests against a [`RuleSet`], optionally skipping whole lists.
pub struct Matcher<'a> {
    rules: &'a RuleSet,
    ignored_lists: HashSet<usize>,
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            ignored_lists: HashSet::new(),
        }
    }

    /// Rules from this list no longer decide requests.
    pub fn ignore_list(&mut self, list_index: usize) {
        self.ignored_lists.insert(list_index);
    }

    pub fn unignore_list(&mut self, list_index: usize) {
        self.ignored_lists.remove(&list_index);
    }

    /// Decide a request.
    ///
    /// Both URLs need a scheme and a host. A request that cannot be placed,
    /// including one without a referrer, never blocks.
    pub fn match_request(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Verdict {
        let Some(target) = ParsedUrl::parse(target_url) else {
            trace!("unparsable target url {:?}, not matching", target_url);
            return Verdict::NoMatch;
        };
        let Some(referrer) = ParsedUrl::parse(referrer_url) else {
            trace!("unparsable referrer url {:?}, not matching", referrer_url);
            return Verdict::NoMatch;
        };

        let party = if target.same_origin(&referrer) {
            Party::FirstParty
        } else {
            Party::ThirdParty
        };
        let referrer_hosts = host_suffixes(referrer.host().as_bytes());

        let ctx = MatchContext {
            resource_type,
            party,
            target_url: target.as_bytes(),
            full_url: target.as_bytes(),
            target_host: target.host().as_bytes(),
            target_host_start: target.host_start(),
            target_host_end: target.host_end(),
            referrer_hosts: &referrer_hosts,
            ignored_lists: (!self.ignored_lists.is_empty()).then_some(&self.ignored_lists),
        };
        self.match_context(&ctx)
    }

    /// The blocking rule for a request, or `None` when it is allowed.
    pub fn find_rule(&self, target_url: &str, referrer_url: &str, resource_type: ResourceType) -> Option<MatchInfo> {
        self.match_request(target_url, referrer_url, resource_type).into_block()
    }

    /// Decide a request whose context is already built.
    pub(crate) fn match_context(&self, ctx: &MatchContext<'_>) -> Verdict {
        let index = self.rules.index();

        if let Some(found) = find_in_parties(&index.exceptions, ctx) {
            trace!("exception line {} allows request", found.terminal.source.line_number);
            return Verdict::Allow(found.into_info(true));
        }
        if let Some(found) = find_in_parties(&index.blocking, ctx) {
            trace!("line {} blocks request", found.terminal.source.line_number);
            return Verdict::Block(found.into_info(false));
        }
        Verdict::NoMatch
    }
}

// =============================================================================
// Bucket Walk
// =============================================================================

fn find_in_parties<'r>(parties: &'r PartyBuckets, ctx: &MatchContext<'_>) -> Option<RuleMatch<'r>> {
    if let Some(referrers) = parties.get(&ctx.party) {
        if let Some(mut found) = find_in_referrers(referrers, ctx) {
            found.party = ctx.party;
            return Some(found);
        }
    }
    parties.get(&Party::Any).and_then(|referrers| find_in_referrers(referrers, ctx))
}

fn find_in_referrers<'r>(referrers: &'r ReferrerBuckets, ctx: &MatchContext<'_>) -> Option<RuleMatch<'r>> {
    for &host in ctx.referrer_hosts {
        if let Some((key, targets)) = referrers.get_key_value(host) {
            if let Some(mut found) = find_in_targets(targets, ctx) {
                found.referrer_host = Some(&key[..]);
                return Some(found);
            }
        }
    }
    referrers.get(ANY_DOMAIN).and_then(|targets| find_in_targets(targets, ctx))
}

fn find_in_targets<'r>(targets: &'r TargetBuckets, ctx: &MatchContext<'_>) -> Option<RuleMatch<'r>> {
    let host = ctx.target_host;
    for &len in &targets.anchor_lengths {
        if len > host.len() {
            continue;
        }
        if let Some((key, types)) = targets.by_host.get_key_value(&host[..len]) {
            let rerooted = ctx.rerooted(ctx.target_host_start + len);
            if let Some(mut found) = find_in_types(types, &rerooted) {
                found.target_host = Some(&key[..]);
                return Some(found);
            }
        }
    }
    targets.by_host.get(ANY_DOMAIN).and_then(|types| find_in_types(types, ctx))
}

fn find_in_types<'r>(types: &'r TypeBuckets, ctx: &MatchContext<'_>) -> Option<RuleMatch<'r>> {
    if ctx.resource_type != ResourceType::AllRequests {
        if let Some(found) = types.get(&ctx.resource_type).and_then(|trie| trie.check_match(ctx)) {
            return Some(RuleMatch::new(found, ctx.resource_type));
        }
    }
    types
        .get(&ResourceType::AllRequests)
        .and_then(|trie| trie.check_match(ctx))
        .map(|found| RuleMatch::new(found, ResourceType::AllRequests))
}

// =============================================================================
// Rule Match
// =============================================================================

/// A matched rule plus the buckets it was found in.
#[derive(Debug, Clone)]
pub struct RuleMatch<'r> {
    pub terminal: &'r TerminalInfo,
    pub pieces: Vec<&'r Token>,
    pub target_host: Option<&'r [u8]>,
    pub referrer_host: Option<&'r [u8]>,
    /// `Any` unless found in a party-specific bucket
    pub party: Party,
    /// `AllRequests` unless found in a type-specific bucket
    pub resource_type: ResourceType,
}

impl<'r> RuleMatch<'r> {
    fn new(found: TrieMatch<'r>, resource_type: ResourceType) -> Self {
        Self {
            terminal: found.terminal,
            pieces: found.pieces,
            target_host: None,
            referrer_host: None,
            party: Party::Any,
            resource_type,
        }
    }

    /// Rebuild filter syntax from the matched path and buckets.
    ///
    /// Negated options live on the terminal and are not reproduced.
    pub fn rule_text(&self, is_exception: bool) -> String {
        let mut text = String::new();
        if is_exception {
            text.push_str("@@");
        }
        if let Some(host) = self.target_host {
            text.push_str("||");
            text.push_str(&String::from_utf8_lossy(host));
        }

        let last = self.pieces.len().saturating_sub(1);
        for (i, piece) in self.pieces.iter().enumerate() {
            match piece {
                Token::Wildcard if i == 0 && self.target_host.is_none() => {}
                Token::Wildcard if i == last => {}
                // Implicit anchor right after the domain
                Token::AnchorBoundary if i == 0 && self.target_host.is_some() => {}
                _ => text.push_str(&piece.to_text()),
            }
        }

        let mut options = Vec::new();
        match self.party {
            Party::Any => {}
            Party::FirstParty => options.push("~third-party".to_string()),
            Party::ThirdParty => options.push("third-party".to_string()),
        }
        if self.resource_type != ResourceType::AllRequests {
            options.push(self.resource_type.name().to_string());
        }
        if let Some(domain) = self.referrer_host {
            options.push(format!("domain={}", String::from_utf8_lossy(domain)));
        }
        if !options.is_empty() {
            text.push('$');
            text.push_str(&options.join(","));
        }
        text
    }

    pub fn into_info(self, is_exception: bool) -> MatchInfo {
        MatchInfo {
            list_index: self.terminal.source.list_index,
            line_number: self.terminal.source.line_number,
            rule_text: self.rule_text(is_exception),
        }
    }
}
