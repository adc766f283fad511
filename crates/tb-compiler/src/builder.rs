use std::io::BufRead;

use log::{debug, info};

use tb_core::index::RuleIndex;
use tb_core::ruleset::RuleSet;
use tb_core::types::Rule;

use crate::metadata::{extract_metadata, ListMetadata};
use crate::parser::{parse_filter_list, parse_rule};

/// Failure reading a filter list stream. Malformed lines are never errors;
/// they are skipped.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("I/O error in list {list_index} at line {line_number}: {source}")]
    Io {
        list_index: usize,
        line_number: usize,
        source: std::io::Error,
    },
}

// =============================================================================
// Ingestion
// =============================================================================

/// Parse a list from a byte stream. Invalid UTF-8 is replaced, not rejected.
pub fn parse_rules<R: BufRead>(mut reader: R, list_index: usize) -> Result<Vec<Rule>, ListError> {
    let mut rules = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|source| ListError::Io {
            list_index,
            line_number: line_number + 1,
            source,
        })?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let line = String::from_utf8_lossy(&buf);
        if let Some(rule) = parse_rule(&line, list_index, line_number) {
            rules.push(rule);
        }
    }

    debug!("list {}: {} rules from {} lines", list_index, rules.len(), line_number);
    Ok(rules)
}

// =============================================================================
// Rule Set Builder
// =============================================================================

/// Accumulates rules from any number of lists into one [`RuleSet`].
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    index: RuleIndex,
    lists: usize,
    skipped: usize,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add parsed rules. Comment and cosmetic rules are skipped.
    pub fn add_rules(&mut self, rules: &[Rule]) -> &mut Self {
        for rule in rules {
            match rule.as_static() {
                Some(static_rule) => self.index.insert(static_rule, rule.source),
                None => self.skipped += 1,
            }
        }
        self
    }

    /// Parse and add a list stream, returning its metadata.
    pub fn add_list<R: BufRead>(&mut self, reader: R, list_index: usize) -> Result<ListMetadata, ListError> {
        let rules = parse_rules(reader, list_index)?;
        self.add_rules(&rules);
        self.lists += 1;
        Ok(extract_metadata(&rules))
    }

    /// Parse and add an in-memory list, returning its metadata.
    pub fn add_text(&mut self, text: &str, list_index: usize) -> ListMetadata {
        let rules = parse_filter_list(text, list_index);
        self.add_rules(&rules);
        self.lists += 1;
        extract_metadata(&rules)
    }

    pub fn static_rule_count(&self) -> usize {
        self.index.static_rule_count()
    }

    pub fn build(self) -> RuleSet {
        let rules = RuleSet::new(self.index);
        let stats = rules.stats();
        info!(
            "built rule set from {} lists: {} static rules, {} tries, {} nodes ({} non-network rules skipped)",
            self.lists, stats.static_rules, stats.tries, stats.trie_nodes, self.skipped
        );
        rules
    }
}

/// Build a rule set from in-memory lists; list `i` gets index `i`.
pub fn build_rule_set(lists: &[&str]) -> RuleSet {
    let mut builder = RuleSetBuilder::new();
    for (list_index, text) in lists.iter().enumerate() {
        builder.add_text(text, list_index);
    }
    builder.build()
}
