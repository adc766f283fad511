//! Pattern trie
//!
//! Every static rule in one index bucket is stored as a path of pieces in a
//! single trie, so a URL is matched against all of them in one walk. Nodes
//! live in an arena and children are found through one multimap keyed by
//! `(node, first byte)`: several children may share a first byte when their
//! pieces differ. Non-literal pieces (`*`, `|`, `^`) are keyed by byte 0.

use serde_json::{json, Map, Value};

use crate::hash::{child_key, FastHashMap};
use crate::matcher::MatchContext;
use crate::types::{ResourceTypes, RuleSource, StaticRule, Token};
use crate::url::is_separator_byte;

/// Index of a node in the trie arena.
pub type NodeId = u32;

const ROOT: NodeId = 0;

// =============================================================================
// Terminal Info
// =============================================================================

/// What a terminal node remembers about the rule that ends there.
///
/// Negated types and referrer domains are checked here, once, instead of
/// being fanned out into separate index buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalInfo {
    pub excluded_resource_types: ResourceTypes,
    pub excluded_referrer_domains: Box<[Box<[u8]>]>,
    pub source: RuleSource,
}

impl TerminalInfo {
    pub fn for_rule(rule: &StaticRule, source: RuleSource) -> Self {
        Self {
            excluded_resource_types: rule.excluded_resource_types,
            excluded_referrer_domains: rule.excluded_referrer_domains.clone().into_boxed_slice(),
            source,
        }
    }

    /// Whether this terminal may decide the request in `ctx`.
    #[inline]
    fn admits(&self, ctx: &MatchContext<'_>) -> bool {
        if ctx.is_list_ignored(self.source.list_index) {
            return false;
        }
        if self.excluded_resource_types.has(ctx.resource_type) {
            return false;
        }
        !self
            .excluded_referrer_domains
            .iter()
            .any(|domain| ctx.referrer_hosts.iter().any(|host| *host == &domain[..]))
    }
}

/// A successful trie walk.
#[derive(Debug, Clone)]
pub struct TrieMatch<'t> {
    pub terminal: &'t TerminalInfo,
    /// Pieces along the matched path, root excluded, in pattern order
    pub pieces: Vec<&'t Token>,
}

// =============================================================================
// Pattern Trie
// =============================================================================

#[derive(Debug)]
struct Node {
    piece: Token,
    case_sensitive: bool,
    terminals: Vec<TerminalInfo>,
}

impl Node {
    fn new(piece: Token, case_sensitive: bool) -> Self {
        Self {
            piece,
            case_sensitive,
            terminals: Vec::new(),
        }
    }

    fn same_piece(&self, piece: &Token, case_sensitive: bool) -> bool {
        self.piece == *piece && (!matches!(piece, Token::Literal(_)) || self.case_sensitive == case_sensitive)
    }
}

/// Trie of tokenized URL patterns. Immutable once the rule set is built.
#[derive(Debug)]
pub struct PatternTrie {
    nodes: Vec<Node>,
    children: FastHashMap<u64, Vec<NodeId>>,
}

impl Default for PatternTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Token::Wildcard, false)],
            children: FastHashMap::default(),
        }
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of rules terminating somewhere in the trie.
    pub fn terminal_count(&self) -> usize {
        self.nodes.iter().map(|node| node.terminals.len()).sum()
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Add a compiled rule's pattern, terminating in `terminal`.
    pub fn append(&mut self, rule: &StaticRule, terminal: TerminalInfo) {
        if rule.pattern_pieces.is_empty() {
            return;
        }
        self.append_piece(ROOT, &rule.pattern_pieces, 0, rule.case_sensitive, terminal);
    }

    fn append_piece(
        &mut self,
        node: NodeId,
        pieces: &[Token],
        index: usize,
        case_sensitive: bool,
        terminal: TerminalInfo,
    ) {
        let last = pieces.len() - 1;
        let piece = &pieces[index];

        // A run of wildcards collapses into the wildcard node we are on
        if index < last && piece.is_wildcard() && self.nodes[node as usize].piece.is_wildcard() {
            self.append_piece(node, pieces, index + 1, case_sensitive, terminal);
            return;
        }

        let child = self.find_or_add_child(node, piece, case_sensitive);
        let terminates = index == last || (index + 1 == last && pieces[last].is_wildcard());
        if terminates {
            self.nodes[child as usize].terminals.push(terminal);
        } else {
            self.append_piece(child, pieces, index + 1, case_sensitive, terminal);
        }
    }

    fn find_or_add_child(&mut self, node: NodeId, piece: &Token, case_sensitive: bool) -> NodeId {
        let key = child_key(node, piece.first_key());
        if let Some(ids) = self.children.get(&key) {
            for &id in ids {
                if self.nodes[id as usize].same_piece(piece, case_sensitive) {
                    return id;
                }
            }
        }

        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(piece.clone(), case_sensitive));
        self.children.entry(key).or_default().push(id);
        id
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Match `ctx.target_url` against every stored pattern. Returns the first
    /// terminal reached whose exclusions do not reject the request.
    pub fn check_match<'t>(&'t self, ctx: &MatchContext<'_>) -> Option<TrieMatch<'t>> {
        let mut found = self.check_node(ROOT, ctx, 0)?;
        found.pieces.reverse();
        Some(found)
    }

    fn check_node<'t>(&'t self, id: NodeId, ctx: &MatchContext<'_>, mut cursor: usize) -> Option<TrieMatch<'t>> {
        let node = &self.nodes[id as usize];
        let url = ctx.target_url;

        match &node.piece {
            Token::Wildcard => {}
            Token::AnchorBoundary => {
                if cursor != 0 && cursor != url.len() {
                    return None;
                }
            }
            Token::AnchorSeparator => {
                if cursor < url.len() {
                    if !is_separator_byte(url[cursor]) {
                        return None;
                    }
                    cursor += 1;
                }
            }
            Token::Literal(literal) => {
                if !literal_matches(literal, &url[cursor..], node.case_sensitive) {
                    return None;
                }
                cursor += literal.len();
            }
        }

        if let Some(terminal) = node.terminals.iter().find(|terminal| terminal.admits(ctx)) {
            return Some(TrieMatch {
                terminal,
                pieces: vec![&node.piece],
            });
        }

        let mut found = self.check_children(id, 0, ctx, cursor);
        if found.is_none() {
            // Only a wildcard may skip ahead; anything else continues exactly at the cursor
            let is_any = node.piece.is_wildcard();
            for (i, &byte) in url.iter().enumerate().skip(cursor) {
                found = self.check_children(id, byte, ctx, i);
                if found.is_none() && byte.is_ascii_uppercase() {
                    found = self.check_children(id, byte.to_ascii_lowercase(), ctx, i);
                }
                if found.is_some() || !is_any {
                    break;
                }
            }
        }

        let mut found = found?;
        if id != ROOT {
            found.pieces.push(&node.piece);
        }
        Some(found)
    }

    #[inline]
    fn check_children<'t>(
        &'t self,
        id: NodeId,
        first_byte: u8,
        ctx: &MatchContext<'_>,
        cursor: usize,
    ) -> Option<TrieMatch<'t>> {
        let ids = self.children.get(&child_key(id, first_byte))?;
        ids.iter().find_map(|&child| self.check_node(child, ctx, cursor))
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// JSON view of the trie for debugging.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        self.node_json(ROOT, &mut out);
        Value::Object(out)
    }

    fn node_json(&self, id: NodeId, out: &mut Map<String, Value>) {
        let node = &self.nodes[id as usize];
        let mut entry = Map::new();

        if !node.terminals.is_empty() {
            let terminals = node
                .terminals
                .iter()
                .map(|terminal| json!({ "list": terminal.source.list_index, "line": terminal.source.line_number }))
                .collect();
            entry.insert("terminates".to_string(), Value::Array(terminals));
        }

        let mut children = Map::new();
        for byte in 0..=u8::MAX {
            if let Some(ids) = self.children.get(&child_key(id, byte)) {
                let mut group = Map::new();
                for &child in ids {
                    self.node_json(child, &mut group);
                }
                let label = if byte == 0 { "special".to_string() } else { (byte as char).to_string() };
                children.insert(label, Value::Object(group));
            }
        }
        if !children.is_empty() {
            entry.insert("children".to_string(), Value::Object(children));
        }

        out.insert(node.piece.to_text(), Value::Object(entry));
    }
}

/// Compare a literal piece against the start of `rest`. Case-insensitive
/// literals are stored lowercase, so only `A-Z` in the URL is folded.
#[inline]
fn literal_matches(literal: &[u8], rest: &[u8], case_sensitive: bool) -> bool {
    if rest.len() < literal.len() {
        return false;
    }
    literal.iter().zip(rest).all(|(&piece_ch, &url_ch)| {
        piece_ch == url_ch || (!case_sensitive && url_ch.is_ascii_uppercase() && url_ch + 32 == piece_ch)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceType;

    fn lit(text: &str) -> Token {
        Token::Literal(text.as_bytes().to_vec().into_boxed_slice())
    }

    fn rule(pieces: Vec<Token>) -> StaticRule {
        StaticRule {
            pattern_pieces: pieces,
            ..StaticRule::default()
        }
    }

    fn trie_with(rules: &[(StaticRule, usize)]) -> PatternTrie {
        let mut trie = PatternTrie::new();
        for (rule, line) in rules {
            let source = RuleSource { list_index: 0, line_number: *line };
            trie.append(rule, TerminalInfo::for_rule(rule, source));
        }
        trie
    }

    fn matched_line(trie: &PatternTrie, url: &str) -> Option<usize> {
        let ctx = MatchContext::for_url(url.as_bytes(), ResourceType::Script);
        trie.check_match(&ctx).map(|m| m.terminal.source.line_number)
    }

    #[test]
    fn matches_literal_anywhere_after_leading_wildcard() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard, lit("/ads/"), Token::Wildcard]), 1)]);
        assert_eq!(matched_line(&trie, "http://example.com/ads/banner.png"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/content/"), None);
    }

    #[test]
    fn literal_after_anchor_must_start_at_cursor() {
        let trie = trie_with(&[(rule(vec![Token::AnchorBoundary, lit("http://ads."), Token::Wildcard]), 1)]);
        assert_eq!(matched_line(&trie, "http://ads.example.com/"), Some(1));
        assert_eq!(matched_line(&trie, "https://x.com/?u=http://ads.example.com/"), None);
    }

    #[test]
    fn trailing_boundary_anchor_requires_end() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard, lit(".swf"), Token::AnchorBoundary]), 1)]);
        assert_eq!(matched_line(&trie, "http://example.com/movie.swf"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/movie.swf?x=1"), None);
    }

    #[test]
    fn separator_matches_non_word_byte_or_end() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard, lit("track"), Token::AnchorSeparator, Token::Wildcard]), 1)]);
        assert_eq!(matched_line(&trie, "http://example.com/track?id=1"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/track"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/tracking"), None);
        assert_eq!(matched_line(&trie, "http://example.com/track.js"), None);
    }

    #[test]
    fn case_insensitive_literals_fold_upper_case_url_bytes() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard, lit("/banner"), Token::Wildcard]), 1)]);
        assert_eq!(matched_line(&trie, "http://example.com/BANNER.gif"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/BaNnEr.gif"), Some(1));
    }

    #[test]
    fn case_sensitive_literals_do_not_fold() {
        let mut sensitive = rule(vec![Token::Wildcard, lit("/Banner"), Token::Wildcard]);
        sensitive.case_sensitive = true;
        let trie = trie_with(&[(sensitive, 1)]);
        assert_eq!(matched_line(&trie, "http://example.com/Banner.gif"), Some(1));
        assert_eq!(matched_line(&trie, "http://example.com/banner.gif"), None);
        assert_eq!(matched_line(&trie, "http://example.com/BANNER.gif"), None);
    }

    #[test]
    fn shared_prefixes_reuse_nodes() {
        let trie = trie_with(&[
            (rule(vec![Token::Wildcard, lit("/ads/"), Token::Wildcard, lit(".js"), Token::Wildcard]), 1),
            (rule(vec![Token::Wildcard, lit("/ads/"), Token::Wildcard, lit(".gif"), Token::Wildcard]), 2),
        ]);
        // root, "/ads/", "*", ".js", ".gif"
        assert_eq!(trie.node_count(), 5);
        assert_eq!(trie.terminal_count(), 2);
        assert_eq!(matched_line(&trie, "http://x.com/ads/a.gif"), Some(2));
        assert_eq!(matched_line(&trie, "http://x.com/ads/a.js"), Some(1));
    }

    #[test]
    fn children_sharing_a_first_byte_are_all_tried() {
        let trie = trie_with(&[
            (rule(vec![Token::Wildcard, lit("/adx"), Token::Wildcard]), 1),
            (rule(vec![Token::Wildcard, lit("/ady"), Token::Wildcard]), 2),
        ]);
        assert_eq!(matched_line(&trie, "http://x.com/ady"), Some(2));
        assert_eq!(matched_line(&trie, "http://x.com/adx"), Some(1));
    }

    #[test]
    fn wildcard_runs_collapse() {
        let trie = trie_with(&[(
            rule(vec![Token::Wildcard, lit("a"), Token::Wildcard, Token::Wildcard, lit("b"), Token::Wildcard]),
            1,
        )]);
        // root, "a", "*", "b"
        assert_eq!(trie.node_count(), 4);
        assert_eq!(matched_line(&trie, "http://x.com/a--b"), Some(1));
    }

    #[test]
    fn lone_wildcard_matches_everything() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard]), 1)]);
        assert_eq!(matched_line(&trie, "http://x.com/"), Some(1));
    }

    #[test]
    fn terminal_exclusions_reject_type_and_referrer() {
        let mut excluded = rule(vec![Token::Wildcard, lit("/track"), Token::Wildcard]);
        excluded.excluded_resource_types = ResourceTypes::IMAGE;
        excluded.excluded_referrer_domains = vec![b"good.com".to_vec().into_boxed_slice()];
        let trie = trie_with(&[(excluded, 1)]);

        let url = b"http://x.com/track.js";
        let script = MatchContext::for_url(url, ResourceType::Script);
        assert!(trie.check_match(&script).is_some());

        let image = MatchContext::for_url(url, ResourceType::Image);
        assert!(trie.check_match(&image).is_none());

        let referrers: [&[u8]; 2] = [b"good.com", b"com"];
        let from_good = MatchContext {
            referrer_hosts: &referrers,
            ..MatchContext::for_url(url, ResourceType::Script)
        };
        assert!(trie.check_match(&from_good).is_none());
    }

    #[test]
    fn same_pattern_keeps_every_terminal() {
        let mut narrow = rule(vec![Token::Wildcard, lit("/ads"), Token::Wildcard]);
        narrow.excluded_resource_types = ResourceTypes::SCRIPT;
        let broad = rule(vec![Token::Wildcard, lit("/ads"), Token::Wildcard]);
        let trie = trie_with(&[(narrow, 1), (broad, 2)]);
        assert_eq!(matched_line(&trie, "http://x.com/ads"), Some(2));
    }

    #[test]
    fn matched_pieces_come_back_in_pattern_order() {
        let trie = trie_with(&[(rule(vec![Token::AnchorBoundary, lit("http://"), Token::Wildcard, lit("/ad"), Token::Wildcard]), 1)]);
        let ctx = MatchContext::for_url(b"http://x.com/ad", ResourceType::Other);
        let found = trie.check_match(&ctx).expect("pattern should match");
        let text: Vec<String> = found.pieces.iter().map(|p| p.to_text()).collect();
        assert_eq!(text, vec!["|", "http://", "*", "/ad"]);
    }

    #[test]
    fn json_dump_names_terminals() {
        let trie = trie_with(&[(rule(vec![Token::Wildcard, lit("ad"), Token::Wildcard]), 7)]);
        let json = trie.to_json();
        assert_eq!(json["*"]["children"]["a"]["ad"]["terminates"][0]["line"], 7);
    }
}
