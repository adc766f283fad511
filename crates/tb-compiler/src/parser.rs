use log::debug;

use tb_core::types::{Collapse, CommentRule, Party, ResourceType, Rule, RuleKind, RuleSource, StaticRule, Token};

// =============================================================================
// Line Parsing
// =============================================================================

/// Parse one filter-list line. Returns `None` for blank lines, list headers
/// and lines that compile to nothing.
pub fn parse_rule(line: &str, list_index: usize, line_number: usize) -> Option<Rule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("[Adblock") {
        return None;
    }

    let kind = if let Some(comment) = line.strip_prefix('!') {
        RuleKind::Comment(parse_comment(comment))
    } else if is_cosmetic(line) {
        RuleKind::Cosmetic
    } else {
        RuleKind::Static(compile_static_rule(line, line_number)?)
    };

    Some(Rule {
        source: RuleSource { list_index, line_number },
        kind,
    })
}

/// Parse every line of an in-memory list. Line numbers start at 1.
pub fn parse_filter_list(text: &str, list_index: usize) -> Vec<Rule> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| parse_rule(line, list_index, i + 1))
        .collect()
}

fn parse_comment(text: &str) -> CommentRule {
    let text = text.trim_start();
    match text.split_once(": ") {
        Some((key, value)) if !key.is_empty() => CommentRule {
            key: Some(key.to_string()),
            value: value.trim().to_string(),
        },
        _ => CommentRule {
            key: None,
            value: text.to_string(),
        },
    }
}

fn is_cosmetic(line: &str) -> bool {
    line.contains("##") || line.contains("#@#") || line.contains("#?#")
}

// =============================================================================
// Static Rule Compilation
// =============================================================================

/// Compile a network rule line into pattern pieces and options.
pub fn compile_static_rule(line: &str, line_number: usize) -> Option<StaticRule> {
    let mut rule = StaticRule::default();

    let (mut body, options) = split_rule_options(line);
    if let Some(options) = options {
        parse_options(options, &mut rule, line_number);
    }

    if let Some(rest) = body.strip_prefix("@@") {
        rule.is_exception = true;
        body = rest;
        if body.is_empty() && options.is_none() {
            return None;
        }
    }

    let mut pattern = String::with_capacity(body.len() + 2);
    if !body.starts_with('|') && !body.starts_with('*') {
        pattern.push('*');
    }
    pattern.push_str(body);
    if !pattern.ends_with('|') && !pattern.ends_with('*') {
        pattern.push('*');
    }

    let mut rest = pattern.as_str();
    if let Some(after) = rest.strip_prefix("||") {
        let host_len = after
            .bytes()
            .take_while(|&b| b.is_ascii_lowercase() || b == b'.' || b == b'-')
            .count();
        rest = &after[host_len..];
        let open_start = rest.starts_with('*') || rest.starts_with('|');
        if host_len > 0 {
            rule.target_domain_anchor = Some(after[..host_len].as_bytes().into());
            // The rest must continue right where the anchor ends
            if !open_start {
                rule.pattern_pieces.push(Token::AnchorBoundary);
            }
        } else if !open_start {
            // Nothing captured: an unanchored rule starting anywhere
            rule.pattern_pieces.push(Token::Wildcard);
        }
    }

    tokenize(rest, rule.case_sensitive, &mut rule.pattern_pieces);
    Some(rule)
}

/// Split on the last `$` that is not escaped with a backslash.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let dollar = bytes
        .iter()
        .enumerate()
        .rev()
        .find(|&(i, &b)| b == b'$' && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|(i, _)| i);
    match dollar {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_options(text: &str, rule: &mut StaticRule, line_number: usize) {
    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let option = raw.to_ascii_lowercase();
        let (negated, name) = match option.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, option.as_str()),
        };

        if let Some(ty) = ResourceType::from_name(name) {
            // all-requests is the default and adds nothing
            if ty != ResourceType::AllRequests {
                if negated {
                    rule.excluded_resource_types |= ty.bit();
                } else {
                    rule.resource_types |= ty.bit();
                }
            }
            continue;
        }

        match (name, negated) {
            ("third-party" | "3p", false) | ("first-party" | "1p", true) => rule.party = Party::ThirdParty,
            ("third-party" | "3p", true) | ("first-party" | "1p", false) => rule.party = Party::FirstParty,
            ("match-case", false) => rule.case_sensitive = true,
            ("collapse", false) => rule.collapse = Collapse::AlwaysHide,
            ("collapse", true) => rule.collapse = Collapse::NeverHide,
            _ => match name.strip_prefix("domain=") {
                Some(domains) if !negated => parse_domain_option(domains, rule),
                _ => debug!("line {}: ignoring unrecognized option {:?}", line_number, raw),
            },
        }
    }
}

fn parse_domain_option(value: &str, rule: &mut StaticRule) {
    for domain in value.split('|') {
        let domain = domain.trim();
        match domain.strip_prefix('~') {
            Some("") => {}
            Some(excluded) => rule.excluded_referrer_domains.push(excluded.as_bytes().into()),
            None if domain.is_empty() => {}
            None => rule.referrer_domains.push(domain.as_bytes().into()),
        }
    }
}

/// Split a pattern into literal runs and `|`, `^`, `*` tokens.
fn tokenize(pattern: &str, case_sensitive: bool, out: &mut Vec<Token>) {
    let bytes = pattern.as_bytes();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let special = match b {
            b'|' => Token::AnchorBoundary,
            b'^' => Token::AnchorSeparator,
            b'*' => Token::Wildcard,
            _ => continue,
        };
        if i > start {
            out.push(literal(&bytes[start..i], case_sensitive));
        }
        out.push(special);
        start = i + 1;
    }
    if start < bytes.len() {
        out.push(literal(&bytes[start..], case_sensitive));
    }
}

fn literal(bytes: &[u8], case_sensitive: bool) -> Token {
    if case_sensitive {
        Token::Literal(bytes.into())
    } else {
        Token::Literal(bytes.to_ascii_lowercase().into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_core::types::ResourceTypes;

    fn lit(text: &str) -> Token {
        Token::Literal(text.as_bytes().into())
    }

    fn compile(line: &str) -> StaticRule {
        compile_static_rule(line, 1).expect("rule should compile")
    }

    #[test]
    fn plain_pattern_gets_implicit_wildcards() {
        let rule = compile("/ads/banner");
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard, lit("/ads/banner"), Token::Wildcard]);
        assert!(!rule.is_exception);
        assert_eq!(rule.target_domain_anchor, None);
    }

    #[test]
    fn explicit_anchors_are_kept() {
        let rule = compile("|http://ads.");
        assert_eq!(rule.pattern_pieces, vec![Token::AnchorBoundary, lit("http://ads."), Token::Wildcard]);

        let rule = compile("*.swf|");
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard, lit(".swf"), Token::AnchorBoundary]);
    }

    #[test]
    fn literals_are_lowercased_unless_match_case() {
        let rule = compile("/Banner/Ad");
        assert_eq!(rule.pattern_pieces[1], lit("/banner/ad"));

        let rule = compile("/Banner/Ad$match-case");
        assert!(rule.case_sensitive);
        assert_eq!(rule.pattern_pieces[1], lit("/Banner/Ad"));
    }

    #[test]
    fn domain_anchor_is_captured_and_rooted() {
        let rule = compile("||ads.example.com^");
        assert_eq!(rule.target_domain_anchor.as_deref(), Some(&b"ads.example.com"[..]));
        assert_eq!(
            rule.pattern_pieces,
            vec![Token::AnchorBoundary, Token::AnchorSeparator, Token::Wildcard]
        );

        let rule = compile("||example.com");
        assert_eq!(rule.target_domain_anchor.as_deref(), Some(&b"example.com"[..]));
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard]);
    }

    #[test]
    fn domain_capture_stops_at_digits() {
        let rule = compile("||cdn1.example.com/x");
        assert_eq!(rule.target_domain_anchor.as_deref(), Some(&b"cdn"[..]));
        assert_eq!(
            rule.pattern_pieces,
            vec![Token::AnchorBoundary, lit("1.example.com/x"), Token::Wildcard]
        );
    }

    #[test]
    fn empty_domain_capture_leaves_unanchored_rule() {
        let rule = compile("||*/ad.js");
        assert_eq!(rule.target_domain_anchor, None);
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard, lit("/ad.js"), Token::Wildcard]);

        let rule = compile("||1.2.3.4^");
        assert_eq!(rule.target_domain_anchor, None);
        assert_eq!(
            rule.pattern_pieces,
            vec![Token::Wildcard, lit("1.2.3.4"), Token::AnchorSeparator, Token::Wildcard]
        );
    }

    #[test]
    fn exception_marker_and_options() {
        let rule = compile("@@/track*$script,~image,third-party,domain=a.com|~b.a.com");
        assert!(rule.is_exception);
        assert_eq!(rule.resource_types, ResourceTypes::SCRIPT);
        assert_eq!(rule.excluded_resource_types, ResourceTypes::IMAGE);
        assert_eq!(rule.party, Party::ThirdParty);
        assert_eq!(rule.referrer_domains, vec![Box::<[u8]>::from(&b"a.com"[..])]);
        assert_eq!(rule.excluded_referrer_domains, vec![Box::<[u8]>::from(&b"b.a.com"[..])]);
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard, lit("/track"), Token::Wildcard]);
    }

    #[test]
    fn party_aliases_and_negation() {
        assert_eq!(compile("/x$~third-party").party, Party::FirstParty);
        assert_eq!(compile("/x$first-party").party, Party::FirstParty);
        assert_eq!(compile("/x$1p").party, Party::FirstParty);
        assert_eq!(compile("/x$3p").party, Party::ThirdParty);
        assert_eq!(compile("/x$~first-party").party, Party::ThirdParty);
    }

    #[test]
    fn options_are_case_insensitive() {
        let rule = compile("/x$SCRIPT,Domain=Example.COM,Collapse");
        assert_eq!(rule.resource_types, ResourceTypes::SCRIPT);
        assert_eq!(rule.referrer_domains, vec![Box::<[u8]>::from(&b"example.com"[..])]);
        assert_eq!(rule.collapse, Collapse::AlwaysHide);
        assert_eq!(compile("/x$~collapse").collapse, Collapse::NeverHide);
    }

    #[test]
    fn unknown_options_are_ignored() {
        let rule = compile("/ads$sitekey=abc,script,donottrack");
        assert_eq!(rule.resource_types, ResourceTypes::SCRIPT);
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard, lit("/ads"), Token::Wildcard]);
        assert_eq!(compile("/ads$all-requests").resource_types, ResourceTypes::empty());
    }

    #[test]
    fn options_split_on_last_unescaped_dollar() {
        let rule = compile("/price$5/ad$image");
        assert_eq!(rule.pattern_pieces[1], lit("/price$5/ad"));
        assert_eq!(rule.resource_types, ResourceTypes::IMAGE);

        let rule = compile("/cost\\$");
        assert_eq!(rule.pattern_pieces[1], lit("/cost\\$"));
        assert!(rule.resource_types.is_empty());
    }

    #[test]
    fn bare_exception_marker_compiles_to_nothing() {
        assert!(compile_static_rule("@@", 1).is_none());
        let rule = compile("$script");
        assert_eq!(rule.pattern_pieces, vec![Token::Wildcard]);
    }

    #[test]
    fn parse_rule_classifies_lines() {
        assert!(parse_rule("", 0, 1).is_none());
        assert!(parse_rule("   ", 0, 1).is_none());
        assert!(parse_rule("[Adblock Plus 2.0]", 0, 1).is_none());

        let comment = parse_rule("! Title: EasyList", 2, 3).expect("comment");
        assert_eq!(comment.source, RuleSource { list_index: 2, line_number: 3 });
        let comment = comment.as_comment().expect("comment kind");
        assert_eq!(comment.key.as_deref(), Some("Title"));
        assert_eq!(comment.value, "EasyList");

        let plain = parse_rule("! just words", 0, 1).expect("comment");
        assert_eq!(plain.as_comment().and_then(|c| c.key.clone()), None);

        for cosmetic in ["example.com##.ad", "example.com#@#.ad", "example.com#?#div:has(.ad)"] {
            let rule = parse_rule(cosmetic, 0, 1).expect("cosmetic");
            assert_eq!(rule.kind, RuleKind::Cosmetic);
        }

        let rule = parse_rule("  ||ads.example.com^  ", 0, 9).expect("static");
        assert!(rule.as_static().is_some());
    }

    #[test]
    fn parse_filter_list_numbers_lines_from_one() {
        let rules = parse_filter_list("[Adblock Plus 2.0]\n! Title: T\n\n/ads/\n", 4);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].source.line_number, 2);
        assert_eq!(rules[1].source, RuleSource { list_index: 4, line_number: 4 });
    }
}
