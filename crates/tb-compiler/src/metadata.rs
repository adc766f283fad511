//! List metadata from `! Key: value` comment directives

use serde::Serialize;

use tb_core::types::Rule;

/// Header information a list declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ListMetadata {
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub version: Option<i64>,
    pub expiration_hours: Option<u32>,
    /// Reported as found; never verified
    pub checksum: Option<String>,
    /// Every rule that is not a comment
    pub rule_count: usize,
}

/// Scan parsed rules for list metadata. Later directives override earlier
/// ones; malformed values are skipped.
pub fn extract_metadata(rules: &[Rule]) -> ListMetadata {
    let mut meta = ListMetadata::default();

    for rule in rules {
        let Some(comment) = rule.as_comment() else {
            meta.rule_count += 1;
            continue;
        };
        let Some(key) = comment.key.as_deref() else {
            continue;
        };
        let value = comment.value.as_str();
        if value.is_empty() {
            continue;
        }

        match key {
            "Title" => meta.title = Some(value.to_string()),
            "Homepage" => meta.homepage = Some(value.to_string()),
            "Checksum" => meta.checksum = Some(value.to_string()),
            "Version" => {
                if let Ok(version) = value.parse() {
                    meta.version = Some(version);
                }
            }
            "Expires" => {
                if let Some(hours) = parse_expires(value) {
                    meta.expiration_hours = Some(hours);
                }
            }
            _ => {}
        }
    }

    meta
}

/// `4 days`, `12 hours`, with trailing text allowed.
fn parse_expires(value: &str) -> Option<u32> {
    let mut parts = value.split_whitespace();
    let amount: u32 = parts.next()?.parse().ok()?;
    match parts.next()? {
        "day" | "days" => amount.checked_mul(24),
        "hour" | "hours" => Some(amount),
        _ => None,
    }
}
