//! Core type definitions for TrieBlock
//!
//! These types describe parsed filter rules and match results and are
//! shared by the compiler and the matching engine.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

// =============================================================================
// Resource Types
// =============================================================================

/// Resource type of a request, also used as a rule option keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
#[repr(u8)]
pub enum ResourceType {
    /// Bucket for rules without a type restriction
    AllRequests = 0,
    Script = 1,
    Image = 2,
    Stylesheet = 3,
    Object = 4,
    XmlHttpRequest = 5,
    ObjectSubrequest = 6,
    Subdocument = 7,
    Ping = 8,
    WebSocket = 9,
    WebRtc = 10,
    Document = 11,
    ElemHide = 12,
    GenericHide = 13,
    GenericBlock = 14,
    Popup = 15,
    Font = 16,
    Media = 17,
    Other = 18,
}

impl ResourceType {
    /// Every type, in option-vocabulary order.
    pub const ALL: [ResourceType; 19] = [
        Self::AllRequests,
        Self::Script,
        Self::Image,
        Self::Stylesheet,
        Self::Object,
        Self::XmlHttpRequest,
        Self::ObjectSubrequest,
        Self::Subdocument,
        Self::Ping,
        Self::WebSocket,
        Self::WebRtc,
        Self::Document,
        Self::ElemHide,
        Self::GenericHide,
        Self::GenericBlock,
        Self::Popup,
        Self::Font,
        Self::Media,
        Self::Other,
    ];

    /// Parse an option keyword. Matching is exact; callers lowercase first.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all-requests" => Some(Self::AllRequests),
            "script" => Some(Self::Script),
            "image" => Some(Self::Image),
            "stylesheet" => Some(Self::Stylesheet),
            "object" => Some(Self::Object),
            "xmlhttprequest" => Some(Self::XmlHttpRequest),
            "object-subrequest" => Some(Self::ObjectSubrequest),
            "subdocument" => Some(Self::Subdocument),
            "ping" => Some(Self::Ping),
            "websocket" => Some(Self::WebSocket),
            "webrtc" => Some(Self::WebRtc),
            "document" => Some(Self::Document),
            "elemhide" => Some(Self::ElemHide),
            "generichide" => Some(Self::GenericHide),
            "genericblock" => Some(Self::GenericBlock),
            "popup" => Some(Self::Popup),
            "font" => Some(Self::Font),
            "media" => Some(Self::Media),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// The option keyword for this type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AllRequests => "all-requests",
            Self::Script => "script",
            Self::Image => "image",
            Self::Stylesheet => "stylesheet",
            Self::Object => "object",
            Self::XmlHttpRequest => "xmlhttprequest",
            Self::ObjectSubrequest => "object-subrequest",
            Self::Subdocument => "subdocument",
            Self::Ping => "ping",
            Self::WebSocket => "websocket",
            Self::WebRtc => "webrtc",
            Self::Document => "document",
            Self::ElemHide => "elemhide",
            Self::GenericHide => "generichide",
            Self::GenericBlock => "genericblock",
            Self::Popup => "popup",
            Self::Font => "font",
            Self::Media => "media",
            Self::Other => "other",
        }
    }

    /// Bit for this type inside a [`ResourceTypes`] set.
    #[inline]
    pub const fn bit(self) -> ResourceTypes {
        ResourceTypes::from_bits_retain(1 << self as u32)
    }
}

impl From<ResourceType> for &'static str {
    fn from(value: ResourceType) -> Self {
        value.name()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized resource type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(&s.to_ascii_lowercase()).ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

bitflags::bitflags! {
    /// Set of resource types, one bit per [`ResourceType`] discriminant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceTypes: u32 {
        const ALL_REQUESTS = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const XMLHTTPREQUEST = 1 << 5;
        const OBJECT_SUBREQUEST = 1 << 6;
        const SUBDOCUMENT = 1 << 7;
        const PING = 1 << 8;
        const WEBSOCKET = 1 << 9;
        const WEBRTC = 1 << 10;
        const DOCUMENT = 1 << 11;
        const ELEMHIDE = 1 << 12;
        const GENERICHIDE = 1 << 13;
        const GENERICBLOCK = 1 << 14;
        const POPUP = 1 << 15;
        const FONT = 1 << 16;
        const MEDIA = 1 << 17;
        const OTHER = 1 << 18;
    }
}

impl ResourceTypes {
    /// Whether the set holds `ty`.
    #[inline]
    pub fn has(self, ty: ResourceType) -> bool {
        self.contains(ty.bit())
    }

    /// Iterate the concrete types in the set, in vocabulary order.
    pub fn types(self) -> impl Iterator<Item = ResourceType> {
        ResourceType::ALL.into_iter().filter(move |ty| self.has(*ty))
    }
}

impl Default for ResourceTypes {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<ResourceType> for ResourceTypes {
    fn from(value: ResourceType) -> Self {
        value.bit()
    }
}

// =============================================================================
// Party / Collapse
// =============================================================================

/// Which side of the first/third-party split a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Party {
    #[default]
    Any,
    FirstParty,
    ThirdParty,
}

impl Party {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Any => "any party",
            Self::FirstParty => "first party",
            Self::ThirdParty => "third party",
        }
    }
}

/// `$collapse` option. Parsed and kept, but it has no effect on matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collapse {
    #[default]
    Default,
    AlwaysHide,
    NeverHide,
}

// =============================================================================
// Rules
// =============================================================================

/// One atomic unit of a tokenized URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Literal byte run, pre-lowered unless the rule is case sensitive
    Literal(Box<[u8]>),
    /// `*`
    Wildcard,
    /// `|` start or end of the URL
    AnchorBoundary,
    /// `^` separator character or end of the URL
    AnchorSeparator,
}

impl Token {
    /// Child-lookup key: first byte of a literal, 0 for everything else.
    #[inline]
    pub fn first_key(&self) -> u8 {
        match self {
            Token::Literal(bytes) => bytes.first().copied().unwrap_or(0),
            _ => 0,
        }
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Token::Wildcard)
    }

    /// Filter-syntax text of the token.
    pub fn to_text(&self) -> String {
        match self {
            Token::Literal(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Token::Wildcard => "*".to_string(),
            Token::AnchorBoundary => "|".to_string(),
            Token::AnchorSeparator => "^".to_string(),
        }
    }
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct RuleSource {
    pub list_index: usize,
    pub line_number: usize,
}

/// A compiled network rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticRule {
    pub pattern_pieces: Vec<Token>,
    pub target_domain_anchor: Option<Box<[u8]>>,
    /// Empty means every type
    pub resource_types: ResourceTypes,
    pub excluded_resource_types: ResourceTypes,
    pub referrer_domains: Vec<Box<[u8]>>,
    pub excluded_referrer_domains: Vec<Box<[u8]>>,
    pub party: Party,
    pub is_exception: bool,
    pub case_sensitive: bool,
    pub collapse: Collapse,
}

/// A `!` line. `key` is set for `! Key: value` directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRule {
    pub key: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Comment(CommentRule),
    Static(StaticRule),
    /// Element hiding rule; recognized but not implemented
    Cosmetic,
}

/// A parsed line of a filter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: RuleSource,
    pub kind: RuleKind,
}

impl Rule {
    pub fn as_static(&self) -> Option<&StaticRule> {
        match &self.kind {
            RuleKind::Static(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_comment(&self) -> Option<&CommentRule> {
        match &self.kind {
            RuleKind::Comment(rule) => Some(rule),
            _ => None,
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Diagnostic data for the rule that decided a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchInfo {
    pub list_index: usize,
    pub line_number: usize,
    /// Rule text rebuilt from the matched trie path
    pub rule_text: String,
}

/// Final decision for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum Verdict {
    /// No rule matched; the request is allowed
    NoMatch,
    /// An exception rule matched; the request is allowed
    Allow(MatchInfo),
    /// A blocking rule matched
    Block(MatchInfo),
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }

    /// The blocking rule, if any.
    pub fn into_block(self) -> Option<MatchInfo> {
        match self {
            Verdict::Block(info) => Some(info),
            _ => None,
        }
    }
}
