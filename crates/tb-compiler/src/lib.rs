//! TrieBlock Filter List Compiler
//!
//! This crate parses Adblock-style filter lists and compiles their network
//! rules into a [`tb_core::RuleSet`].

pub mod builder;
pub mod metadata;
pub mod parser;

pub use builder::{build_rule_set, parse_rules, ListError, RuleSetBuilder};
pub use metadata::{extract_metadata, ListMetadata};
pub use parser::{compile_static_rule, parse_filter_list, parse_rule};
