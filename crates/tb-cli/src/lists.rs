use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use tb_compiler::{extract_metadata, parse_rules, ListMetadata, RuleSetBuilder};
use tb_core::{Rule, RuleSet};

/// One filter list read from disk.
#[derive(Debug)]
pub struct LoadedList {
    pub path: String,
    pub rules: Vec<Rule>,
    pub metadata: ListMetadata,
}

impl LoadedList {
    pub fn file_name(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

/// Read and parse every list concurrently. List `i` gets index `i`.
pub fn load_lists(paths: &[String]) -> Result<Vec<LoadedList>, String> {
    if paths.is_empty() {
        return Err("No filter lists specified".to_string());
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(load_all(paths))
}

async fn load_all(paths: &[String]) -> Result<Vec<LoadedList>, String> {
    let handles: Vec<_> = paths
        .iter()
        .enumerate()
        .map(|(list_index, path)| tokio::spawn(load_one(path.clone(), list_index)))
        .collect();

    let mut lists = Vec::with_capacity(handles.len());
    for handle in handles {
        let list = handle
            .await
            .map_err(|e| format!("List loader failed: {}", e))??;
        lists.push(list);
    }
    Ok(lists)
}

async fn load_one(path: String, list_index: usize) -> Result<LoadedList, String> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;

    let rules = tokio::task::spawn_blocking(move || parse_rules(Cursor::new(bytes), list_index))
        .await
        .map_err(|e| format!("Parser for '{}' failed: {}", path, e))?
        .map_err(|e| format!("Failed to parse '{}': {}", path, e))?;

    let metadata = extract_metadata(&rules);
    Ok(LoadedList { path, rules, metadata })
}

/// Compile loaded lists into one rule set; returns build time in ms.
pub fn build_rule_set(lists: &[LoadedList]) -> (RuleSet, f64) {
    let start = Instant::now();
    let mut builder = RuleSetBuilder::new();
    for list in lists {
        builder.add_rules(&list.rules);
    }
    let rules = builder.build();
    (rules, start.elapsed().as_secs_f64() * 1000.0)
}
