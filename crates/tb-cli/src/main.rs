//! TrieBlock CLI
//!
//! CLI tool for checking URLs against filter lists and inspecting the
//! compiled rule index.

mod budget;
mod lists;

use std::fs;

use clap::{Parser, Subcommand};
use serde::Serialize;

use tb_compiler::ListMetadata;
use tb_core::{ResourceType, Verdict};

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(about = "TrieBlock filter list engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a request would be blocked
    Check {
        /// Filter list files, indexed in the order given
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Target URL of the request
        #[arg(short, long)]
        url: String,

        /// Referrer URL of the page making the request
        #[arg(short, long)]
        referrer: String,

        /// Resource type, as named in filter options
        #[arg(short = 't', long = "type", default_value = "other")]
        resource_type: String,

        /// List indexes to ignore
        #[arg(long)]
        ignore_list: Vec<usize>,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print list metadata
    Info {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump the compiled rule index as JSON
    Tree {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check build time and match latency against the budget
    Budget {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Measurement rounds over the sample requests
        #[arg(short, long, default_value_t = 2000)]
        iterations: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            list,
            url,
            referrer,
            resource_type,
            ignore_list,
            json,
        } => cmd_check(&list, &url, &referrer, &resource_type, &ignore_list, json),
        Commands::Info { list, json } => cmd_info(&list, json),
        Commands::Tree { list, output } => cmd_tree(&list, output.as_deref()),
        Commands::Budget { list, iterations } => budget::run_budget(budget::BudgetOptions {
            list_paths: list,
            iterations,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_check(
    paths: &[String],
    url: &str,
    referrer: &str,
    resource_type: &str,
    ignore_lists: &[usize],
    json: bool,
) -> Result<(), String> {
    let resource_type: ResourceType = resource_type.parse().map_err(|e| format!("{}", e))?;

    let lists = lists::load_lists(paths)?;
    let (rules, _) = lists::build_rule_set(&lists);
    let mut matcher = rules.matcher();
    for &list_index in ignore_lists {
        matcher.ignore_list(list_index);
    }

    let verdict = matcher.match_request(url, referrer, resource_type);

    if json {
        let out = serde_json::to_string_pretty(&verdict).map_err(|e| format!("Failed to encode verdict: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    match verdict {
        Verdict::NoMatch => println!("ALLOW  no rule matched"),
        Verdict::Allow(info) => println!(
            "ALLOW  {} ({}:{})",
            info.rule_text, lists[info.list_index].path, info.line_number
        ),
        Verdict::Block(info) => println!(
            "BLOCK  {} ({}:{})",
            info.rule_text, lists[info.list_index].path, info.line_number
        ),
    }
    Ok(())
}

#[derive(Serialize)]
struct ListInfo<'a> {
    path: &'a str,
    #[serde(flatten)]
    metadata: &'a ListMetadata,
}

fn cmd_info(paths: &[String], json: bool) -> Result<(), String> {
    let lists = lists::load_lists(paths)?;

    if json {
        let infos: Vec<ListInfo<'_>> = lists
            .iter()
            .map(|list| ListInfo {
                path: &list.path,
                metadata: &list.metadata,
            })
            .collect();
        let out = serde_json::to_string_pretty(&infos).map_err(|e| format!("Failed to encode metadata: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    for (index, list) in lists.iter().enumerate() {
        let meta = &list.metadata;
        println!("[{}] {}", index, list.file_name());
        println!("  Title:       {}", meta.title.as_deref().unwrap_or("-"));
        println!("  Homepage:    {}", meta.homepage.as_deref().unwrap_or("-"));
        match meta.version {
            Some(version) => println!("  Version:     {}", version),
            None => println!("  Version:     -"),
        }
        match meta.expiration_hours {
            Some(hours) => println!("  Expires:     {} hours", hours),
            None => println!("  Expires:     -"),
        }
        println!("  Checksum:    {}", meta.checksum.as_deref().unwrap_or("-"));
        println!("  Rules:       {}", meta.rule_count);
    }

    let (rules, build_ms) = lists::build_rule_set(&lists);
    let stats = rules.stats();
    println!();
    println!("Rule set:");
    println!("  Static:      {}", stats.static_rules);
    println!("  Tries:       {}", stats.tries);
    println!("  Nodes:       {}", stats.trie_nodes);
    println!("  Build time:  {:.1}ms", build_ms);

    Ok(())
}

fn cmd_tree(paths: &[String], output: Option<&str>) -> Result<(), String> {
    let lists = lists::load_lists(paths)?;
    let (rules, _) = lists::build_rule_set(&lists);
    let tree = serde_json::to_string_pretty(&rules.rule_tree())
        .map_err(|e| format!("Failed to encode rule tree: {}", e))?;

    match output {
        Some(path) => {
            fs::write(path, tree).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            println!("Wrote rule tree to '{}'", path);
        }
        None => println!("{}", tree),
    }
    Ok(())
}
