use std::time::Instant;

use tb_core::{ResourceType, RuleSet};

use crate::lists;

pub struct BudgetOptions {
    pub list_paths: Vec<String>,
    pub iterations: usize,
}

struct BudgetRequest {
    url: &'static str,
    referrer: &'static str,
    resource_type: ResourceType,
}

const BUDGET_MATCH_P50_US: f64 = 100.0;
const BUDGET_MATCH_P99_US: f64 = 1000.0;

const TEST_REQUESTS: [BudgetRequest; 5] = [
    BudgetRequest {
        url: "https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js",
        referrer: "https://example.com/",
        resource_type: ResourceType::Script,
    },
    BudgetRequest {
        url: "https://www.google-analytics.com/analytics.js",
        referrer: "https://example.com/",
        resource_type: ResourceType::Script,
    },
    BudgetRequest {
        url: "https://example.com/style.css",
        referrer: "https://example.com/",
        resource_type: ResourceType::Stylesheet,
    },
    BudgetRequest {
        url: "https://cdn.example.com/image.png",
        referrer: "https://example.com/",
        resource_type: ResourceType::Image,
    },
    BudgetRequest {
        url: "https://api.example.com/data.json",
        referrer: "https://example.com/",
        resource_type: ResourceType::XmlHttpRequest,
    },
];

pub fn run_budget(opts: BudgetOptions) -> Result<(), String> {
    println!("Performance Budget Check");
    println!("==================================================");

    let lists = lists::load_lists(&opts.list_paths)?;
    let (rules, build_ms) = lists::build_rule_set(&lists);
    println!(
        "Built {} static rules from {} list(s) in {:.1}ms",
        rules.stats().static_rules,
        lists.len(),
        build_ms
    );

    println!("Warming up...");
    for _ in 0..1000 {
        for req in &TEST_REQUESTS {
            let _ = rules.find_rule(req.url, req.referrer, req.resource_type);
        }
    }

    println!("Measuring match latency...");
    let latencies = measure_match_latency(&rules, opts.iterations);
    let p50_us = percentile(&latencies, 0.50);
    let p99_us = percentile(&latencies, 0.99);

    let mut passed = true;
    println!();
    println!("Results");
    println!("--------------------------------------------------");

    passed &= report_budget("Match P50 Latency", p50_us, BUDGET_MATCH_P50_US, "μs");
    passed &= report_budget("Match P99 Latency", p99_us, BUDGET_MATCH_P99_US, "μs");

    println!();
    println!("==================================================");

    if passed {
        println!("✓ All performance budgets passed");
        Ok(())
    } else {
        Err("Performance budget exceeded".to_string())
    }
}

fn report_budget(name: &str, actual: f64, limit: f64, unit: &str) -> bool {
    let passed = actual <= limit;
    let status = if passed { "✓" } else { "✗" };
    println!(
        "{} {}: {:.2} {} (limit: {:.2} {})",
        status, name, actual, unit, limit, unit
    );
    passed
}

fn measure_match_latency(rules: &RuleSet, iterations: usize) -> Vec<f64> {
    let mut latencies = Vec::with_capacity(iterations * TEST_REQUESTS.len());

    for _ in 0..iterations {
        for req in &TEST_REQUESTS {
            let start = Instant::now();
            let _ = rules.find_rule(req.url, req.referrer, req.resource_type);
            latencies.push(start.elapsed().as_secs_f64() * 1_000_000.0);
        }
    }

    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    latencies
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}
