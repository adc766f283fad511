use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tb_compiler::build_rule_set;
use tb_core::types::ResourceType;

const RULES: usize = 50_000;

/// Letters-only name for synthetic rule `i`; host anchors do not capture digits.
fn label(mut i: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'a' + (i % 26) as u8);
        i /= 26;
        if i == 0 {
            break;
        }
        i -= 1;
    }
    out.reverse();
    String::from_utf8(out).expect("ascii label")
}

/// A list mixing path rules, anchored hosts, typed rules and exceptions.
fn synthetic_list(count: usize) -> String {
    let mut text = String::with_capacity(count * 32);
    for i in 0..count {
        let name = label(i);
        let line = match i % 4 {
            0 => format!("/{}/banner\n", name),
            1 => format!("||{}.example.com^\n", name),
            2 => format!("{}-track.js$script,third-party\n", name),
            _ => format!("@@||{}.cdn.net^$image\n", name),
        };
        text.push_str(&line);
    }
    text
}

fn bench_build(c: &mut Criterion) {
    let text = synthetic_list(RULES);

    let mut group = c.benchmark_group("rule_set_build");
    group
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2))
        .sample_size(10);

    group.bench_function(format!("build_{}", RULES), |b| {
        b.iter(|| black_box(build_rule_set(&[&text])));
    });

    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let text = synthetic_list(RULES);
    let rules = build_rule_set(&[&text]);

    let urls: Vec<(String, ResourceType)> = (0..1_000)
        .map(|i| {
            let name = label(i * 37 % RULES);
            match i % 4 {
                0 => (format!("https://{}.example.com/path/to/page", name), ResourceType::Script),
                1 => (format!("https://static.site.org/{}/banner.png", name), ResourceType::Image),
                2 => (format!("https://cdn.site.org/js/{}-track.js", name), ResourceType::Script),
                _ => (format!("https://clean.site.org/assets/{}/app.css", name), ResourceType::Stylesheet),
            }
        })
        .collect();

    let mut group = c.benchmark_group("rule_set_match");
    group.bench_function(format!("find_rule_{}_urls", urls.len()), |b| {
        b.iter(|| {
            let mut blocked = 0usize;
            for (url, ty) in &urls {
                if rules.find_rule(url, "https://news.site.org/", *ty).is_some() {
                    blocked += 1;
                }
            }
            black_box(blocked)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_match);
criterion_main!(benches);
