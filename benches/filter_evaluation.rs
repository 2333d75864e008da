//! Filter Parsing and Evaluation Benchmarks
//!
//! Measures filter parsing, rendering and three-valued evaluation against a
//! population of person entries.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dirsrv_core::entry::{Attribute, Entry};
use dirsrv_core::{Dn, FilterEvaluator, Schema, SearchFilter};

const FILTERS: &[(&str, &str)] = &[
    ("equality", "(sn=Jensen)"),
    ("presence", "(mail=*)"),
    ("substring", "(cn=B*ens*n)"),
    ("ordering", "(uidNumber>=500)"),
    ("approximate", "(sn~=Jenssen)"),
    ("compound", "(&(objectClass=person)(|(sn=Jensen)(cn=User 1*))(!(description=*)))"),
    ("extensible", "(ou:dn:=People)"),
];

/// Create a person entry for benchmarking
fn create_test_entry(schema: &Schema, id: usize) -> Entry {
    let dn = Dn::parse(&format!("uid=user{id},ou=People,dc=example,dc=com")).expect("Invalid DN");
    let mut entry = Entry::with_object_classes(dn, schema, &["top", "person", "organizationalPerson", "inetOrgPerson"]);
    let mut duplicates = Vec::new();
    let surname = if id % 10 == 0 { "Jensen".to_string() } else { format!("Surname{id}") };
    for (name, value) in [
        ("cn", format!("User {id}")),
        ("sn", surname),
        ("uid", format!("user{id}")),
        ("mail", format!("user{id}@example.com")),
        ("uidNumber", id.to_string()),
    ] {
        entry.add_attribute(schema, Attribute::new(schema.attribute_type_or_default(name), [value]), &mut duplicates);
    }
    entry
}

/// Benchmark filter string parsing
fn bench_filter_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_parsing");
    let schema = Schema::with_core_schema().expect("Failed to build core schema");

    for (label, filter) in FILTERS {
        group.bench_with_input(BenchmarkId::new("parse", label), filter, |b, filter| {
            b.iter(|| black_box(SearchFilter::parse(black_box(filter), &schema)));
        });
    }

    let deep = format!("{}(sn=Jensen){}", "(&".repeat(64), ")".repeat(64));
    group.bench_function("parse_nested_64", |b| {
        b.iter(|| black_box(SearchFilter::parse(black_box(&deep), &schema)));
    });

    group.finish();
}

/// Benchmark evaluation of each filter kind over a population of entries
fn bench_filter_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_evaluation");
    let schema = Schema::with_core_schema().expect("Failed to build core schema");
    let evaluator = FilterEvaluator::new(&schema);

    for size in [10usize, 100, 1000].iter() {
        let entries: Vec<Entry> = (0..*size).map(|i| create_test_entry(&schema, i)).collect();
        group.throughput(Throughput::Elements(*size as u64));

        for (label, filter) in FILTERS {
            let filter = SearchFilter::parse(filter, &schema).expect("Invalid benchmark filter");
            group.bench_with_input(BenchmarkId::new(*label, size), &entries, |b, entries| {
                b.iter(|| {
                    let matched = entries
                        .iter()
                        .filter(|entry| evaluator.matches_entry(&filter, entry).unwrap_or(false))
                        .count();
                    black_box(matched)
                });
            });
        }
    }

    group.finish();
}

/// Benchmark rendering filters back to strings
fn bench_filter_display(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_display");
    let schema = Schema::with_core_schema().expect("Failed to build core schema");
    let filters: Vec<SearchFilter> = FILTERS
        .iter()
        .map(|(_, f)| SearchFilter::parse(f, &schema).expect("Invalid benchmark filter"))
        .collect();

    group.bench_function("to_string", |b| {
        b.iter(|| {
            for filter in &filters {
                black_box(filter.to_string());
            }
        });
    });

    group.finish();
}

criterion_group!(
    filter_benches,
    bench_filter_parsing,
    bench_filter_evaluation,
    bench_filter_display
);
criterion_main!(filter_benches);
