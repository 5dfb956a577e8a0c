//! 실패 계획 파싱 벤치마크

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use faultline_core::plan::{FailurePlan, parse_invariant_list};

fn build_plan(events: usize) -> String {
    let mut text = String::from("faultline-plan bench seed=1\nno-data-loss: const rows 100\n");
    for i in 0..events {
        let line = match i % 4 {
            0 => format!("{i} | node-{} | pause\n", i % 5),
            1 => format!("{i} | node-{} | resume\n", i % 5),
            2 => format!("{i} | node-{} | delay | 25ms\n", i % 5),
            _ => format!("{i} | node-{} | partition | node-a,node-b\n", i % 5),
        };
        text.push_str(&line);
    }
    text
}

fn bench_plan_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_parse");
    for size in [10usize, 100, 1000] {
        let text = build_plan(size);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_function(format!("events_{size}"), |b| {
            b.iter(|| FailurePlan::parse(black_box(&text)))
        });
    }
    group.finish();
}

fn bench_invariant_list(c: &mut Criterion) {
    let list: String = (0..200)
        .map(|i| format!("Var{i}.value == nd.Var{i}.value\n"))
        .collect();
    c.bench_function("invariant_list_200", |b| {
        b.iter(|| parse_invariant_list(black_box(&list), "bench"))
    });
}

criterion_group!(benches, bench_plan_parse, bench_invariant_list);
criterion_main!(benches);
