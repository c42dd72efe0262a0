//! Benchmarks for the engine's pure paths: include flattening and
//! execution-state accumulation.

use chrome_press::engine::ExecutionState;
use chrome_press::{Extract, Step, StepList};
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;

/// Builds a list nested `depth` includes deep, two steps per level.
fn nested_list(depth: usize) -> StepList {
    let mut list = StepList::new(vec![
        Step::call("Page.navigate", |_| json!({})),
        Step::await_response(vec![Extract::key("frameId")]),
    ]);

    for _ in 0..depth {
        list = StepList::new(vec![
            Step::notify("Runtime.enable", |_| json!({})),
            Step::include(list),
            Step::output("frameId"),
        ]);
    }

    list
}

fn bench_flatten(c: &mut Criterion) {
    let list = nested_list(16);

    c.bench_function("flatten_nested_includes", |b| {
        b.iter(|| black_box(&list).flatten())
    });
}

fn bench_state_accumulation(c: &mut Criterion) {
    let payload = json!({
        "frame": {"id": "F1", "loaderId": "L1"},
        "data": "JVBERi0xLjQK",
        "timing": {"domContentLoaded": 12.5, "load": 48.0},
    });
    let extracts = vec![
        Extract::new("frame.id", "frameId"),
        Extract::new("frame.loaderId", "loaderId"),
        Extract::key("data"),
        Extract::new("timing.load", "loadedAt"),
    ];

    c.bench_function("state_merge_extracts", |b| {
        b.iter(|| {
            let mut state =
                ExecutionState::new(json!({"url": "https://example.com"})).expect("state");
            state
                .merge_extracts(black_box(&payload), black_box(&extracts))
                .expect("merge");
            state
        })
    });
}

criterion_group!(benches, bench_flatten, bench_state_accumulation);
criterion_main!(benches);
